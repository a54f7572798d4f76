//! Command-line and console handling

pub mod console;
pub mod parser;

pub use console::{Console, ConsoleCommand, ConsoleReply, CommandError};
pub use parser::*;
