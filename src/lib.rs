//! Fleet Counter Library
//!
//! A single counter shared by cooperating processes on one host: a shared
//! memory record, a cross-process lock, lock-file leader election and
//! leader-supervised worker processes.

pub mod commands;
pub mod config;
pub mod context;
pub mod core;
pub mod election;
pub mod engine;
pub mod error;
pub mod event_log;
pub mod logging;
pub mod platform;
pub mod signal;
pub mod supervisor;
pub mod utils;
pub mod worker;

// Re-export commonly used types for convenience
pub use config::FleetConfig;
pub use context::FleetContext;
pub use crate::core::models::*;
pub use election::{ElectionOutcome, LeaderElection};
pub use engine::CounterEngine;
pub use error::{FleetError, FleetResult};
pub use event_log::{CounterEvent, EventLog};
pub use supervisor::{ProcessSupervisor, SelfExecLauncher, SupervisionDecision, WorkerLauncher};
