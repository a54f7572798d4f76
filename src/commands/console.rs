//! Interactive console
//!
//! Lines come from stdin on a dedicated thread; every command prints an
//! explicit reply on stdout.

use crate::context::FleetContext;
use crate::core::StateSnapshot;
use chrono::Utc;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

pub const PROMPT: &str = "counter> ";

const USAGE: &str = "set N, get, status, help, exit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Set(i64),
    Get,
    Status,
    Help,
    Exit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("invalid number format: '{0}'")]
    InvalidNumber(String),
    #[error("missing value, usage: set N")]
    MissingValue,
    #[error("unknown command '{0}'. Available: set N, get, status, help, exit")]
    Unknown(String),
}

impl ConsoleCommand {
    /// Parse one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let mut parts = line.split_whitespace();
        let command = match (parts.next(), parts.next(), parts.next()) {
            (Some("set"), None, _) => return Err(CommandError::MissingValue),
            (Some("set"), Some(value), None) => ConsoleCommand::Set(
                value
                    .parse::<i64>()
                    .map_err(|_| CommandError::InvalidNumber(value.to_string()))?,
            ),
            (Some("get"), None, _) => ConsoleCommand::Get,
            (Some("status"), None, _) => ConsoleCommand::Status,
            (Some("help"), None, _) => ConsoleCommand::Help,
            (Some("exit" | "quit"), None, _) => ConsoleCommand::Exit,
            _ => return Err(CommandError::Unknown(line.to_string())),
        };
        Ok(Some(command))
    }
}

/// Whether the console loop should keep reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleReply {
    Continue,
    Exit,
}

pub struct Console {
    ctx: Arc<FleetContext>,
}

impl Console {
    pub fn new(ctx: Arc<FleetContext>) -> Self {
        Self { ctx }
    }

    pub fn banner(&self) -> String {
        let role = if self.ctx.is_leader() { "LEADER" } else { "FOLLOWER" };
        format!(
            "=== COUNTER STARTED ===\nPID: {}\nRole: {}\nCommands: {}\n",
            self.ctx.pid(),
            role,
            USAGE
        )
    }

    /// Handle one input line, writing the reply to `out`.
    pub fn execute(&self, line: &str, out: &mut impl Write) -> io::Result<ConsoleReply> {
        let command = match ConsoleCommand::parse(line) {
            Ok(Some(command)) => command,
            Ok(None) => return Ok(ConsoleReply::Continue),
            Err(err) => {
                writeln!(out, "Error: {err}")?;
                return Ok(ConsoleReply::Continue);
            }
        };

        match command {
            ConsoleCommand::Set(value) => match self.ctx.set_value(value) {
                Ok(()) => writeln!(out, "Counter set to {value}")?,
                Err(err) => writeln!(out, "Error: {}", err.user_message())?,
            },
            ConsoleCommand::Get => writeln!(out, "Current counter value: {}", self.ctx.cached_value())?,
            ConsoleCommand::Status => match self.ctx.snapshot() {
                Ok(snapshot) => write!(out, "{}", render_status(&snapshot))?,
                Err(err) => writeln!(out, "Error: {}", err.user_message())?,
            },
            ConsoleCommand::Help => writeln!(out, "Commands: {USAGE}")?,
            ConsoleCommand::Exit => {
                self.ctx.request_shutdown();
                return Ok(ConsoleReply::Exit);
            }
        }
        Ok(ConsoleReply::Continue)
    }
}

fn render_status(snapshot: &StateSnapshot) -> String {
    let now = Utc::now();
    let mut text = format!("value: {}\n", snapshot.value);

    match (snapshot.leader_pid, snapshot.last_leader_activity) {
        (Some(pid), Some(at)) => {
            let age = (now - at).num_seconds().max(0);
            text.push_str(&format!("leader: PID={pid} (heartbeat {age}s ago)\n"));
        }
        (Some(pid), None) => text.push_str(&format!("leader: PID={pid}\n")),
        _ => text.push_str("leader: none recorded\n"),
    }

    for slot in &snapshot.workers {
        match (slot.pid, slot.started_at) {
            (Some(pid), Some(at)) => text.push_str(&format!(
                "{}: PID={} started {}\n",
                slot.kind,
                pid,
                at.format("%Y-%m-%d %H:%M:%S")
            )),
            (Some(pid), None) => text.push_str(&format!("{}: PID={}\n", slot.kind, pid)),
            _ => text.push_str(&format!("{}: never launched\n", slot.kind)),
        }
    }
    text
}

/// Read stdin lines on a dedicated thread.
///
/// The channel closes at end of input.
pub fn spawn_stdin_reader() -> io::Result<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::Builder::new()
        .name("fleet-console".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        })?;
    Ok(rx)
}
