//! Append-only counter event log shared by every process of a fleet.
//!
//! Each write opens the file, takes an exclusive advisory lock, appends one
//! line and releases the lock, so lines from concurrent processes never
//! interleave.

use crate::core::WorkerKind;
use crate::error::{errors, FleetResult};
use crate::logging::warn;
use crate::utils::now_timestamp;
use fs2::FileExt;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// One line of the event log, without its timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterEvent {
    /// Periodic leader report
    Tick { pid: u32, value: i64 },
    MainStart { pid: u32, leader: bool },
    MainExit { pid: u32, value: i64 },
    WorkerStart { kind: WorkerKind, pid: u32 },
    WorkerEnd { kind: WorkerKind, pid: u32, value: i64 },
    WorkerStillRunning { pid: u32, kind: WorkerKind, worker_pid: u32 },
    ManualSet { pid: u32, value: i64 },
}

impl CounterEvent {
    fn is_warning(&self) -> bool {
        matches!(self, CounterEvent::WorkerStillRunning { .. })
    }
}

impl fmt::Display for CounterEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            CounterEvent::Tick { pid, value } => write!(f, "PID={pid} COUNTER={value}"),
            CounterEvent::MainStart { pid, leader } => write!(
                f,
                "MAIN START PID={pid} (Leader: {})",
                if leader { "YES" } else { "NO" }
            ),
            CounterEvent::MainExit { pid, value } => write!(f, "MAIN EXIT PID={pid} COUNTER={value}"),
            CounterEvent::WorkerStart { kind, pid } => {
                write!(f, "CHILD{} START PID={pid}", kind.number())
            }
            CounterEvent::WorkerEnd { kind, pid, value } => {
                write!(f, "CHILD{} END PID={pid} COUNTER={value}", kind.number())
            }
            CounterEvent::WorkerStillRunning {
                pid,
                kind,
                worker_pid,
            } => write!(
                f,
                "PID={pid} WARNING: {kind} (PID={worker_pid}) still running, skipping spawn"
            ),
            CounterEvent::ManualSet { pid, value } => write!(f, "PID={pid} MANUAL_SET COUNTER={value}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `event` with the current local timestamp and mirror it to tracing.
    pub fn record(&self, event: CounterEvent) -> FleetResult<()> {
        if event.is_warning() {
            tracing::warn!(target: "fleet_counter::events", "{}", event);
        } else {
            tracing::info!(target: "fleet_counter::events", "{}", event);
        }

        let line = format!("[{}] {}", now_timestamp(), event);
        append_line(&self.path, &line)
    }

    /// Like [`record`](Self::record), but a sink failure is only logged.
    pub fn record_or_warn(&self, event: CounterEvent) {
        if let Err(err) = self.record(event) {
            warn(format!("failed to write event log: {}", err));
        }
    }
}

/// Append `line` plus a newline under an exclusive advisory lock.
pub fn append_line(path: &Path, line: &str) -> FleetResult<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| errors::filesystem_error("cannot open event log", path, err))?;

    FileExt::lock_exclusive(&file)
        .map_err(|err| errors::filesystem_error("cannot lock event log", path, err))?;
    let written = write_line(&file, line);
    let unlocked = FileExt::unlock(&file);

    written.map_err(|err| errors::filesystem_error("cannot append to event log", path, err))?;
    unlocked.map_err(|err| errors::filesystem_error("cannot unlock event log", path, err))
}

fn write_line(mut file: &File, line: &str) -> std::io::Result<()> {
    let mut buf = String::with_capacity(line.len() + 1);
    buf.push_str(line);
    buf.push('\n');
    file.write_all(buf.as_bytes())?;
    file.flush()
}
