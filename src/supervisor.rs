use crate::config::FleetConfig;
use crate::core::lock::CrossProcessLock;
use crate::core::{CounterRecord, SharedState, WorkerKind};
use crate::error::{errors, FleetResult};
use crate::logging::{debug, warn};
use crate::platform;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

/// A worker process that has just been started
#[derive(Debug)]
pub struct LaunchedWorker {
    pub pid: u32,
    /// Handle used to reap the process; absent for launchers that do not own one
    pub child: Option<Child>,
}

/// Starts worker processes. Separated out so supervision can run without
/// spawning real processes.
pub trait WorkerLauncher: Send + Sync {
    fn launch(&self, kind: WorkerKind) -> FleetResult<LaunchedWorker>;
}

/// Launches workers by re-executing a program (normally this binary) in
/// worker mode with the fleet's configuration flags.
#[derive(Debug, Clone)]
pub struct SelfExecLauncher {
    program: PathBuf,
    args: Vec<OsString>,
}

impl SelfExecLauncher {
    pub fn new(program: impl Into<PathBuf>, args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Re-execute the current executable with `config` as flags.
    pub fn from_config(config: &FleetConfig) -> FleetResult<Self> {
        let program = std::env::current_exe().map_err(|err| {
            errors::process_error("cannot locate the current executable", "current_exe", err)
        })?;
        Ok(Self::new(program, config.worker_args()))
    }

    fn command_line(&self, kind: WorkerKind) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line.push_str(" --worker ");
        line.push_str(kind.as_arg());
        line
    }
}

impl WorkerLauncher for SelfExecLauncher {
    fn launch(&self, kind: WorkerKind) -> FleetResult<LaunchedWorker> {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command.arg("--worker").arg(kind.as_arg());
        command.stdin(Stdio::null());
        command.stdout(Stdio::null());
        command.stderr(Stdio::inherit());

        // Platform-specific command preparation
        platform::prepare_command(&mut command)
            .map_err(|err| errors::process_error("cannot prepare worker", self.command_line(kind), err))?;

        let child = command
            .spawn()
            .map_err(|err| errors::process_error("failed to spawn worker", self.command_line(kind), err))?;
        let pid = child.id();

        debug(format!("Started {} process pid={}", kind, pid));
        Ok(LaunchedWorker {
            pid,
            child: Some(child),
        })
    }
}

/// What supervision decided for one worker kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisionDecision {
    Launched { pid: u32 },
    AlreadyRunning { pid: u32 },
    LaunchFailed { reason: String },
}

impl fmt::Display for SupervisionDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisionDecision::Launched { pid } => write!(f, "launched PID={pid}"),
            SupervisionDecision::AlreadyRunning { pid } => write!(f, "still running PID={pid}"),
            SupervisionDecision::LaunchFailed { reason } => write!(f, "launch failed: {reason}"),
        }
    }
}

/// Outcome of one supervision cycle, in [`WorkerKind::ALL`] order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisionReport {
    pub decisions: Vec<(WorkerKind, SupervisionDecision)>,
}

impl SupervisionReport {
    pub fn decision(&self, kind: WorkerKind) -> Option<&SupervisionDecision> {
        self.decisions
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, decision)| decision)
    }

    pub fn launched(&self) -> impl Iterator<Item = (WorkerKind, u32)> + '_ {
        self.decisions.iter().filter_map(|(kind, decision)| match decision {
            SupervisionDecision::Launched { pid } => Some((*kind, *pid)),
            _ => None,
        })
    }
}

/// Leader-side bookkeeping of worker processes.
///
/// At most one worker of each kind is alive at a time. The shared record is
/// the authority on which PID is tracked; the child handles kept here only
/// exist to reap workers this process started.
pub struct ProcessSupervisor<L: WorkerLauncher> {
    launcher: L,
    children: Mutex<HashMap<WorkerKind, Child>>,
    is_alive: fn(u32) -> bool,
}

impl<L: WorkerLauncher> ProcessSupervisor<L> {
    pub fn new(launcher: L) -> Self {
        Self::with_probe(launcher, platform::process_alive)
    }

    /// Use `is_alive` instead of the OS liveness probe.
    pub fn with_probe(launcher: L, is_alive: fn(u32) -> bool) -> Self {
        Self {
            launcher,
            children: Mutex::new(HashMap::new()),
            is_alive,
        }
    }

    /// Run one supervision cycle against the shared record.
    pub fn supervise(&self, state: &SharedState, lock: &dyn CrossProcessLock) -> FleetResult<SupervisionReport> {
        self.reap();
        let mut record = state.lock(lock)?;
        Ok(self.supervise_record(&mut record, Utc::now()))
    }

    /// Decide and launch for every kind. The caller must hold the fleet lock.
    pub fn supervise_record(&self, record: &mut CounterRecord, now: DateTime<Utc>) -> SupervisionReport {
        let decisions = WorkerKind::ALL
            .into_iter()
            .map(|kind| (kind, self.supervise_kind(record, kind, now)))
            .collect();
        SupervisionReport { decisions }
    }

    fn supervise_kind(&self, record: &mut CounterRecord, kind: WorkerKind, now: DateTime<Utc>) -> SupervisionDecision {
        if let Some(pid) = record.worker_pid(kind) {
            if (self.is_alive)(pid) {
                return SupervisionDecision::AlreadyRunning { pid };
            }
        }

        match self.launcher.launch(kind) {
            Ok(worker) => {
                record.record_worker(kind, worker.pid, now);
                if let Some(child) = worker.child {
                    self.children.lock().insert(kind, child);
                }
                SupervisionDecision::Launched { pid: worker.pid }
            }
            // PID slot stays as it was; the next cycle tries again
            Err(err) => SupervisionDecision::LaunchFailed {
                reason: err.to_string(),
            },
        }
    }

    /// Collect exit status of finished workers so they stop looking alive.
    pub fn reap(&self) {
        let mut children = self.children.lock();
        children.retain(|kind, child| match child.try_wait() {
            Ok(Some(status)) => {
                debug(format!("{} PID={} exited with {}", kind, child.id(), status));
                false
            }
            Ok(None) => true,
            Err(err) => {
                warn(format!("cannot poll {} PID={}: {}", kind, child.id(), err));
                err.kind() == io::ErrorKind::Interrupted
            }
        });
    }
}
