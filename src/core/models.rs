//! Shared data model
//!
//! [`CounterRecord`] is the fixed layout that lives inside the shared memory
//! segment. Everything else here is a plain value type built from it.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// The two kinds of transient worker processes the leader supervises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum WorkerKind {
    /// Kind 1: adds ten to the counter in one critical section
    #[value(alias = "1")]
    Adder,
    /// Kind 2: doubles the counter, waits, then halves it
    #[value(alias = "2")]
    Doubler,
}

impl WorkerKind {
    pub const ALL: [WorkerKind; 2] = [WorkerKind::Adder, WorkerKind::Doubler];

    /// 1-based kind number used in log lines
    pub fn number(self) -> u8 {
        match self {
            WorkerKind::Adder => 1,
            WorkerKind::Doubler => 2,
        }
    }

    /// Value passed to `--worker` when launching this kind
    pub fn as_arg(self) -> &'static str {
        match self {
            WorkerKind::Adder => "adder",
            WorkerKind::Doubler => "doubler",
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Child{}", self.number())
    }
}

/// Fixed-layout record stored in the shared segment.
///
/// PIDs use `0` for "none" and timestamps are unix seconds with `0` for
/// "never", so a zero-filled segment is a valid empty record. Only
/// `initialized` may be read without holding the cross-process lock.
#[repr(C)]
#[derive(Debug)]
pub struct CounterRecord {
    pub value: i64,
    pub worker1_pid: u32,
    pub worker2_pid: u32,
    pub worker1_start_time: i64,
    pub worker2_start_time: i64,
    pub leader_pid: u32,
    pub last_leader_activity: i64,
    initialized: AtomicBool,
}

impl CounterRecord {
    /// A seeded, initialized record outside of shared memory
    pub fn new(value: i64) -> Self {
        Self {
            value,
            worker1_pid: 0,
            worker2_pid: 0,
            worker1_start_time: 0,
            worker2_start_time: 0,
            leader_pid: 0,
            last_leader_activity: 0,
            initialized: AtomicBool::new(true),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Seed a freshly zero-filled record and publish it to attachers.
    pub(crate) fn seed(&mut self, value: i64) {
        self.value = value;
        self.initialized.store(true, Ordering::Release);
    }

    pub fn worker_pid(&self, kind: WorkerKind) -> Option<u32> {
        let pid = match kind {
            WorkerKind::Adder => self.worker1_pid,
            WorkerKind::Doubler => self.worker2_pid,
        };
        (pid != 0).then_some(pid)
    }

    pub fn worker_started_at(&self, kind: WorkerKind) -> Option<DateTime<Utc>> {
        match kind {
            WorkerKind::Adder => from_unix_seconds(self.worker1_start_time),
            WorkerKind::Doubler => from_unix_seconds(self.worker2_start_time),
        }
    }

    pub fn record_worker(&mut self, kind: WorkerKind, pid: u32, started_at: DateTime<Utc>) {
        let started_at = started_at.timestamp();
        match kind {
            WorkerKind::Adder => {
                self.worker1_pid = pid;
                self.worker1_start_time = started_at;
            }
            WorkerKind::Doubler => {
                self.worker2_pid = pid;
                self.worker2_start_time = started_at;
            }
        }
    }

    pub fn record_heartbeat(&mut self, leader_pid: u32, at: DateTime<Utc>) {
        self.leader_pid = leader_pid;
        self.last_leader_activity = at.timestamp();
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            value: self.value,
            leader_pid: (self.leader_pid != 0).then_some(self.leader_pid),
            last_leader_activity: from_unix_seconds(self.last_leader_activity),
            workers: WorkerKind::ALL.map(|kind| WorkerSlot {
                kind,
                pid: self.worker_pid(kind),
                started_at: self.worker_started_at(kind),
            }),
        }
    }
}

/// What the shared record says about one worker kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSlot {
    pub kind: WorkerKind,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
}

/// Copy of the shared record taken under the lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSnapshot {
    pub value: i64,
    pub leader_pid: Option<u32>,
    pub last_leader_activity: Option<DateTime<Utc>>,
    pub workers: [WorkerSlot; 2],
}

impl StateSnapshot {
    pub fn worker(&self, kind: WorkerKind) -> &WorkerSlot {
        match kind {
            WorkerKind::Adder => &self.workers[0],
            WorkerKind::Doubler => &self.workers[1],
        }
    }
}

fn from_unix_seconds(seconds: i64) -> Option<DateTime<Utc>> {
    if seconds == 0 {
        return None;
    }
    DateTime::from_timestamp(seconds, 0)
}
