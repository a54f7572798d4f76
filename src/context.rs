//! Per-process fleet handle
//!
//! [`FleetContext`] owns every resource a participant or worker needs and is
//! shared between tasks by `Arc`.

use crate::config::FleetConfig;
use crate::core::lock::CrossProcessLock;
use crate::core::{SharedState, StateGuard, StateSnapshot};
use crate::election::LeaderElection;
use crate::error::FleetResult;
use crate::event_log::{CounterEvent, EventLog};
use crate::platform;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

pub struct FleetContext {
    config: FleetConfig,
    // dropped first: a leader removes its artifact before detaching
    election: Option<LeaderElection>,
    lock: Box<dyn CrossProcessLock>,
    state: SharedState,
    events: EventLog,
    cached: AtomicI64,
    running: Arc<AtomicBool>,
    pid: u32,
}

impl FleetContext {
    /// Attach as a full participant: open the lock, attach to the segment
    /// and run the leader election.
    pub fn attach(config: FleetConfig) -> FleetResult<Self> {
        let wait = config.init_wait();
        let lock = platform::open_system_lock(&config.lock_name, wait)?;
        let state = SharedState::create_or_attach(&config.shm_name, wait)?;
        let election = LeaderElection::elect(config.leader_lock_path.clone())?;
        Ok(Self::from_parts(config, Box::new(lock), state, Some(election)))
    }

    /// Attach as a worker: same segment and lock, no election.
    pub fn attach_worker(config: FleetConfig) -> FleetResult<Self> {
        let wait = config.init_wait();
        let lock = platform::open_system_lock(&config.lock_name, wait)?;
        let state = SharedState::create_or_attach(&config.shm_name, wait)?;
        Ok(Self::from_parts(config, Box::new(lock), state, None))
    }

    pub fn from_parts(
        config: FleetConfig,
        lock: Box<dyn CrossProcessLock>,
        state: SharedState,
        election: Option<LeaderElection>,
    ) -> Self {
        let events = EventLog::new(config.log_path.clone());
        Self {
            config,
            election,
            lock,
            state,
            events,
            cached: AtomicI64::new(0),
            running: Arc::new(AtomicBool::new(true)),
            pid: platform::current_pid(),
        }
    }

    /// Exclusive access to the shared record
    pub fn lock_state(&self) -> FleetResult<StateGuard<'_>> {
        self.state.lock(self.lock.as_ref())
    }

    pub fn is_leader(&self) -> bool {
        self.election.as_ref().is_some_and(LeaderElection::is_leader)
    }

    /// Leadership check that also refreshes the leader heartbeat.
    pub fn is_current_leader(&self) -> FleetResult<bool> {
        match &self.election {
            Some(election) => election.is_current_leader(&self.state, self.lock.as_ref()),
            None => Ok(false),
        }
    }

    pub fn election(&self) -> Option<&LeaderElection> {
        self.election.as_ref()
    }

    /// Last value this process read or wrote
    pub fn cached_value(&self) -> i64 {
        self.cached.load(Ordering::Acquire)
    }

    pub fn publish(&self, value: i64) {
        self.cached.store(value, Ordering::Release);
    }

    /// Read the live value under the lock and publish it.
    pub fn refresh(&self) -> FleetResult<i64> {
        let value = self.lock_state()?.value;
        self.publish(value);
        Ok(value)
    }

    pub fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn request_shutdown(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn snapshot(&self) -> FleetResult<StateSnapshot> {
        Ok(self.lock_state()?.snapshot())
    }

    /// Assign the counter, publish it and log the manual change.
    pub fn set_value(&self, value: i64) -> FleetResult<()> {
        {
            let mut record = self.lock_state()?;
            record.value = value;
        }
        self.publish(value);
        self.events
            .record_or_warn(CounterEvent::ManualSet { pid: self.pid, value });
        Ok(())
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn lock(&self) -> &dyn CrossProcessLock {
        self.lock.as_ref()
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }
}
