use crate::config::INITIAL_COUNTER_VALUE;
use crate::core::lock::{acquire, CrossProcessLock, LockGuard};
use crate::core::models::CounterRecord;
use crate::error::{errors, FleetError, FleetResult};
use crate::logging::debug;
use shared_memory::{Shmem, ShmemConf, ShmemError};
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::time::Duration;
use thiserror::Error;

const RECORD_SIZE: usize = std::mem::size_of::<CounterRecord>();

/// Bounded sleep-and-retry budget for attaching to a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitWait {
    pub attempts: u32,
    pub step: Duration,
}

impl InitWait {
    pub fn new(attempts: u32, step: Duration) -> Self {
        Self { attempts, step }
    }

    pub fn budget(&self) -> Duration {
        self.step * self.attempts
    }

    fn budget_ms(&self) -> u64 {
        self.budget().as_millis() as u64
    }
}

#[derive(Debug, Error)]
pub(crate) enum SegmentError {
    #[error("shared memory region too small for counter record ({0} bytes)")]
    RegionTooSmall(usize),
    #[error("shared memory error: {0}")]
    Shmem(#[from] ShmemError),
}

/// The fleet-wide counter segment.
///
/// The process that creates the OS object is its owner: it seeds the record
/// and removes the object when dropped. Attachers only unmap.
pub struct SharedState {
    shm: Shmem,
    record: NonNull<CounterRecord>,
    is_owner: bool,
    name: String,
}

// SAFETY: the mapping stays valid for the lifetime of `SharedState`, and the
// record behind it is only dereferenced through `StateGuard`, which holds the
// cross-process lock. `initialized` is atomic.
unsafe impl Send for SharedState {}
unsafe impl Sync for SharedState {}

impl SharedState {
    /// Attach to the segment called `name`, creating and seeding it if absent.
    ///
    /// An attacher waits up to `wait` for the creator to finish seeding and
    /// fails with a timeout error rather than trusting an uninitialized record.
    pub fn create_or_attach(name: &str, wait: InitWait) -> FleetResult<Self> {
        let mut attempt = 0;
        let (shm, is_owner) = loop {
            match open_or_create(name) {
                Ok(opened) => break opened,
                Err(SegmentError::Shmem(err)) if is_transient(&err) && attempt < wait.attempts => {
                    debug(format!("segment {name} not ready yet ({err}), retrying"));
                    attempt += 1;
                    std::thread::sleep(wait.step);
                }
                Err(err) => return Err(to_fleet(err, name)),
            }
        };

        if shm.len() < RECORD_SIZE {
            return Err(to_fleet(SegmentError::RegionTooSmall(shm.len()), name));
        }

        let record = NonNull::new(shm.as_ptr() as *mut CounterRecord).ok_or_else(|| {
            errors::resource_error(
                "shared memory mapping returned a null pointer",
                format!("shared_memory:{name}"),
                std::io::Error::from(std::io::ErrorKind::InvalidData),
            )
        })?;

        let state = Self {
            shm,
            record,
            is_owner,
            name: name.to_string(),
        };

        if state.is_owner {
            // SAFETY: we created the mapping and no other process trusts it
            // until `initialized` is published by `seed`.
            unsafe {
                std::ptr::write_bytes(state.record.as_ptr(), 0, 1);
                (*state.record.as_ptr()).seed(INITIAL_COUNTER_VALUE);
            }
            debug(format!("created shared segment {name}"));
        } else {
            state.wait_until_initialized(wait)?;
            debug(format!("attached to shared segment {name}"));
        }

        Ok(state)
    }

    fn wait_until_initialized(&self, wait: InitWait) -> FleetResult<()> {
        for _ in 0..wait.attempts {
            if self.initialized() {
                return Ok(());
            }
            std::thread::sleep(wait.step);
        }

        if self.initialized() {
            return Ok(());
        }

        Err(errors::timeout_error(
            format!("shared segment {} was never initialized by its creator", self.name),
            wait.budget_ms(),
        ))
    }

    fn initialized(&self) -> bool {
        // SAFETY: `initialized` is an atomic and the mapping is live.
        unsafe { self.record.as_ref().is_initialized() }
    }

    pub fn is_owner(&self) -> bool {
        self.is_owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Address of the live record.
    ///
    /// Dereferencing it without holding the fleet lock races with every
    /// other participant; use [`SharedState::lock`] instead.
    pub fn as_ptr(&self) -> NonNull<CounterRecord> {
        self.record
    }

    /// Acquire `lock` and return exclusive access to the live record.
    pub fn lock<'a>(&'a self, lock: &'a dyn CrossProcessLock) -> FleetResult<StateGuard<'a>> {
        let guard = acquire(lock)?;
        Ok(StateGuard {
            record: self.record,
            _guard: guard,
            _state: self,
        })
    }
}

impl Drop for SharedState {
    fn drop(&mut self) {
        // `Shmem` unmaps on drop and unlinks the OS object only when owned
        if self.shm.is_owner() {
            debug(format!("removing shared segment {}", self.name));
        }
    }
}

/// Exclusive view of the shared record while the fleet lock is held
pub struct StateGuard<'a> {
    record: NonNull<CounterRecord>,
    _guard: LockGuard<'a>,
    _state: &'a SharedState,
}

impl Deref for StateGuard<'_> {
    type Target = CounterRecord;

    fn deref(&self) -> &CounterRecord {
        // SAFETY: the lock is held for the guard's lifetime and the mapping
        // outlives it through `_state`.
        unsafe { self.record.as_ref() }
    }
}

impl DerefMut for StateGuard<'_> {
    fn deref_mut(&mut self) -> &mut CounterRecord {
        // SAFETY: as in `deref`; the lock makes this the only live reference.
        unsafe { self.record.as_mut() }
    }
}

fn open_or_create(name: &str) -> Result<(Shmem, bool), SegmentError> {
    match open_existing(name) {
        Ok(shm) => Ok((shm, false)),
        Err(SegmentError::Shmem(ShmemError::MapOpenFailed(_)))
        | Err(SegmentError::Shmem(ShmemError::LinkDoesNotExist))
        | Err(SegmentError::Shmem(ShmemError::NoLinkOrOsId)) => create_or_retry(name),
        Err(err) => Err(err),
    }
}

fn open_existing(name: &str) -> Result<Shmem, SegmentError> {
    let conf = ShmemConf::new().os_id(name).size(RECORD_SIZE);
    Ok(conf.open()?)
}

fn create_or_retry(name: &str) -> Result<(Shmem, bool), SegmentError> {
    let conf = ShmemConf::new().os_id(name).size(RECORD_SIZE);
    match conf.create() {
        Ok(shm) => Ok((shm, true)),
        Err(ShmemError::MappingIdExists) => open_existing(name).map(|shm| (shm, false)),
        Err(err) => Err(SegmentError::from(err)),
    }
}

/// Errors seen while another process is between creating and sizing the
/// segment, or while two creators race.
fn is_transient(err: &ShmemError) -> bool {
    matches!(
        err,
        ShmemError::MapSizeZero | ShmemError::MapOpenFailed(_) | ShmemError::MappingIdExists
    )
}

fn to_fleet(err: SegmentError, name: &str) -> FleetError {
    match err {
        SegmentError::RegionTooSmall(len) => FleetError::Resource {
            message: format!("shared memory region too small for counter record ({len} bytes)"),
            resource_type: format!("shared_memory:{name}"),
            source: None,
        },
        SegmentError::Shmem(source) => FleetError::Resource {
            message: format!("shared memory error ({name}): {source}"),
            resource_type: format!("shared_memory:{name}"),
            source: Some(Box::new(source)),
        },
    }
}
