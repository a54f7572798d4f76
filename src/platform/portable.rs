//! Cross-process mutex that lives in its own shared memory segment

use crate::core::lock::CrossProcessLock;
use crate::core::InitWait;
use crate::error::{errors, FleetError, FleetResult};
use crate::logging::debug;
use raw_sync::locks::{LockImpl, LockInit, Mutex};
use shared_memory::{Shmem, ShmemConf, ShmemError};
use std::sync::atomic::{AtomicU8, Ordering};

// ready flag at offset 0, mutex storage at MUTEX_OFFSET
const MUTEX_OFFSET: usize = 16;
const READY: u8 = 1;

/// A `raw_sync` mutex placed in a named segment.
///
/// The segment is never unlinked by its creator, so the lock outlives every
/// participant just like a named semaphore would.
pub struct ShmemMutex {
    // dropped before the mapping it points into
    lock: Box<dyn LockImpl>,
    _shm: Shmem,
    name: String,
}

// SAFETY: raw_sync mutexes are process-shared and usable from any thread;
// the mapping outlives `lock` by field order.
unsafe impl Send for ShmemMutex {}
unsafe impl Sync for ShmemMutex {}

impl ShmemMutex {
    pub fn open(name: &str, wait: InitWait) -> FleetResult<Self> {
        let size = MUTEX_OFFSET + Mutex::size_of(None) + 8;
        let conf = ShmemConf::new().os_id(name).size(size);

        let (mut shm, created) = match conf.create() {
            Ok(shm) => (shm, true),
            Err(ShmemError::MappingIdExists) => {
                let conf = ShmemConf::new().os_id(name).size(size);
                (conf.open().map_err(|err| shmem_failed(name, err))?, false)
            }
            Err(err) => return Err(shmem_failed(name, err)),
        };
        shm.set_owner(false);

        let base = shm.as_ptr();
        // SAFETY: the mapping is at least `size` bytes and page aligned
        let (ready, mutex_ptr) = unsafe { (&*(base as *const AtomicU8), base.add(MUTEX_OFFSET)) };
        let data_ptr = unsafe { mutex_ptr.add(Mutex::size_of(Some(mutex_ptr))) };

        let lock = if created {
            let (lock, _) = unsafe { Mutex::new(mutex_ptr, data_ptr) }
                .map_err(|err| init_failed(name, "create", err.to_string()))?;
            ready.store(READY, Ordering::Release);
            debug(format!("created shared mutex {name}"));
            lock
        } else {
            wait_ready(ready, name, wait)?;
            let (lock, _) = unsafe { Mutex::from_existing(mutex_ptr, data_ptr) }
                .map_err(|err| init_failed(name, "attach", err.to_string()))?;
            debug(format!("attached to shared mutex {name}"));
            lock
        };

        Ok(Self {
            lock,
            _shm: shm,
            name: name.to_string(),
        })
    }
}

impl CrossProcessLock for ShmemMutex {
    fn lock(&self) -> FleetResult<()> {
        let guard = self
            .lock
            .lock()
            .map_err(|err| errors::concurrency_error(format!("{}: {}", self.name, err), "lock"))?;
        // released explicitly through `unlock`
        std::mem::forget(guard);
        Ok(())
    }

    fn unlock(&self) -> FleetResult<()> {
        self.lock
            .release()
            .map_err(|err| errors::concurrency_error(format!("{}: {}", self.name, err), "unlock"))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn wait_ready(ready: &AtomicU8, name: &str, wait: InitWait) -> FleetResult<()> {
    for _ in 0..=wait.attempts {
        if ready.load(Ordering::Acquire) == READY {
            return Ok(());
        }
        std::thread::sleep(wait.step);
    }
    Err(errors::timeout_error(
        format!("shared mutex {name} was never initialized"),
        wait.budget().as_millis() as u64,
    ))
}

fn shmem_failed(name: &str, err: ShmemError) -> FleetError {
    FleetError::Resource {
        message: format!("shared mutex segment {name}: {err}"),
        resource_type: format!("shared_memory:{name}"),
        source: Some(Box::new(err)),
    }
}

fn init_failed(name: &str, stage: &str, reason: String) -> FleetError {
    errors::concurrency_error(format!("failed to {stage} shared mutex {name}: {reason}"), stage)
}
