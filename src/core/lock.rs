use crate::error::FleetResult;
use crate::logging::error;

/// Binary mutual exclusion shared by unrelated processes.
///
/// `lock` blocks the calling thread until it is the sole holder; `unlock`
/// releases the slot and wakes at most one waiter. There is no fairness and
/// no timeout: a holder that dies without unlocking leaves the lock held for
/// every process on the host.
pub trait CrossProcessLock: Send + Sync {
    fn lock(&self) -> FleetResult<()>;
    fn unlock(&self) -> FleetResult<()>;
    /// Well-known name every participant resolves to the same OS object
    fn name(&self) -> &str;
}

/// Holds a [`CrossProcessLock`] until dropped
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    lock: &'a dyn CrossProcessLock,
}

/// Block until `lock` is held and return a guard that releases it.
pub fn acquire(lock: &dyn CrossProcessLock) -> FleetResult<LockGuard<'_>> {
    lock.lock()?;
    Ok(LockGuard { lock })
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.lock.unlock() {
            error(format!("failed to release lock {}: {}", self.lock.name(), err));
        }
    }
}
