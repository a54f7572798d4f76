//! OS-specific process and lock primitives

mod portable;
#[cfg(unix)]
mod unix;

use crate::core::InitWait;
use crate::error::FleetResult;

pub use portable::ShmemMutex;
#[cfg(unix)]
pub use unix::{prepare_command, process_alive, NamedSemaphore};

/// The fleet lock used on this platform
#[cfg(unix)]
pub type SystemLock = NamedSemaphore;
#[cfg(not(unix))]
pub type SystemLock = ShmemMutex;

/// Open (or create) the fleet-wide lock called `name`.
///
/// `wait` bounds how long an attacher waits for another process to finish
/// creating the lock where creation is not atomic.
#[cfg(unix)]
pub fn open_system_lock(name: &str, _wait: InitWait) -> FleetResult<SystemLock> {
    NamedSemaphore::open(name)
}

#[cfg(not(unix))]
pub fn open_system_lock(name: &str, wait: InitWait) -> FleetResult<SystemLock> {
    ShmemMutex::open(name, wait)
}

pub fn current_pid() -> u32 {
    std::process::id()
}

#[cfg(not(unix))]
pub fn process_alive(pid: u32) -> bool {
    use sysinfo::{Pid, ProcessesToUpdate, System};

    if pid == 0 {
        return false;
    }
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).is_some()
}

#[cfg(not(unix))]
pub fn prepare_command(_cmd: &mut std::process::Command) -> std::io::Result<()> {
    Ok(())
}
