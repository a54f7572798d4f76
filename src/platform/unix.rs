use crate::core::lock::CrossProcessLock;
use crate::error::{errors, FleetError, FleetResult};
use crate::logging::debug;
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::ffi::CString;
use std::io;
use std::process::Command;

/// Put the child in its own process group before exec.
///
/// Keyboard signals delivered to the participant's group then never reach a
/// worker that is inside its critical section.
pub fn prepare_command(cmd: &mut Command) -> io::Result<()> {
    use std::os::unix::process::CommandExt;

    unsafe {
        cmd.pre_exec(|| {
            if set_process_group() != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }

    Ok(())
}

/// Check if process is alive
///
/// `0` is never a live process here. A permission error means the PID exists
/// but belongs to someone else, which still counts as alive.
pub fn process_alive(pid: u32) -> bool {
    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }

    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Encapsulates unsafe setpgid call
unsafe fn set_process_group() -> libc::c_int {
    unsafe { libc::setpgid(0, 0) }
}

/// POSIX named semaphore with an initial count of one
pub struct NamedSemaphore {
    sem: *mut libc::sem_t,
    name: String,
}

// SAFETY: sem_wait/sem_post are thread-safe and the handle is only closed on drop.
unsafe impl Send for NamedSemaphore {}
unsafe impl Sync for NamedSemaphore {}

impl NamedSemaphore {
    /// Open the semaphore called `name`, creating it with count 1 if absent.
    pub fn open(name: &str) -> FleetResult<Self> {
        let name = normalize_name(name);
        let c_name = c_name(&name)?;

        let mode: libc::c_uint = 0o666;
        let initial: libc::c_uint = 1;
        let mut sem =
            unsafe { libc::sem_open(c_name.as_ptr(), libc::O_CREAT | libc::O_EXCL, mode, initial) };

        if sem == libc::SEM_FAILED {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EEXIST) {
                return Err(open_failed(&name, err));
            }
            sem = unsafe { libc::sem_open(c_name.as_ptr(), 0) };
            if sem == libc::SEM_FAILED {
                return Err(open_failed(&name, io::Error::last_os_error()));
            }
            debug(format!("opened existing semaphore {name}"));
        } else {
            debug(format!("created semaphore {name}"));
        }

        Ok(Self { sem, name })
    }

    /// Remove the OS object. A missing semaphore is not an error.
    pub fn unlink(name: &str) -> FleetResult<()> {
        let name = normalize_name(name);
        let c_name = c_name(&name)?;
        if unsafe { libc::sem_unlink(c_name.as_ptr()) } == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ENOENT) {
            Ok(())
        } else {
            Err(errors::resource_error(
                format!("failed to unlink semaphore {name}"),
                "semaphore",
                err,
            ))
        }
    }
}

impl CrossProcessLock for NamedSemaphore {
    fn lock(&self) -> FleetResult<()> {
        loop {
            if unsafe { libc::sem_wait(self.sem) } == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(lock_failed(&self.name, "sem_wait", err));
        }
    }

    fn unlock(&self) -> FleetResult<()> {
        if unsafe { libc::sem_post(self.sem) } == 0 {
            Ok(())
        } else {
            Err(lock_failed(&self.name, "sem_post", io::Error::last_os_error()))
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for NamedSemaphore {
    fn drop(&mut self) {
        unsafe {
            libc::sem_close(self.sem);
        }
    }
}

fn normalize_name(name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{name}")
    }
}

fn c_name(name: &str) -> FleetResult<CString> {
    CString::new(name).map_err(|_| {
        errors::validation_error(
            "semaphore name must not contain NUL bytes",
            Some("lock_name"),
            Some(name),
        )
    })
}

fn open_failed(name: &str, err: io::Error) -> FleetError {
    errors::resource_error(format!("failed to open semaphore {name}: {err}"), "semaphore", err)
}

fn lock_failed(name: &str, operation: &str, err: io::Error) -> FleetError {
    FleetError::Concurrency {
        message: format!("{operation} on {name} failed: {err}"),
        operation: Some(operation.to_string()),
        source: Some(Box::new(err)),
    }
}
