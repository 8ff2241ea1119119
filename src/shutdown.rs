//! Process-wide registry of running ffmpeg processes.
//!
//! A host application that wants its conversions to die with it calls
//! [`terminate_registered`] from its own shutdown path (for example after
//! `tokio::signal::ctrl_c()` resolves). Processes are registered by
//! [`ProcessHandle::execute`](crate::ProcessHandle::execute) and leave the
//! registry when their handle is destroyed.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;
use tracing::{debug, warn};

static REGISTRY: Lazy<Mutex<HashMap<u64, u32>>> = Lazy::new(|| Mutex::new(HashMap::new()));
static NEXT_ID: AtomicU64 = AtomicU64::new(0);

fn registry() -> MutexGuard<'static, HashMap<u64, u32>> {
    // A panic while holding the lock cannot leave the map inconsistent.
    REGISTRY.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Registration of one process in the shutdown registry.
///
/// Dropping the hook removes the registration.
#[derive(Debug)]
pub(crate) struct ShutdownHook {
    id: u64,
    pid: u32,
}

impl ShutdownHook {
    pub(crate) fn register(pid: u32) -> Self {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        registry().insert(id, pid);
        debug!(pid, "registered ffmpeg process for shutdown termination");
        Self { id, pid }
    }
}

impl Drop for ShutdownHook {
    fn drop(&mut self) {
        registry().remove(&self.id);
        debug!(pid = self.pid, "removed ffmpeg process from shutdown registry");
    }
}

/// Returns how many processes are currently registered.
pub fn registered_count() -> usize {
    registry().len()
}

/// Force-kills every registered process and returns how many were signalled.
///
/// Registrations stay in place until their handles are destroyed, so calling
/// this more than once is harmless.
pub fn terminate_registered() -> usize {
    let pids: Vec<u32> = registry().values().copied().collect();
    let mut signalled = 0;
    for pid in pids {
        match kill(pid) {
            Ok(()) => signalled += 1,
            Err(e) => warn!(pid, error = %e, "failed to terminate ffmpeg process"),
        }
    }
    signalled
}

#[cfg(unix)]
fn kill(pid: u32) -> io::Result<()> {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let pid = i32::try_from(pid).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    signal::kill(Pid::from_raw(pid), Signal::SIGKILL).map_err(io::Error::from)
}

#[cfg(windows)]
fn kill(pid: u32) -> io::Result<()> {
    use windows_sys::Win32::Foundation::CloseHandle;
    use windows_sys::Win32::System::Threading::{OpenProcess, PROCESS_TERMINATE, TerminateProcess};

    let handle = unsafe { OpenProcess(PROCESS_TERMINATE, 0, pid) };
    if handle.is_null() {
        return Err(io::Error::last_os_error());
    }
    let result = unsafe { TerminateProcess(handle, 1) };
    let error = io::Error::last_os_error();
    unsafe { CloseHandle(handle) };
    if result == 0 { Err(error) } else { Ok(()) }
}

#[cfg(not(any(unix, windows)))]
fn kill(_pid: u32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "Terminating processes is not supported on this platform",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_deregisters_on_drop() {
        // Other tests may register processes concurrently, so only look at this entry.
        let hook = ShutdownHook::register(u32::MAX);
        assert!(registry().values().any(|pid| *pid == u32::MAX));
        let id = hook.id;
        drop(hook);
        assert!(!registry().contains_key(&id));
    }
}
