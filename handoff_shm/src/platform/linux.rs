//! Linux-specific shared memory and process operations

use crate::error::{ShmError, ShmResult};
use memmap2::{MmapMut, MmapOptions};
use nix::sched::{CpuSet, sched_setaffinity};
use nix::sys::mman::{MapFlags, ProtFlags, mmap_anonymous, munmap};
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, getpid};
use std::ffi::c_void;
use std::fs::{OpenOptions, remove_file};
use std::num::NonZeroUsize;
use std::os::unix::fs::OpenOptionsExt;
use std::ptr::NonNull;
use tracing::warn;

/// Linux-specific memory mapping configuration
#[derive(Debug, Clone, Copy)]
pub struct LinuxMemoryConfig {
    /// Pre-fault pages at map time (MAP_POPULATE) so the first round
    /// does not pay for page faults
    pub populate: bool,
}

impl Default for LinuxMemoryConfig {
    fn default() -> Self {
        Self { populate: true }
    }
}

/// Map `size` zeroed bytes shared with every process forked afterwards
pub fn map_anonymous_shared(size: usize, config: &LinuxMemoryConfig) -> ShmResult<NonNull<u8>> {
    let length = NonZeroUsize::new(size).ok_or(ShmError::InvalidSize { size })?;

    let mut flags = MapFlags::MAP_SHARED;
    if config.populate {
        flags |= MapFlags::MAP_POPULATE;
    }

    // SAFETY: no address hint, fresh anonymous mapping not aliasing any Rust object.
    let ptr = unsafe {
        mmap_anonymous(
            None,
            length,
            ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
            flags,
        )
    }
    .map_err(|errno| ShmError::ResourceExhausted {
        size,
        source: errno.into(),
    })?;

    Ok(ptr.cast::<u8>())
}

/// Unmap a mapping created by [`map_anonymous_shared`]
///
/// # Safety
///
/// `ptr`/`size` must describe a live mapping from [`map_anonymous_shared`]
/// that is not accessed afterwards.
pub unsafe fn unmap_anonymous(ptr: NonNull<u8>, size: usize) -> ShmResult<()> {
    // SAFETY: forwarded from the caller.
    unsafe { munmap(ptr.cast::<c_void>(), size) }?;
    Ok(())
}

/// Create memory-mapped segment file exclusively
///
/// Open failures come back as `Io`. Once the file exists, a failure to size
/// or map it removes the file again and reports `ResourceExhausted`.
pub fn create_segment_mmap(
    path: &str,
    size: usize,
    config: &LinuxMemoryConfig,
) -> Result<MmapMut, ShmError> {
    let file = OpenOptions::new()
        .create_new(true)
        .read(true)
        .write(true)
        .mode(0o600) // Owner read/write only
        .open(path)?;

    let mut mmap_options = MmapOptions::new();
    mmap_options.len(size);
    if config.populate {
        mmap_options.populate();
    }

    // Extending a new file zero-fills it
    let mapped = file.set_len(size as u64).and_then(|()| {
        // SAFETY: the file was created exclusively above and is only resized here.
        unsafe { mmap_options.map_mut(&file) }
    });

    mapped.map_err(|source| {
        if let Err(e) = remove_file(path) {
            warn!(path, "failed to remove segment file: {}", e);
        }
        ShmError::ResourceExhausted { size, source }
    })
}

/// Attach to existing segment file
pub fn attach_segment_mmap(path: &str) -> ShmResult<MmapMut> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;

    let mmap = unsafe { MmapOptions::new().map_mut(&file)? };
    Ok(mmap)
}

/// Convert to a nix `Pid` naming exactly one process
///
/// 0 and anything above `i32::MAX` would address a process group.
fn process_id(pid: u32) -> ShmResult<Pid> {
    match i32::try_from(pid) {
        Ok(raw) if raw > 0 => Ok(Pid::from_raw(raw)),
        _ => Err(ShmError::InvalidPid { pid }),
    }
}

/// Check if process is alive using kill(pid, 0)
///
/// Zombies still accept signals, so an exited but unreaped child is
/// detected through its `/proc` state instead. Pids that cannot name a
/// single process are never alive.
pub fn is_process_alive(pid: u32) -> bool {
    let Ok(target) = process_id(pid) else {
        return false;
    };
    match kill(target, None::<Signal>) {
        Ok(_) => !is_zombie(pid),
        Err(nix::Error::ESRCH) => false, // No such process
        Err(nix::Error::EPERM) => true,  // Process exists but no permission to signal
        Err(_) => false,
    }
}

/// Read the state field of /proc/<pid>/stat
fn is_zombie(pid: u32) -> bool {
    // Field 3 follows the parenthesized command name, which may contain spaces
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| {
            stat.rsplit_once(')')
                .and_then(|(_, rest)| rest.trim_start().chars().next())
        })
        .is_some_and(|state| state == 'Z' || state == 'X')
}

/// Get current process ID
pub fn get_current_pid() -> u32 {
    getpid().as_raw() as u32
}

/// Pin the calling process to a single CPU
pub fn pin_to_cpu(cpu: usize) -> ShmResult<()> {
    let mut cpu_set = CpuSet::new();
    cpu_set.set(cpu)?;
    sched_setaffinity(Pid::from_raw(0), &cpu_set)?;
    Ok(())
}

/// CPU the calling thread is currently running on
pub fn current_cpu() -> Option<usize> {
    // SAFETY: sched_getcpu has no preconditions.
    let cpu = unsafe { libc::sched_getcpu() };
    usize::try_from(cpu).ok()
}

/// Outcome of [`fork_process`] as seen by the calling process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forked {
    /// Original process; carries the child's pid
    Parent {
        /// Child process ID
        child: u32,
    },
    /// Newly created process
    Child,
}

/// Duplicate the current process
///
/// # Safety
///
/// The caller must be single-threaded, or the child must restrict itself to
/// async-signal-safe operations until it execs or exits.
pub unsafe fn fork_process() -> ShmResult<Forked> {
    // SAFETY: forwarded from the caller.
    match unsafe { nix::unistd::fork() } {
        Ok(ForkResult::Parent { child }) => Ok(Forked::Parent {
            child: child.as_raw() as u32,
        }),
        Ok(ForkResult::Child) => Ok(Forked::Child),
        Err(source) => Err(ShmError::ProcessCreationFailure { source }),
    }
}

/// Kill a process with SIGKILL
pub fn terminate_process(pid: u32) -> ShmResult<()> {
    match kill(process_id(pid)?, Signal::SIGKILL) {
        Ok(()) | Err(nix::Error::ESRCH) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Reap a child process, failing unless it exited with status 0
pub fn wait_for_child(pid: u32) -> ShmResult<()> {
    let child = process_id(pid)?;
    loop {
        match waitpid(child, None) {
            Ok(WaitStatus::Exited(_, 0)) => return Ok(()),
            Ok(WaitStatus::Exited(_, code)) => {
                return Err(ShmError::PartnerFailed {
                    pid,
                    status: format!("exit code {code}"),
                });
            }
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                return Err(ShmError::PartnerFailed {
                    pid,
                    status: format!("killed by {signal}"),
                });
            }
            Ok(_) => continue,
            Err(nix::Error::EINTR) => continue,
            Err(source) => return Err(source.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_map_is_zeroed() {
        let config = LinuxMemoryConfig::default();
        let ptr = map_anonymous_shared(4096, &config).unwrap();
        let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), 4096) };
        assert!(bytes.iter().all(|&b| b == 0));
        unsafe { unmap_anonymous(ptr, 4096).unwrap() };
    }

    #[test]
    fn test_zero_size_rejected() {
        let result = map_anonymous_shared(0, &LinuxMemoryConfig::default());
        assert!(matches!(result, Err(ShmError::InvalidSize { size: 0 })));
    }

    #[test]
    fn test_current_process_alive() {
        assert!(is_process_alive(get_current_pid()));
        assert!(get_current_pid() > 0);
    }

    #[test]
    fn test_group_pids_rejected() {
        assert!(!is_process_alive(0));
        assert!(!is_process_alive(u32::MAX));
        assert!(matches!(
            terminate_process(0),
            Err(ShmError::InvalidPid { pid: 0 })
        ));
        assert!(matches!(
            terminate_process(u32::MAX),
            Err(ShmError::InvalidPid { .. })
        ));
        assert!(matches!(
            wait_for_child(0),
            Err(ShmError::InvalidPid { pid: 0 })
        ));
    }

    #[test]
    fn test_failed_segment_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("segment");
        let path = path.to_str().unwrap();

        let result = create_segment_mmap(path, usize::MAX / 2, &LinuxMemoryConfig::default());
        assert!(matches!(result, Err(ShmError::ResourceExhausted { .. })));
        assert!(!std::path::Path::new(path).exists());
    }

    #[test]
    fn test_segment_open_error_is_io() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("segment");

        let result = create_segment_mmap(
            path.to_str().unwrap(),
            64,
            &LinuxMemoryConfig::default(),
        );
        assert!(matches!(result, Err(ShmError::Io { .. })));
    }

    #[test]
    fn test_reaped_process_not_alive() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        assert!(!is_process_alive(pid));
    }

    #[test]
    fn test_pin_to_invalid_cpu() {
        assert!(pin_to_cpu(usize::MAX / 2).is_err());
    }
}
