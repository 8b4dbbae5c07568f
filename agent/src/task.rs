//! The task that made the intercepted call.

use hookwatch_protocol::Comm;
#[cfg(target_os = "linux")]
use hookwatch_protocol::COMM_LEN;

/// Read-only view of the calling task.
///
/// Every method is called from the intercepted call path and must not block,
/// sleep or allocate. Methods returning `Option` report `None` when the value
/// cannot be read; the inspector then records a default.
pub trait CurrentTask: Send + Sync {
    fn pid(&self) -> i32;

    fn comm(&self) -> Option<Comm>;

    /// Identifier of the pid namespace the task's children are created in.
    fn pid_namespace(&self) -> Option<u32>;

    /// CPU the task is executing on.
    fn cpu(&self) -> Option<u32>;
}

/// The calling thread of this process, read through libc.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcSelf;

#[cfg(target_os = "linux")]
const PID_NS_PATH: &[u8] = b"/proc/thread-self/ns/pid_for_children\0";

impl CurrentTask for ProcSelf {
    #[inline]
    fn pid(&self) -> i32 {
        unsafe { libc::getpid() }
    }

    #[cfg(target_os = "linux")]
    fn comm(&self) -> Option<Comm> {
        let mut buf = [0u8; COMM_LEN];
        let rc = unsafe { libc::prctl(libc::PR_GET_NAME, buf.as_mut_ptr() as libc::c_ulong, 0, 0, 0) };
        if rc != 0 {
            return None;
        }
        Some(Comm::new(&buf))
    }

    #[cfg(not(target_os = "linux"))]
    fn comm(&self) -> Option<Comm> {
        None
    }

    /// Inode of the thread's `pid_for_children` namespace link.
    #[cfg(target_os = "linux")]
    fn pid_namespace(&self) -> Option<u32> {
        let mut st: libc::stat = unsafe { core::mem::zeroed() };
        let rc = unsafe { libc::stat(PID_NS_PATH.as_ptr() as *const libc::c_char, &mut st) };
        if rc != 0 {
            return None;
        }
        u32::try_from(st.st_ino).ok()
    }

    #[cfg(not(target_os = "linux"))]
    fn pid_namespace(&self) -> Option<u32> {
        None
    }

    #[cfg(target_os = "linux")]
    fn cpu(&self) -> Option<u32> {
        u32::try_from(unsafe { libc::sched_getcpu() }).ok()
    }

    #[cfg(not(target_os = "linux"))]
    fn cpu(&self) -> Option<u32> {
        None
    }
}
