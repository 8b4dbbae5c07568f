use core::ffi::c_void;
use core::fmt;
use core::num::NonZeroUsize;
use std::time::Duration;

use thiserror::Error;

/// Saved register frame handed to a syscall entry point (x86-64 `pt_regs`
/// layout).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PtRegs {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub bp: u64,
    pub bx: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub ax: u64,
    pub cx: u64,
    pub dx: u64,
    pub si: u64,
    pub di: u64,
    /// Syscall number as seen at entry.
    pub orig_ax: u64,
    pub ip: u64,
    pub cs: u64,
    pub flags: u64,
    pub sp: u64,
    pub ss: u64,
}

impl PtRegs {
    /// Frame for syscall `nr` with up to six arguments; missing ones are 0.
    pub fn for_syscall(nr: u64, args: &[u64]) -> Self {
        let arg = |i: usize| args.get(i).copied().unwrap_or(0);
        Self {
            orig_ax: nr,
            di: arg(0),
            si: arg(1),
            dx: arg(2),
            r10: arg(3),
            r8: arg(4),
            r9: arg(5),
            ..Self::default()
        }
    }
}

/// Entry point calling convention: the frame pointer in, the syscall result out.
pub type EntryFn = unsafe extern "C" fn(regs: *const PtRegs) -> i64;

/// Replacement handler installed in place of an entry point. `data` is the
/// opaque pointer registered alongside it.
pub type HandlerFn = unsafe extern "C" fn(regs: *const PtRegs, data: *mut c_void) -> i64;

/// Address of an entry point, tagged with the symbol it was resolved from.
///
/// Deliberately neither `Copy` nor `Clone`: it is moved into the controller at
/// install and dropped at uninstall.
#[derive(Debug, PartialEq, Eq)]
pub struct ResolvedAddress {
    address: NonZeroUsize,
    symbol: String,
}

impl ResolvedAddress {
    pub(crate) fn new(symbol: impl Into<String>, address: NonZeroUsize) -> Self {
        Self {
            address,
            symbol: symbol.into(),
        }
    }

    #[inline]
    pub fn address(&self) -> usize {
        self.address.get()
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

impl fmt::Display for ResolvedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:#x}", self.symbol, self.address)
    }
}

/// Callable that runs the original behavior of a redirected entry point.
#[derive(Clone, Copy)]
pub struct Trampoline(EntryFn);

impl Trampoline {
    /// # Safety
    /// `original` must accept any valid frame and behave like the entry point
    /// it stands in for, for as long as the trampoline is reachable.
    pub unsafe fn from_raw(original: EntryFn) -> Self {
        Self(original)
    }

    #[inline]
    pub fn call(&self, regs: &PtRegs) -> i64 {
        unsafe { (self.0)(regs) }
    }

    pub fn address(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for Trampoline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Trampoline({:#x})", self.address())
    }
}

/// Handler plus opaque user data, as registered with the host.
#[derive(Debug, Clone, Copy)]
pub struct Redirect {
    pub handler: HandlerFn,
    pub data: *mut c_void,
}

// A handler/data pair is shared with every calling thread; the registrant
// guarantees `data` stays valid and thread-safe until the host quiesces.
unsafe impl Send for Redirect {}
unsafe impl Sync for Redirect {}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    #[error("probe on `{symbol}` failed: {reason}")]
    ProbeFailed { symbol: String, reason: &'static str },

    #[error("no candidate symbol could be resolved (tried: {})", .candidates.join(", "))]
    SymbolNotFound { candidates: Vec<String> },

    #[error("a hook is already installed on `{symbol}`")]
    AlreadyInstalled { symbol: String },

    #[error("no hook is installed")]
    NotInstalled,

    #[error("redirection of `{symbol}` rejected: {reason}")]
    InstallRejected { symbol: String, reason: &'static str },

    #[error("restoring `{symbol}` failed: {reason}")]
    RestoreFailed { symbol: String, reason: &'static str },

    #[error("{in_flight} handler call(s) still in flight after {waited:?}")]
    DrainTimeout { in_flight: usize, waited: Duration },
}
