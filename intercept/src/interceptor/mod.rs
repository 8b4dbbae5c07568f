use crate::types::{HookError, PtRegs, Redirect, ResolvedAddress, Trampoline};
use core::ffi::c_void;
use log::{error, info, warn};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub mod invocation;

/// Default bound on waiting for in-flight handler calls at uninstall.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Host redirection primitive.
///
/// `synchronize` is the quiescence point: once it returns `Ok`, no call that
/// observed a restored redirect is still running its handler, so the
/// handler's data may be freed.
pub trait Redirector: Send + Sync {
    /// Callable that runs the original behavior at `target`.
    fn trampoline(&self, target: &ResolvedAddress) -> Result<Trampoline, HookError>;

    /// Route every future call of `target` to `redirect.handler`.
    ///
    /// # Safety
    /// `redirect.data` must stay valid until `restore` and a successful
    /// `synchronize` have both returned.
    unsafe fn redirect(&self, target: &ResolvedAddress, redirect: Redirect) -> Result<(), HookError>;

    fn restore(&self, target: &ResolvedAddress) -> Result<(), HookError>;

    fn synchronize(&self, timeout: Duration) -> Result<(), HookError>;
}

impl<R: Redirector + ?Sized> Redirector for Arc<R> {
    fn trampoline(&self, target: &ResolvedAddress) -> Result<Trampoline, HookError> {
        (**self).trampoline(target)
    }

    unsafe fn redirect(&self, target: &ResolvedAddress, redirect: Redirect) -> Result<(), HookError> {
        (**self).redirect(target, redirect)
    }

    fn restore(&self, target: &ResolvedAddress) -> Result<(), HookError> {
        (**self).restore(target)
    }

    fn synchronize(&self, timeout: Duration) -> Result<(), HookError> {
        (**self).synchronize(timeout)
    }
}

impl<R: Redirector + ?Sized> Redirector for &R {
    fn trampoline(&self, target: &ResolvedAddress) -> Result<Trampoline, HookError> {
        (**self).trampoline(target)
    }

    unsafe fn redirect(&self, target: &ResolvedAddress, redirect: Redirect) -> Result<(), HookError> {
        (**self).redirect(target, redirect)
    }

    fn restore(&self, target: &ResolvedAddress) -> Result<(), HookError> {
        (**self).restore(target)
    }

    fn synchronize(&self, timeout: Duration) -> Result<(), HookError> {
        (**self).synchronize(timeout)
    }
}

/// Replacement behavior for an intercepted entry point.
///
/// Runs on whichever thread made the call. `original` runs the intercepted
/// behavior; returning its result keeps the hook transparent.
pub trait CallHandler: Send + Sync {
    fn on_call(&self, regs: &PtRegs, original: Trampoline) -> i64;
}

/// How uninstall left the handler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drain {
    /// Every in-flight call finished; the handler state was freed.
    Complete,
    /// Calls were still running when the drain timeout expired; the handler
    /// state was leaked and they may still be using it.
    TimedOut,
}

struct Attachment {
    handler: Arc<dyn CallHandler>,
    original: Trampoline,
}

unsafe extern "C" fn dispatch(regs: *const PtRegs, data: *mut c_void) -> i64 {
    let attachment = &*(data as *const Attachment);
    attachment.handler.on_call(&*regs, attachment.original)
}

struct Installation {
    target: ResolvedAddress,
    attachment: Box<Attachment>,
}

enum HookState {
    Uninstalled,
    Installed(Installation),
}

/// Owns the single redirection of one entry point.
///
/// Install and uninstall are serialized on an internal mutex; the call path
/// never touches it.
pub struct HookController<R: Redirector> {
    redirector: R,
    state: Mutex<HookState>,
    drain_timeout: Duration,
}

impl<R: Redirector> HookController<R> {
    pub fn new(redirector: R) -> Self {
        Self {
            redirector,
            state: Mutex::new(HookState::Uninstalled),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn redirector(&self) -> &R {
        &self.redirector
    }

    fn lock_state(&self) -> MutexGuard<'_, HookState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_installed(&self) -> bool {
        matches!(*self.lock_state(), HookState::Installed(_))
    }

    /// Address currently redirected, if any.
    pub fn target_address(&self) -> Option<usize> {
        match &*self.lock_state() {
            HookState::Installed(i) => Some(i.target.address()),
            HookState::Uninstalled => None,
        }
    }

    /// Redirect `target` to `handler`.
    ///
    /// The trampoline and handler attachment are fully built before the
    /// redirect is published, so the first intercepted call already sees a
    /// consistent state.
    pub fn install(&self, target: ResolvedAddress, handler: Arc<dyn CallHandler>) -> Result<(), HookError> {
        let mut state = self.lock_state();
        if let HookState::Installed(current) = &*state {
            warn!("refusing second install on {}; {} is already hooked", target, current.target);
            return Err(HookError::AlreadyInstalled {
                symbol: current.target.symbol().to_string(),
            });
        }

        let original = self.redirector.trampoline(&target).map_err(|e| {
            error!("no trampoline for {}: {}", target, e);
            e
        })?;
        let attachment = Box::new(Attachment { handler, original });
        let redirect = Redirect {
            handler: dispatch,
            data: &*attachment as *const Attachment as *mut c_void,
        };

        // Safety: the attachment is kept in `state` until restore and
        // synchronize succeed, or leaked if they do not.
        if let Err(e) = unsafe { self.redirector.redirect(&target, redirect) } {
            error!("redirect of {} rejected: {}", target, e);
            return Err(e);
        }

        info!("redirected {} (trampoline {:#x})", target, original.address());
        *state = HookState::Installed(Installation { target, attachment });
        Ok(())
    }

    /// Restore the original entry point and release the handler.
    ///
    /// Once the entry is restored this returns `Ok`, even when in-flight
    /// calls outlive the drain timeout.
    pub fn uninstall(&self) -> Result<Drain, HookError> {
        let mut state = self.lock_state();
        let installation = match std::mem::replace(&mut *state, HookState::Uninstalled) {
            HookState::Installed(i) => i,
            HookState::Uninstalled => return Err(HookError::NotInstalled),
        };

        if let Err(e) = self.redirector.restore(&installation.target) {
            error!(
                "FAILED to restore {}: {}; the redirect is still live",
                installation.target, e
            );
            *state = HookState::Installed(installation);
            return Err(e);
        }

        match self.redirector.synchronize(self.drain_timeout) {
            Ok(()) => {
                info!("restored {}", installation.target);
                Ok(Drain::Complete)
            }
            Err(e) => {
                // A straggler may still be reading the attachment.
                warn!("restored {} but {}; leaking handler state", installation.target, e);
                std::mem::forget(installation.attachment);
                Ok(Drain::TimedOut)
            }
        }
    }
}

impl<R: Redirector> Drop for HookController<R> {
    fn drop(&mut self) {
        match self.uninstall() {
            Ok(_) | Err(HookError::NotInstalled) => {}
            Err(e) => {
                error!("hook still live at teardown ({}); leaking handler state", e);
                let state = self.state.get_mut().unwrap_or_else(|e| e.into_inner());
                if let HookState::Installed(i) = std::mem::replace(state, HookState::Uninstalled) {
                    std::mem::forget(i.attachment);
                }
            }
        }
    }
}
