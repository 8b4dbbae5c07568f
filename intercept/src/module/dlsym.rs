use std::ffi::CString;

use log::debug;

use crate::resolver::{Probe, SymbolProbe};
use crate::types::HookError;

/// Probes exported symbols of the running process through the dynamic linker.
///
/// Each registration holds a `dlopen(NULL)` handle for the probe's lifetime;
/// unregistering closes it.
#[derive(Debug, Default, Clone, Copy)]
pub struct DlsymProbe;

impl DlsymProbe {
    pub fn new() -> Self {
        Self
    }
}

impl SymbolProbe for DlsymProbe {
    fn register_probe(&self, symbol: &str) -> Result<Probe, HookError> {
        let cstr = CString::new(symbol).map_err(|_| HookError::ProbeFailed {
            symbol: symbol.to_string(),
            reason: "symbol name contains a NUL byte",
        })?;
        unsafe {
            let handle = libc::dlopen(core::ptr::null(), libc::RTLD_NOW);
            if handle.is_null() {
                return Err(HookError::ProbeFailed {
                    symbol: symbol.to_string(),
                    reason: "dlopen of the main program failed",
                });
            }
            let p = libc::dlsym(handle, cstr.as_ptr());
            if p.is_null() {
                libc::dlclose(handle);
                return Err(HookError::ProbeFailed {
                    symbol: symbol.to_string(),
                    reason: "dlsym found no such symbol",
                });
            }
            Ok(Probe::new(symbol, p as usize).with_token(handle as usize))
        }
    }

    fn unregister_probe(&self, probe: Probe) {
        debug!("releasing probe on {}", probe.symbol());
        let handle = probe.token() as *mut libc::c_void;
        if !handle.is_null() {
            unsafe {
                libc::dlclose(handle);
            }
        }
    }
}
