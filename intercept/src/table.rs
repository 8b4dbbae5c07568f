//! Software entry table: a host whose entry points dispatch through a
//! per-entry redirect slot.
//!
//! Every call enters through [`EntryTable::call`]. While a redirect is
//! published for an entry, the call goes to its handler instead of the
//! original function; the trampoline for an entry is the original function
//! itself, which bypasses the slot. Handler invocations are counted so that
//! `synchronize` can wait until no caller still holds a retired redirect.

use core::ptr;
use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::debug;

use crate::interceptor::Redirector;
use crate::resolver::{Probe, SymbolProbe};
use crate::types::{EntryFn, HookError, PtRegs, Redirect, ResolvedAddress, Trampoline};

struct Entry {
    symbol: String,
    original: EntryFn,
    /// The host refuses to redirect this entry.
    notrace: bool,
    redirect: AtomicPtr<Redirect>,
    in_flight: AtomicUsize,
}

impl Entry {
    fn new(symbol: impl Into<String>, original: EntryFn, notrace: bool) -> Self {
        Self {
            symbol: symbol.into(),
            original,
            notrace,
            redirect: AtomicPtr::new(ptr::null_mut()),
            in_flight: AtomicUsize::new(0),
        }
    }

    #[inline]
    fn address(&self) -> usize {
        self.original as usize
    }

    fn dispatch(&self, regs: &PtRegs) -> i64 {
        // Announce before looking at the slot, so a restore that clears the
        // slot and then sees in_flight == 0 knows nobody holds the old value.
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let redirect = self.redirect.load(Ordering::SeqCst);
        if redirect.is_null() {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            return unsafe { (self.original)(regs) };
        }

        // Safety: retired redirects are freed only once in_flight is zero.
        let ret = unsafe {
            let redirect = &*redirect;
            (redirect.handler)(regs, redirect.data)
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        ret
    }
}

#[derive(Default)]
pub struct EntryTableBuilder {
    entries: Vec<Entry>,
}

impl EntryTableBuilder {
    pub fn entry(mut self, symbol: impl Into<String>, original: EntryFn) -> Self {
        self.entries.push(Entry::new(symbol, original, false));
        self
    }

    /// An entry that can be probed and called but never redirected.
    pub fn notrace_entry(mut self, symbol: impl Into<String>, original: EntryFn) -> Self {
        self.entries.push(Entry::new(symbol, original, true));
        self
    }

    pub fn build(self) -> EntryTable {
        EntryTable {
            entries: self.entries,
            active_probes: AtomicUsize::new(0),
            retired: Mutex::new(Vec::new()),
        }
    }
}

pub struct EntryTable {
    entries: Vec<Entry>,
    active_probes: AtomicUsize,
    retired: Mutex<Vec<Box<Redirect>>>,
}

impl EntryTable {
    pub fn builder() -> EntryTableBuilder {
        EntryTableBuilder::default()
    }

    fn by_symbol(&self, symbol: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.symbol == symbol)
    }

    fn by_address(&self, address: usize) -> Option<&Entry> {
        self.entries.iter().find(|e| e.address() == address)
    }

    fn lock_retired(&self) -> MutexGuard<'_, Vec<Box<Redirect>>> {
        self.retired.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Invoke the entry named `symbol`. `None` if there is no such entry.
    pub fn call(&self, symbol: &str, regs: &PtRegs) -> Option<i64> {
        self.by_symbol(symbol).map(|e| e.dispatch(regs))
    }

    pub fn address_of(&self, symbol: &str) -> Option<usize> {
        self.by_symbol(symbol).map(Entry::address)
    }

    pub fn is_redirected(&self, symbol: &str) -> bool {
        self.by_symbol(symbol)
            .is_some_and(|e| !e.redirect.load(Ordering::SeqCst).is_null())
    }

    /// Probes registered and not yet unregistered.
    pub fn active_probes(&self) -> usize {
        self.active_probes.load(Ordering::SeqCst)
    }

    /// Calls currently inside a dispatch, across all entries.
    pub fn in_flight(&self) -> usize {
        self.entries
            .iter()
            .map(|e| e.in_flight.load(Ordering::SeqCst))
            .sum()
    }

    fn redirectable(&self, target: &ResolvedAddress) -> Result<&Entry, HookError> {
        let entry = self
            .by_address(target.address())
            .ok_or_else(|| HookError::InstallRejected {
                symbol: target.symbol().to_string(),
                reason: "address is not an entry point",
            })?;
        if entry.notrace {
            return Err(HookError::InstallRejected {
                symbol: target.symbol().to_string(),
                reason: "entry is marked notrace",
            });
        }
        Ok(entry)
    }
}

impl SymbolProbe for EntryTable {
    fn register_probe(&self, symbol: &str) -> Result<Probe, HookError> {
        let entry = self.by_symbol(symbol).ok_or_else(|| HookError::ProbeFailed {
            symbol: symbol.to_string(),
            reason: "no such symbol",
        })?;
        self.active_probes.fetch_add(1, Ordering::SeqCst);
        Ok(Probe::new(symbol, entry.address()))
    }

    fn unregister_probe(&self, probe: Probe) {
        debug!("unregistering probe on {}", probe.symbol());
        self.active_probes.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Redirector for EntryTable {
    fn trampoline(&self, target: &ResolvedAddress) -> Result<Trampoline, HookError> {
        let entry = self.redirectable(target)?;
        // Safety: the original function is never modified by this host.
        Ok(unsafe { Trampoline::from_raw(entry.original) })
    }

    unsafe fn redirect(&self, target: &ResolvedAddress, redirect: Redirect) -> Result<(), HookError> {
        let entry = self.redirectable(target)?;
        let slot = Box::into_raw(Box::new(redirect));
        if entry
            .redirect
            .compare_exchange(ptr::null_mut(), slot, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            drop(Box::from_raw(slot));
            return Err(HookError::InstallRejected {
                symbol: target.symbol().to_string(),
                reason: "entry is already redirected",
            });
        }
        Ok(())
    }

    fn restore(&self, target: &ResolvedAddress) -> Result<(), HookError> {
        let entry = self
            .by_address(target.address())
            .ok_or_else(|| HookError::RestoreFailed {
                symbol: target.symbol().to_string(),
                reason: "address is not an entry point",
            })?;
        let old = entry.redirect.swap(ptr::null_mut(), Ordering::SeqCst);
        if old.is_null() {
            return Err(HookError::RestoreFailed {
                symbol: target.symbol().to_string(),
                reason: "entry is not redirected",
            });
        }
        // Safety: `old` came from Box::into_raw in `redirect` and is no longer
        // published; callers that loaded it are counted in in_flight.
        self.lock_retired().push(unsafe { Box::from_raw(old) });
        Ok(())
    }

    fn synchronize(&self, timeout: Duration) -> Result<(), HookError> {
        let start = Instant::now();
        loop {
            let in_flight = self.in_flight();
            if in_flight == 0 {
                self.lock_retired().clear();
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(HookError::DrainTimeout {
                    in_flight,
                    waited: timeout,
                });
            }
            std::thread::yield_now();
        }
    }
}

impl Drop for EntryTable {
    fn drop(&mut self) {
        for entry in &self.entries {
            let slot = entry.redirect.swap(ptr::null_mut(), Ordering::SeqCst);
            if !slot.is_null() {
                drop(unsafe { Box::from_raw(slot) });
            }
        }
    }
}
