//! Entry-point address discovery through transient host probes.
//!
//! The target entry point is not reachable through a stable symbol table, so
//! each candidate name is probed: the host binds a lightweight probe to the
//! name, reports the address it bound to, and the probe is torn down again
//! immediately. Probes are a discovery mechanism only and never outlive a
//! single attempt.

use core::num::NonZeroUsize;

use log::{error, info, warn};

use crate::types::{HookError, ResolvedAddress};

/// A probe registered by the host. Not `Clone`: each registration is
/// unregistered exactly once.
#[derive(Debug)]
pub struct Probe {
    symbol: String,
    address: usize,
    token: usize,
}

impl Probe {
    pub fn new(symbol: impl Into<String>, address: usize) -> Self {
        Self {
            symbol: symbol.into(),
            address,
            token: 0,
        }
    }

    /// Attach a host-specific handle needed at unregistration.
    pub fn with_token(mut self, token: usize) -> Self {
        self.token = token;
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Address the host bound the probe to; 0 when it could not tell.
    pub fn address(&self) -> usize {
        self.address
    }

    pub fn token(&self) -> usize {
        self.token
    }
}

/// Host temporary-probe primitive.
pub trait SymbolProbe {
    fn register_probe(&self, symbol: &str) -> Result<Probe, HookError>;
    fn unregister_probe(&self, probe: Probe);
}

impl<P: SymbolProbe + ?Sized> SymbolProbe for &P {
    fn register_probe(&self, symbol: &str) -> Result<Probe, HookError> {
        (**self).register_probe(symbol)
    }

    fn unregister_probe(&self, probe: Probe) {
        (**self).unregister_probe(probe)
    }
}

/// Unregisters its probe when dropped, whatever path the attempt takes.
struct ProbeGuard<'a, P: SymbolProbe + ?Sized> {
    host: &'a P,
    probe: Option<Probe>,
}

impl<P: SymbolProbe + ?Sized> ProbeGuard<'_, P> {
    fn address(&self) -> usize {
        self.probe.as_ref().map_or(0, Probe::address)
    }
}

impl<P: SymbolProbe + ?Sized> Drop for ProbeGuard<'_, P> {
    fn drop(&mut self) {
        if let Some(probe) = self.probe.take() {
            self.host.unregister_probe(probe);
        }
    }
}

pub struct AddressResolver<'a, P: SymbolProbe + ?Sized> {
    host: &'a P,
}

impl<'a, P: SymbolProbe + ?Sized> AddressResolver<'a, P> {
    pub fn new(host: &'a P) -> Self {
        Self { host }
    }

    /// Resolve the first candidate the host can bind a probe to.
    pub fn resolve<S: AsRef<str>>(&self, candidates: &[S]) -> Result<ResolvedAddress, HookError> {
        for candidate in candidates {
            let symbol = candidate.as_ref();
            match self.probe_once(symbol) {
                Ok(address) => {
                    info!("found {} at {:#x}", symbol, address);
                    return Ok(ResolvedAddress::new(symbol, address));
                }
                Err(e) => warn!("failed to find symbol {}: {}", symbol, e),
            }
        }

        let candidates: Vec<String> = candidates.iter().map(|c| c.as_ref().to_string()).collect();
        error!("cannot locate entry point; tried {:?}", candidates);
        Err(HookError::SymbolNotFound { candidates })
    }

    fn probe_once(&self, symbol: &str) -> Result<NonZeroUsize, HookError> {
        let guard = ProbeGuard {
            host: self.host,
            probe: Some(self.host.register_probe(symbol)?),
        };
        NonZeroUsize::new(guard.address()).ok_or_else(|| HookError::ProbeFailed {
            symbol: symbol.to_string(),
            reason: "probe bound to a null address",
        })
    }
}
