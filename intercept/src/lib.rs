//! hookwatch-intercept: entry-point resolution and reversible redirection.

pub mod interceptor;
pub mod module;
pub mod resolver;
pub mod table;
pub mod types;

// Re-exports for convenience (flattened imports)
pub use interceptor::invocation;
pub use interceptor::{CallHandler, Drain, HookController, Redirector, DEFAULT_DRAIN_TIMEOUT};
pub use resolver::{AddressResolver, Probe, SymbolProbe};
pub use table::{EntryTable, EntryTableBuilder};
pub use types::{EntryFn, HandlerFn, HookError, PtRegs, Redirect, ResolvedAddress, Trampoline};

#[cfg(unix)]
pub use module::DlsymProbe;
