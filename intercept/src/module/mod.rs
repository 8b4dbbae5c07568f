//! Probe hosts backed by the running process.

#[cfg(unix)]
mod dlsym;

#[cfg(unix)]
pub use dlsym::DlsymProbe;
