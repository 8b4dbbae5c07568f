//! The replacement handler run for every intercepted call.

use std::cell::Cell;
use std::sync::Arc;

use hookwatch_intercept::{invocation, CallHandler, PtRegs, Trampoline};
use hookwatch_protocol::Counter;
use log::trace;

use crate::filter::{CallFilter, Verdict};
use crate::inspector::InvocationInspector;
use crate::sink::RecordSink;
use crate::stats::StatsCounter;

// Thread-local re-entrancy guard. A call into the hooked entry point made
// from inside the inspector or the sink goes straight to the original.
thread_local! {
    static IN_HOOK: Cell<bool> = const { Cell::new(false) };
}

/// Check if we are currently inside the handler on this thread.
pub fn is_in_hook() -> bool {
    IN_HOOK.with(|h| h.get())
}

/// Marks the current thread as inside the handler until dropped.
pub struct ReentryGuard(());

impl ReentryGuard {
    /// `None` if this thread is already inside the handler.
    pub fn enter() -> Option<Self> {
        if IN_HOOK.with(|h| h.replace(true)) {
            return None;
        }
        Some(Self(()))
    }
}

impl Drop for ReentryGuard {
    fn drop(&mut self) {
        IN_HOOK.with(|h| h.set(false));
    }
}

pub(crate) struct WatchHandler {
    pub(crate) inspector: InvocationInspector,
    pub(crate) sink: Arc<dyn RecordSink>,
    pub(crate) filter: Option<Arc<dyn CallFilter>>,
    pub(crate) stats: Arc<StatsCounter>,
}

impl CallHandler for WatchHandler {
    fn on_call(&self, regs: &PtRegs, original: Trampoline) -> i64 {
        self.stats.increment(Counter::Total);

        let verdict = {
            let Some(_guard) = ReentryGuard::enter() else {
                self.stats.increment(Counter::Reentrant);
                return original.call(regs);
            };

            let record = self.inspector.inspect(regs);
            self.sink.emit(&record);
            self.stats.increment(Counter::Recorded);
            match &self.filter {
                Some(filter) => filter.check(&record),
                None => Verdict::Allow,
            }
        };

        match verdict {
            Verdict::Allow => original.call(regs),
            Verdict::Deny(errno) => {
                self.stats.increment(Counter::Filtered);
                trace!(
                    "denied syscall {} with errno {}",
                    invocation::syscall_nr(regs),
                    errno
                );
                -i64::from(errno)
            }
        }
    }
}
