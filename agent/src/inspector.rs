//! Per-call record assembly.

use std::sync::Arc;

use hookwatch_intercept::{invocation, PtRegs};
use hookwatch_protocol::{Counter, FieldSet, InvocationRecord, WatchConfig};

use crate::stats::StatsCounter;
use crate::task::CurrentTask;

/// Builds an [`InvocationRecord`] for the task making an intercepted call.
///
/// Never blocks and never allocates. Disabled fields are not read at all and
/// stay 0. A field the task cannot report falls back to its default instead
/// of failing the call, and the record counts once as degraded.
pub struct InvocationInspector {
    task: Arc<dyn CurrentTask>,
    fields: FieldSet,
    argument: u8,
    stats: Arc<StatsCounter>,
}

impl InvocationInspector {
    pub fn new(task: Arc<dyn CurrentTask>, fields: FieldSet, argument: u8, stats: Arc<StatsCounter>) -> Self {
        Self {
            task,
            fields,
            argument,
            stats,
        }
    }

    pub fn from_config(config: &WatchConfig, task: Arc<dyn CurrentTask>, stats: Arc<StatsCounter>) -> Self {
        Self::new(task, config.fields, config.argument.index, stats)
    }

    pub fn inspect(&self, regs: &PtRegs) -> InvocationRecord {
        let mut degraded = false;
        let mut record = InvocationRecord {
            pid: self.task.pid(),
            comm: or_default(self.task.comm(), &mut degraded),
            ..InvocationRecord::default()
        };
        if self.fields.namespace {
            record.ns = or_default(self.task.pid_namespace(), &mut degraded);
        }
        if self.fields.argument {
            record.arg = invocation::syscall_argument(regs, self.argument).unwrap_or(0);
        }
        if self.fields.cpu {
            record.cpu = or_default(self.task.cpu(), &mut degraded);
        }

        if degraded {
            self.stats.increment(Counter::Degraded);
        }
        if record.in_container() {
            self.stats.increment(Counter::Containerized);
        }
        record
    }
}

#[inline]
fn or_default<T: Default>(value: Option<T>, degraded: &mut bool) -> T {
    *degraded |= value.is_none();
    value.unwrap_or_default()
}
