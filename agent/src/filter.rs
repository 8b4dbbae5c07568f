//! Optional per-call verdicts.
//!
//! A watcher without a filter is a pure observer: every intercepted call runs
//! the original. With a filter installed, a `Deny` verdict short-circuits the
//! call and returns the negated errno to the caller instead.

use hookwatch_protocol::InvocationRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    /// Fail the call with `-errno` without running the original.
    Deny(i32),
}

/// Decides the fate of an intercepted call from its record.
///
/// Runs on the calling thread under the same constraints as the inspector:
/// no blocking, no sleeping.
pub trait CallFilter: Send + Sync {
    fn check(&self, record: &InvocationRecord) -> Verdict;
}

impl<F> CallFilter for F
where
    F: Fn(&InvocationRecord) -> Verdict + Send + Sync,
{
    fn check(&self, record: &InvocationRecord) -> Verdict {
        self(record)
    }
}

/// Denies calls from containerized callers whose argument is in `arguments`.
#[derive(Debug, Clone)]
pub struct ContainerArgumentFilter {
    arguments: Vec<u64>,
    errno: i32,
}

impl ContainerArgumentFilter {
    pub fn new(arguments: impl IntoIterator<Item = u64>, errno: i32) -> Self {
        Self {
            arguments: arguments.into_iter().collect(),
            errno,
        }
    }
}

impl CallFilter for ContainerArgumentFilter {
    fn check(&self, record: &InvocationRecord) -> Verdict {
        if record.in_container() && self.arguments.contains(&record.arg) {
            Verdict::Deny(self.errno)
        } else {
            Verdict::Allow
        }
    }
}
