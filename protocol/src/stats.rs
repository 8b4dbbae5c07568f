//! Counter names and the teardown statistics report.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Process-wide counters bumped on the intercept path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Counter {
    /// Every call that reached the replacement handler.
    Total,
    /// Calls for which a record was emitted.
    Recorded,
    /// Recorded calls made from inside a child pid namespace.
    Containerized,
    /// Recorded calls where a field fell back to its default.
    Degraded,
    /// Calls made from inside the handler itself, passed straight through.
    Reentrant,
    /// Calls denied by a filter.
    Filtered,
}

impl Counter {
    pub const COUNT: usize = 6;

    pub const ALL: [Counter; Counter::COUNT] = [
        Counter::Total,
        Counter::Recorded,
        Counter::Containerized,
        Counter::Degraded,
        Counter::Reentrant,
        Counter::Filtered,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            Counter::Total => "total",
            Counter::Recorded => "recorded",
            Counter::Containerized => "containerized",
            Counter::Degraded => "degraded",
            Counter::Reentrant => "reentrant",
            Counter::Filtered => "filtered",
        }
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Snapshot of every counter, keyed by counter name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsReport {
    counters: BTreeMap<String, u64>,
}

impl StatsReport {
    pub fn from_counts(counts: impl IntoIterator<Item = (Counter, u64)>) -> Self {
        Self {
            counters: counts
                .into_iter()
                .map(|(c, n)| (c.name().to_string(), n))
                .collect(),
        }
    }

    /// Value of `counter`, 0 when it was never reported.
    pub fn get(&self, counter: Counter) -> u64 {
        self.counters.get(counter.name()).copied().unwrap_or(0)
    }

    pub fn as_map(&self) -> &BTreeMap<String, u64> {
        &self.counters
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counters.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, counter) in Counter::ALL.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}={}", counter, self.get(*counter))?;
        }
        Ok(())
    }
}
