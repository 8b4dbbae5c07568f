use core::sync::atomic::{AtomicU64, Ordering};

use hookwatch_protocol::{Counter, StatsReport};

/// Lock-free per-counter tallies, shared by every calling thread.
///
/// Increments are order-insensitive, so relaxed ordering is enough; the final
/// `report` runs after uninstall has quiesced all callers.
pub struct StatsCounter {
    counts: [AtomicU64; Counter::COUNT],
}

impl Default for StatsCounter {
    fn default() -> Self {
        Self {
            counts: core::array::from_fn(|_| AtomicU64::new(0)),
        }
    }
}

impl StatsCounter {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn increment(&self, counter: Counter) {
        self.counts[counter.index()].fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self, counter: Counter) -> u64 {
        self.counts[counter.index()].load(Ordering::Relaxed)
    }

    pub fn report(&self) -> StatsReport {
        StatsReport::from_counts(Counter::ALL.iter().map(|&c| (c, self.get(c))))
    }
}
