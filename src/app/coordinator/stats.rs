//! Coordinator statistics

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Point-in-time coordinator statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorStats {
    /// Calls to `request`
    pub requests: u64,
    /// Requests answered from the content store, plus fetch entries the
    /// store recheck answered without a transport call
    pub cache_hits: u64,
    /// Store lookups that failed and were treated as misses
    pub cache_read_errors: u64,
    /// Transport fetches started
    pub fetches_started: u64,
    /// Requests that attached to an existing fetch instead of starting one
    pub joined_waiters: u64,
    /// Fetches that completed successfully
    pub fetches_succeeded: u64,
    /// Fetches that failed
    pub fetches_failed: u64,
    /// Successful payloads that could not be written to the store
    pub persist_failures: u64,
    /// Completion callbacks that panicked
    pub waiter_panics: u64,
    /// Observer errors and panics
    pub observer_failures: u64,
    /// Fetches currently outstanding
    pub in_flight: usize,
}

impl CoordinatorStats {
    /// Share of requests answered from the store, in percent
    pub fn hit_rate(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        (self.cache_hits as f64 / self.requests as f64) * 100.0
    }

    /// Fetches that have reached a terminal state
    pub fn fetches_finished(&self) -> u64 {
        self.fetches_succeeded + self.fetches_failed
    }
}

/// Live counters updated by the coordinator
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub requests: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_read_errors: AtomicU64,
    pub fetches_started: AtomicU64,
    pub joined_waiters: AtomicU64,
    pub fetches_succeeded: AtomicU64,
    pub fetches_failed: AtomicU64,
    pub persist_failures: AtomicU64,
    pub waiter_panics: AtomicU64,
}

impl StatsCounters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, observer_failures: u64, in_flight: usize) -> CoordinatorStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        CoordinatorStats {
            requests: load(&self.requests),
            cache_hits: load(&self.cache_hits),
            cache_read_errors: load(&self.cache_read_errors),
            fetches_started: load(&self.fetches_started),
            joined_waiters: load(&self.joined_waiters),
            fetches_succeeded: load(&self.fetches_succeeded),
            fetches_failed: load(&self.fetches_failed),
            persist_failures: load(&self.persist_failures),
            waiter_panics: load(&self.waiter_panics),
            observer_failures,
            in_flight,
        }
    }
}
