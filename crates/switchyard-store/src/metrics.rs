//! Counters for the in-process store and event log.

use std::sync::atomic::{AtomicU64, Ordering};

/// Operation counters for [`crate::MemoryStore`].
#[derive(Debug, Default)]
pub struct StoreMetrics {
    pub reads: AtomicU64,
    pub writes: AtomicU64,
    /// Calls rejected while the store was marked unavailable.
    pub failures: AtomicU64,
}

impl StoreMetrics {
    pub fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StoreMetricsSnapshot {
        StoreMetricsSnapshot {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreMetricsSnapshot {
    pub reads: u64,
    pub writes: u64,
    pub failures: u64,
}

/// Counters for [`crate::MemoryEventBus`].
#[derive(Debug, Default)]
pub struct BusMetrics {
    /// Events appended to the log.
    pub published: AtomicU64,
    /// Events handed to live subscribers.
    pub delivered: AtomicU64,
    /// Events a lagging subscriber never saw.
    pub lagged: AtomicU64,
    /// Events evicted from the capped log.
    pub evicted: AtomicU64,
}

impl BusMetrics {
    pub fn record_publish(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lag(&self, missed: u64) {
        self.lagged.fetch_add(missed, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BusMetricsSnapshot {
        BusMetricsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            lagged: self.lagged.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusMetricsSnapshot {
    pub published: u64,
    pub delivered: u64,
    pub lagged: u64,
    pub evicted: u64,
}
