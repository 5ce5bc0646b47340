//! Shared health state for the /health endpoint.
//! Updated by the event aggregator, read by the API.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct HealthState {
    /// Aggregations that ran the source adapters (cache misses).
    pub aggregations: AtomicU64,
    /// Aggregations answered from the cache.
    pub cache_hits: AtomicU64,
    /// Adapter calls that failed or timed out.
    pub source_failures: AtomicU64,
    /// Millisecond timestamp of the last completed aggregation (0 = none).
    pub last_aggregation_at_ms: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_aggregation(&self, at_ms: u64) {
        self.aggregations.fetch_add(1, Ordering::Relaxed);
        self.last_aggregation_at_ms.store(at_ms, Ordering::Relaxed);
    }

    pub fn inc_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_source_failures(&self) {
        self.source_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn aggregations(&self) -> u64 {
        self.aggregations.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn source_failures(&self) -> u64 {
        self.source_failures.load(Ordering::Relaxed)
    }

    pub fn last_aggregation_at_ms(&self) -> u64 {
        self.last_aggregation_at_ms.load(Ordering::Relaxed)
    }
}
