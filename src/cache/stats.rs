//! Cache Statistics Module
//!
//! Tracks cache performance metrics across the page and entity caches.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Cache Stats ==
/// Shared, lock-free counters for cache activity.
///
/// One instance is shared across all caches of a pipeline so a single
/// snapshot describes the whole run.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evicted_pages: AtomicU64,
    swept_entries: AtomicU64,
}

/// Point-in-time copy of the counters, serializable for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals (absent or stale)
    pub misses: u64,
    /// Whole pages removed by LRU eviction
    pub evicted_pages: u64,
    /// Entity entries removed by expiry sweeps
    pub swept_entries: u64,
    /// hits / (hits + misses)
    pub hit_rate: f64,
}

impl CacheStats {
    // == Constructor ==
    /// Creates stats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Record Hit ==
    /// Increments the hit counter.
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    // == Record Miss ==
    /// Increments the miss counter.
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    // == Record Evictions ==
    /// Adds to the evicted-pages counter.
    pub fn record_evicted_pages(&self, count: u64) {
        self.evicted_pages.fetch_add(count, Ordering::Relaxed);
    }

    // == Record Sweep ==
    /// Adds to the swept-entries counter.
    pub fn record_swept_entries(&self, count: u64) {
        self.swept_entries.fetch_add(count, Ordering::Relaxed);
    }

    // == Snapshot ==
    /// Copies the counters into a serializable snapshot.
    pub fn snapshot(&self) -> StatsSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        };
        StatsSnapshot {
            hits,
            misses,
            evicted_pages: self.evicted_pages.load(Ordering::Relaxed),
            swept_entries: self.swept_entries.load(Ordering::Relaxed),
            hit_rate,
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let snapshot = CacheStats::new().snapshot();
        assert_eq!(snapshot.hits, 0);
        assert_eq!(snapshot.misses, 0);
        assert_eq!(snapshot.evicted_pages, 0);
        assert_eq!(snapshot.swept_entries, 0);
    }

    #[test]
    fn test_hit_rate_no_requests() {
        let stats = CacheStats::new();
        assert_eq!(stats.snapshot().hit_rate, 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let stats = CacheStats::new();
        stats.record_hit();
        stats.record_miss();
        assert_eq!(stats.snapshot().hit_rate, 0.5);
    }

    #[test]
    fn test_eviction_and_sweep_counters() {
        let stats = CacheStats::new();
        stats.record_evicted_pages(3);
        stats.record_swept_entries(7);
        stats.record_swept_entries(2);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.evicted_pages, 3);
        assert_eq!(snapshot.swept_entries, 9);
    }

    #[test]
    fn test_snapshot_serializes() {
        let stats = CacheStats::new();
        stats.record_hit();
        let json = serde_json::to_string(&stats.snapshot()).unwrap();
        assert!(json.contains("hit_rate"));
    }
}
