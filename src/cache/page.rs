//! Page Cache Module
//!
//! Stores one entry per scanned page: the records discovered there plus a
//! last-refresh timestamp. Rescans merge into the cached set instead of
//! replacing it, and total record count across all pages is bounded by LRU
//! eviction at page granularity.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{CacheStats, PAGES_BUCKET};
use crate::error::Result;
use crate::models::{now_secs, Record};
use crate::store::KeyValueStore;

// == Page Cache Entry ==
/// Cached contents of one page path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageCacheEntry {
    /// When this page was last scanned or touched (epoch seconds)
    pub last_refresh: u64,
    /// Records discovered on this page, no duplicate gids
    pub records: Vec<Record>,
}

// == Save Outcome ==
/// Result of a merge-and-save: the merged entry plus the spawned eviction
/// pass. The caller may await the handle or drop it; either way failures are
/// observable through it rather than lost in a detached task.
pub struct SaveOutcome {
    /// The merged, persisted entry
    pub entry: PageCacheEntry,
    /// Capacity eviction running concurrently with the caller
    pub eviction: JoinHandle<Result<usize>>,
}

// == Scan Cutoff ==
/// Decides when a scan may stop requesting further pages.
///
/// Within the safety window every record is re-scanned regardless of cache
/// state, covering late edits to recent giveaways. Once a record is older
/// than the window AND no newer than the previous refresh point, everything
/// older is assumed cached already.
#[derive(Debug, Clone, Copy)]
pub struct ScanCutoff {
    safety_window_secs: u64,
    last_refresh: u64,
}

impl ScanCutoff {
    /// Builds a cutoff from the configured window and the page's previous
    /// refresh timestamp (0 when the page has never been scanned).
    pub fn new(safety_window_secs: u64, last_refresh: u64) -> Self {
        Self {
            safety_window_secs,
            last_refresh,
        }
    }

    /// True when a record with this timestamp ends the scan.
    pub fn should_stop(&self, record_ts: u64, now: u64) -> bool {
        record_ts < now.saturating_sub(self.safety_window_secs) && record_ts <= self.last_refresh
    }
}

// == Page Cache ==
/// Merge-on-rescan page cache with LRU capacity eviction.
///
/// Cloning is cheap; clones share the same store and counters. Writers to a
/// single page key must not run concurrently (single writer per key); the
/// store's last-write-wins applies if that precondition is violated.
#[derive(Clone)]
pub struct PageCache {
    store: Arc<dyn KeyValueStore>,
    capacity: usize,
    stats: Arc<CacheStats>,
}

impl PageCache {
    // == Constructor ==
    /// Creates a page cache over the given store.
    ///
    /// # Arguments
    /// * `store` - Shared key-value store
    /// * `capacity` - Total record budget across all cached pages
    /// * `stats` - Shared cache counters
    pub fn new(store: Arc<dyn KeyValueStore>, capacity: usize, stats: Arc<CacheStats>) -> Self {
        Self {
            store,
            capacity,
            stats,
        }
    }

    // == Key Normalization ==
    /// Normalizes a raw page path into a cache key: trimmed, leading slash,
    /// no trailing slash.
    pub fn normalize_page_key(raw: &str) -> String {
        let trimmed = raw.trim().trim_end_matches('/');
        if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{}", trimmed)
        }
    }

    async fn read_entry(&self, page_key: &str) -> Result<Option<PageCacheEntry>> {
        match self.store.get(PAGES_BUCKET, page_key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn write_entry(&self, page_key: &str, entry: &PageCacheEntry) -> Result<()> {
        let bytes = serde_json::to_vec(entry)?;
        self.store.put(PAGES_BUCKET, page_key, bytes).await
    }

    // == Load ==
    /// Loads a page entry, refreshing its LRU position.
    ///
    /// On a hit the stored `last_refresh` is bumped to now and the touch is
    /// persisted before returning. The returned entry keeps the pre-touch
    /// timestamp: that value is the reference point for the scan cutoff.
    pub async fn load(&self, page_key: &str) -> Result<Option<PageCacheEntry>> {
        match self.read_entry(page_key).await? {
            Some(entry) => {
                let touched = PageCacheEntry {
                    last_refresh: now_secs(),
                    records: entry.records.clone(),
                };
                self.write_entry(page_key, &touched).await?;
                self.stats.record_hit();
                Ok(Some(entry))
            }
            None => {
                self.stats.record_miss();
                Ok(None)
            }
        }
    }

    // == Merge And Save ==
    /// Merges freshly scanned records into the cached set and persists.
    ///
    /// A record from `new_records` always supersedes a cached record with
    /// the same `gid`; cached records whose gid is absent from the batch are
    /// retained unchanged. Duplicate gids within the batch keep the first
    /// occurrence. No ordering is assumed within the batch.
    ///
    /// Capacity eviction is spawned rather than awaited, so the save
    /// completes without waiting on a whole-bucket pass; the handle is
    /// returned for callers that want the result.
    pub async fn merge_and_save(
        &self,
        page_key: &str,
        new_records: Vec<Record>,
    ) -> Result<SaveOutcome> {
        let cached = self.read_entry(page_key).await?;

        let mut seen: HashSet<String> = HashSet::with_capacity(new_records.len());
        let mut merged: Vec<Record> = Vec::with_capacity(new_records.len());
        for record in new_records {
            if seen.insert(record.gid.clone()) {
                merged.push(record);
            }
        }

        let fresh_count = merged.len();
        if let Some(previous) = cached {
            for record in previous.records {
                if !seen.contains(&record.gid) {
                    merged.push(record);
                }
            }
        }

        let entry = PageCacheEntry {
            last_refresh: now_secs(),
            records: merged,
        };
        self.write_entry(page_key, &entry).await?;

        debug!(
            page_key,
            fresh = fresh_count,
            total = entry.records.len(),
            "Merged scan into page cache"
        );

        let cache = self.clone();
        let eviction = tokio::spawn(async move { cache.evict_if_over_capacity().await });

        Ok(SaveOutcome { entry, eviction })
    }

    // == Eviction ==
    /// Deletes least-recently-refreshed pages until the total record count
    /// fits the capacity budget. Whole entries are removed, never individual
    /// records. Ties in `last_refresh` break by key, so repeated passes over
    /// the same state pick the same victims.
    ///
    /// Returns the number of pages evicted.
    pub async fn evict_if_over_capacity(&self) -> Result<usize> {
        let pairs = self.store.iterate(PAGES_BUCKET).await?;

        let mut pages: Vec<(String, u64, usize)> = Vec::with_capacity(pairs.len());
        let mut total: usize = 0;
        for (key, bytes) in pairs {
            let entry: PageCacheEntry = serde_json::from_slice(&bytes)?;
            total += entry.records.len();
            pages.push((key, entry.last_refresh, entry.records.len()));
        }

        if total <= self.capacity {
            return Ok(0);
        }

        pages.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        let mut evicted = 0;
        for (key, _, count) in pages {
            if total <= self.capacity {
                break;
            }
            self.store.delete(PAGES_BUCKET, &key).await?;
            total -= count;
            evicted += 1;
        }

        if evicted > 0 {
            self.stats.record_evicted_pages(evicted as u64);
            info!(evicted, remaining_records = total, "Evicted page entries over capacity");
        }
        Ok(evicted)
    }

    // == Clear ==
    /// Removes one page entry.
    pub async fn clear_page(&self, page_key: &str) -> Result<()> {
        self.store.delete(PAGES_BUCKET, page_key).await
    }

    /// Removes every page entry.
    pub async fn clear_all(&self) -> Result<()> {
        self.store.clear(PAGES_BUCKET).await
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PrizeRef;
    use crate::store::MemoryStore;

    fn cache_with_capacity(capacity: usize) -> PageCache {
        PageCache::new(
            Arc::new(MemoryStore::new()),
            capacity,
            Arc::new(CacheStats::new()),
        )
    }

    fn record(gid: &str, ts: u64) -> Record {
        Record {
            gid: gid.to_string(),
            name: format!("game {}", gid),
            prize: PrizeRef::App(10),
            ts,
            invite_only: false,
            creator: None,
            winners: vec!["w1".to_string()],
        }
    }

    async fn seed(cache: &PageCache, key: &str, records: Vec<Record>) {
        let outcome = cache.merge_and_save(key, records).await.unwrap();
        outcome.eviction.await.unwrap().unwrap();
    }

    #[test]
    fn test_normalize_page_key() {
        assert_eq!(PageCache::normalize_page_key("/giveaways/won"), "/giveaways/won");
        assert_eq!(PageCache::normalize_page_key("giveaways/won/"), "/giveaways/won");
        assert_eq!(PageCache::normalize_page_key("  /giveaways/won/  "), "/giveaways/won");
    }

    #[tokio::test]
    async fn test_load_miss() {
        let cache = cache_with_capacity(100);
        assert!(cache.load("/won").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_touch_persists_but_returns_previous_refresh() {
        let cache = cache_with_capacity(100);
        seed(&cache, "/won", vec![record("a", 100)]).await;

        // Backdate the stored refresh stamp to observe the touch
        let stale = PageCacheEntry {
            last_refresh: 5,
            records: vec![record("a", 100)],
        };
        cache.write_entry("/won", &stale).await.unwrap();

        let before = now_secs();
        let loaded = cache.load("/won").await.unwrap().unwrap();
        assert_eq!(loaded.last_refresh, 5, "caller sees the pre-touch stamp");

        let stored = cache.read_entry("/won").await.unwrap().unwrap();
        assert!(stored.last_refresh >= before, "touch was persisted");
    }

    #[tokio::test]
    async fn test_merge_new_supersedes_cached() {
        let cache = cache_with_capacity(100);
        seed(&cache, "/won", vec![record("a", 100), record("b", 50)]).await;

        let outcome = cache
            .merge_and_save("/won", vec![record("a", 150), record("c", 140)])
            .await
            .unwrap();

        let gids: Vec<&str> = outcome.entry.records.iter().map(|r| r.gid.as_str()).collect();
        assert_eq!(gids, vec!["a", "c", "b"]);
        let a = &outcome.entry.records[0];
        assert_eq!(a.ts, 150, "batch version wins over cached");
        outcome.eviction.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_merge_idempotent() {
        let cache = cache_with_capacity(100);
        let batch = vec![record("a", 150), record("c", 140)];

        seed(&cache, "/won", vec![record("a", 100), record("b", 50)]).await;
        seed(&cache, "/won", batch.clone()).await;
        let once = cache.read_entry("/won").await.unwrap().unwrap();

        seed(&cache, "/won", batch).await;
        let twice = cache.read_entry("/won").await.unwrap().unwrap();

        assert_eq!(once.records, twice.records);
    }

    #[tokio::test]
    async fn test_merge_dedupes_batch_keeping_first() {
        let cache = cache_with_capacity(100);
        let outcome = cache
            .merge_and_save("/won", vec![record("a", 150), record("a", 90)])
            .await
            .unwrap();

        assert_eq!(outcome.entry.records.len(), 1);
        assert_eq!(outcome.entry.records[0].ts, 150);
        outcome.eviction.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_no_duplicate_gids_after_merge() {
        let cache = cache_with_capacity(100);
        seed(&cache, "/won", vec![record("a", 1), record("b", 2)]).await;
        seed(&cache, "/won", vec![record("b", 3), record("c", 4)]).await;

        let entry = cache.read_entry("/won").await.unwrap().unwrap();
        let mut gids: Vec<&str> = entry.records.iter().map(|r| r.gid.as_str()).collect();
        gids.sort();
        gids.dedup();
        assert_eq!(gids.len(), entry.records.len());
    }

    #[tokio::test]
    async fn test_eviction_removes_least_recently_refreshed_first() {
        let cache = cache_with_capacity(4);

        // Three pages of two records each, with distinct refresh stamps
        for (key, stamp) in [("/p1", 10u64), ("/p2", 20), ("/p3", 30)] {
            let entry = PageCacheEntry {
                last_refresh: stamp,
                records: vec![record(&format!("{}a", key), 1), record(&format!("{}b", key), 2)],
            };
            cache.write_entry(key, &entry).await.unwrap();
        }

        let evicted = cache.evict_if_over_capacity().await.unwrap();
        assert_eq!(evicted, 1, "dropping the oldest page reaches the budget");

        assert!(cache.read_entry("/p1").await.unwrap().is_none());
        assert!(cache.read_entry("/p2").await.unwrap().is_some());
        assert!(cache.read_entry("/p3").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_eviction_tie_breaks_by_key() {
        let cache = cache_with_capacity(2);

        for key in ["/b", "/a", "/c"] {
            let entry = PageCacheEntry {
                last_refresh: 10,
                records: vec![record(&format!("{}1", key), 1), record(&format!("{}2", key), 2)],
            };
            cache.write_entry(key, &entry).await.unwrap();
        }

        let evicted = cache.evict_if_over_capacity().await.unwrap();
        assert_eq!(evicted, 2);

        // Keys sort ascending, so /a and /b go first
        assert!(cache.read_entry("/a").await.unwrap().is_none());
        assert!(cache.read_entry("/b").await.unwrap().is_none());
        assert!(cache.read_entry("/c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_eviction_noop_under_capacity() {
        let cache = cache_with_capacity(100);
        seed(&cache, "/won", vec![record("a", 1)]).await;
        assert_eq!(cache.evict_if_over_capacity().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_save_triggers_eviction_task() {
        let cache = cache_with_capacity(1);
        seed(&cache, "/p1", vec![record("a", 1)]).await;

        // Second page pushes the total over budget; the spawned pass trims it
        let outcome = cache.merge_and_save("/p2", vec![record("b", 2)]).await.unwrap();
        let evicted = outcome.eviction.await.unwrap().unwrap();
        assert_eq!(evicted, 1);
    }

    #[tokio::test]
    async fn test_clear_page() {
        let cache = cache_with_capacity(100);
        seed(&cache, "/won", vec![record("a", 1)]).await;
        cache.clear_page("/won").await.unwrap();
        assert!(cache.read_entry("/won").await.unwrap().is_none());
    }

    #[test]
    fn test_scan_cutoff() {
        let now = 1_000_000;
        let window = 100;
        let cutoff = ScanCutoff::new(window, 500_000);

        // Recent record: keep scanning even though it predates last refresh
        assert!(!cutoff.should_stop(now - 50, now));
        // Old but newer than last refresh: keep scanning
        assert!(!cutoff.should_stop(600_000, now));
        // Old and at the refresh point: stop
        assert!(cutoff.should_stop(500_000, now));
        // Old and before the refresh point: stop
        assert!(cutoff.should_stop(400_000, now));
    }

    #[test]
    fn test_scan_cutoff_never_scanned_page() {
        // last_refresh = 0 means nothing is "already cached", so only the
        // pathological ts = 0 record could stop the scan
        let cutoff = ScanCutoff::new(100, 0);
        assert!(!cutoff.should_stop(1, 1_000_000));
    }
}
