//! Entity Cache Module
//!
//! Per-identity metadata cache with TTL freshness and passive expiry sweeps.
//! Stale entries are reported as misses but left in place; a sweep pass,
//! gated by a process-lifetime cooldown, is what actually deletes them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::cache::CacheStats;
use crate::error::Result;
use crate::models::{now_secs, EntityEntry};
use crate::store::KeyValueStore;

// == Entity Cache ==
/// TTL cache over one or more KVS buckets.
///
/// Clones share the same store, counters, and sweep cooldown state. The
/// cooldown stamp lives in process memory only, so a restart allows an
/// immediate sweep.
#[derive(Clone)]
pub struct EntityCache {
    store: Arc<dyn KeyValueStore>,
    sweep_cooldown: Duration,
    last_sweep: Arc<Mutex<Option<Instant>>>,
    stats: Arc<CacheStats>,
}

impl EntityCache {
    // == Constructor ==
    /// Creates an entity cache over the given store.
    ///
    /// # Arguments
    /// * `store` - Shared key-value store
    /// * `sweep_cooldown` - Minimum gap between expiry sweep passes
    /// * `stats` - Shared cache counters
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        sweep_cooldown: Duration,
        stats: Arc<CacheStats>,
    ) -> Self {
        Self {
            store,
            sweep_cooldown,
            last_sweep: Arc::new(Mutex::new(None)),
            stats,
        }
    }

    // == Get Fresh ==
    /// Returns the entry only while it is inside the TTL window.
    ///
    /// A stale entry counts as a miss and is NOT deleted here — the caller
    /// re-fetches and overwrites, or a sweep removes it later. The full
    /// entry is returned so callers can observe the restricted sentinel.
    pub async fn get_fresh<V>(
        &self,
        bucket: &str,
        key: &str,
        ttl_secs: u64,
    ) -> Result<Option<EntityEntry<V>>>
    where
        V: Serialize + DeserializeOwned,
    {
        match self.store.get(bucket, key).await? {
            Some(bytes) => {
                let entry: EntityEntry<V> = serde_json::from_slice(&bytes)?;
                if entry.is_fresh(now_secs(), ttl_secs) {
                    self.stats.record_hit();
                    Ok(Some(entry))
                } else {
                    self.stats.record_miss();
                    Ok(None)
                }
            }
            None => {
                self.stats.record_miss();
                Ok(None)
            }
        }
    }

    // == Put ==
    /// Stores a freshly fetched value, stamped with the current time.
    pub async fn put<V>(&self, bucket: &str, key: &str, value: V) -> Result<()>
    where
        V: Serialize + DeserializeOwned,
    {
        self.write(bucket, key, EntityEntry::new(value, false)).await
    }

    // == Put Restricted ==
    /// Stores the permission-denied sentinel so lookups inside the TTL
    /// short-circuit without a network call.
    ///
    /// An empty fetch result is indistinguishable from a genuinely-empty
    /// accessible profile; both cache as restricted until the TTL expires.
    /// That is preserved source behavior, not something to fix here.
    pub async fn put_restricted<V>(&self, bucket: &str, key: &str, empty: V) -> Result<()>
    where
        V: Serialize + DeserializeOwned,
    {
        self.write(bucket, key, EntityEntry::new(empty, true)).await
    }

    async fn write<V>(&self, bucket: &str, key: &str, entry: EntityEntry<V>) -> Result<()>
    where
        V: Serialize + DeserializeOwned,
    {
        let bytes = serde_json::to_vec(&entry)?;
        self.store.put(bucket, key, bytes).await
    }

    // == Sweep Expired ==
    /// Deletes every entry whose TTL has fully elapsed.
    ///
    /// Gated by the process-lifetime cooldown: at most one pass per cooldown
    /// window no matter how often this is called. Returns `Some(removed)`
    /// when a pass ran, `None` when skipped on cooldown.
    pub async fn sweep_expired(&self, bucket: &str, ttl_secs: u64) -> Result<Option<usize>> {
        {
            let mut last = self.last_sweep.lock().await;
            if let Some(stamp) = *last {
                if stamp.elapsed() < self.sweep_cooldown {
                    debug!(bucket, "Expiry sweep skipped, still on cooldown");
                    return Ok(None);
                }
            }
            // Stamp before the pass so overlapping callers skip
            *last = Some(Instant::now());
        }

        let now = now_secs();
        let mut removed = 0;
        for (key, bytes) in self.store.iterate(bucket).await? {
            let entry: EntityEntry<serde_json::Value> = serde_json::from_slice(&bytes)?;
            if !entry.is_fresh(now, ttl_secs) {
                self.store.delete(bucket, &key).await?;
                removed += 1;
            }
        }

        if removed > 0 {
            self.stats.record_swept_entries(removed as u64);
            info!(bucket, removed, "Expiry sweep removed stale entries");
        } else {
            debug!(bucket, "Expiry sweep found nothing stale");
        }
        Ok(Some(removed))
    }

    // == Clear ==
    /// Removes every entry in a bucket.
    pub async fn clear(&self, bucket: &str) -> Result<()> {
        self.store.clear(bucket).await
    }
}
