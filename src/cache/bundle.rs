//! Bundle Cache Module
//!
//! Maps a bundle id to its member item ids. Membership is treated as
//! immutable once resolved: entries never age out and are only removed by an
//! explicit clear.

use std::sync::Arc;

use tracing::debug;

use crate::cache::{CacheStats, BUNDLES_BUCKET};
use crate::error::Result;
use crate::models::BundleEntry;
use crate::store::KeyValueStore;

// == Bundle Cache ==
/// Permanent bundle → items mapping.
#[derive(Clone)]
pub struct BundleCache {
    store: Arc<dyn KeyValueStore>,
    stats: Arc<CacheStats>,
}

impl BundleCache {
    // == Constructor ==
    /// Creates a bundle cache over the given store.
    pub fn new(store: Arc<dyn KeyValueStore>, stats: Arc<CacheStats>) -> Self {
        Self { store, stats }
    }

    // == Get ==
    /// Returns the resolved membership, regardless of age.
    ///
    /// An entry with an empty item list means "resolved, has none" and is a
    /// hit — only a truly absent key is a miss.
    pub async fn get(&self, bundle_id: u32) -> Result<Option<BundleEntry>> {
        match self.store.get(BUNDLES_BUCKET, &bundle_id.to_string()).await? {
            Some(bytes) => {
                self.stats.record_hit();
                Ok(Some(serde_json::from_slice(&bytes)?))
            }
            None => {
                self.stats.record_miss();
                Ok(None)
            }
        }
    }

    // == Put ==
    /// Stores a freshly resolved membership.
    pub async fn put(&self, bundle_id: u32, items: Vec<u32>) -> Result<()> {
        let entry = BundleEntry::new(items);
        let bytes = serde_json::to_vec(&entry)?;
        debug!(bundle_id, items = entry.items.len(), "Cached bundle membership");
        self.store.put(BUNDLES_BUCKET, &bundle_id.to_string(), bytes).await
    }

    // == Clear ==
    /// Removes every cached membership. The only way entries go away.
    pub async fn clear_all(&self) -> Result<()> {
        self.store.clear(BUNDLES_BUCKET).await
    }
}
