//! Identity Cache Module
//!
//! Maps a normalized winner name to its external identity handle, populated
//! by a one-time profile lookup. Entries never expire and are invalidated
//! only explicitly.

use std::sync::Arc;

use tracing::debug;

use crate::cache::{CacheStats, IDENTITIES_BUCKET};
use crate::error::Result;
use crate::store::KeyValueStore;

// == Identity Cache ==
/// Permanent name → external-id mapping.
#[derive(Clone)]
pub struct IdentityCache {
    store: Arc<dyn KeyValueStore>,
    stats: Arc<CacheStats>,
}

impl IdentityCache {
    // == Constructor ==
    /// Creates an identity cache over the given store.
    pub fn new(store: Arc<dyn KeyValueStore>, stats: Arc<CacheStats>) -> Self {
        Self { store, stats }
    }

    // == Key Normalization ==
    /// Normalizes a winner name into a cache key: trimmed, lowercased.
    /// The upstream site treats names case-insensitively.
    pub fn normalize_name(name: &str) -> String {
        name.trim().to_lowercase()
    }

    // == Get ==
    /// Returns the cached external id for a name, regardless of age.
    pub async fn get(&self, name: &str) -> Result<Option<String>> {
        let key = Self::normalize_name(name);
        match self.store.get(IDENTITIES_BUCKET, &key).await? {
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
    /// Stores a resolved external id.
    pub async fn put(&self, name: &str, external_id: &str) -> Result<()> {
        let key = Self::normalize_name(name);
        let bytes = serde_json::to_vec(external_id)?;
        debug!(name = key.as_str(), external_id, "Cached identity handle");
        self.store.put(IDENTITIES_BUCKET, &key, bytes).await
    }

    // == Invalidate ==
    /// Drops one cached mapping.
    pub async fn invalidate(&self, name: &str) -> Result<()> {
        let key = Self::normalize_name(name);
        self.store.delete(IDENTITIES_BUCKET, &key).await
    }

    /// Drops every cached mapping.
    pub async fn clear_all(&self) -> Result<()> {
        self.store.clear(IDENTITIES_BUCKET).await
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn cache() -> IdentityCache {
        IdentityCache::new(Arc::new(MemoryStore::new()), Arc::new(CacheStats::new()))
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(IdentityCache::normalize_name("  WinnerOne "), "winnerone");
    }

    #[tokio::test]
    async fn test_lookup_is_case_insensitive() {
        let cache = cache();
        cache.put("WinnerOne", "76561198000001").await.unwrap();

        assert_eq!(
            cache.get("winnerone").await.unwrap().as_deref(),
            Some("76561198000001")
        );
        assert_eq!(
            cache.get("WINNERONE").await.unwrap().as_deref(),
            Some("76561198000001")
        );
    }

    #[tokio::test]
    async fn test_invalidate() {
        let cache = cache();
        cache.put("winnerone", "76561198000001").await.unwrap();
        cache.invalidate("winnerone").await.unwrap();
        assert!(cache.get("winnerone").await.unwrap().is_none());
    }
}
