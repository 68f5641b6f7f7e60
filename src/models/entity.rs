//! Cached entity entry model
//!
//! Defines the timestamped value shapes persisted by the entity and bundle
//! caches.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Item id → usage minutes for everything an external identity owns.
pub type OwnedSet = HashMap<u32, u64>;

// == Entity Entry ==
/// A cached per-identity value with its fetch timestamp.
///
/// `restricted = true` with an empty value is the cached permission-denied
/// sentinel: the upstream identity could not be enumerated, and lookups
/// within the TTL short-circuit without a network call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityEntry<V> {
    /// Fetch timestamp (epoch seconds)
    pub ts: u64,
    /// The cached value
    pub value: V,
    /// Permission-denied sentinel flag
    #[serde(default)]
    pub restricted: bool,
}

impl<V: Serialize + DeserializeOwned> EntityEntry<V> {
    /// Creates an entry stamped with the current time.
    pub fn new(value: V, restricted: bool) -> Self {
        Self {
            ts: now_secs(),
            value,
            restricted,
        }
    }

    /// Checks freshness against a TTL window.
    ///
    /// Boundary condition: an entry is stale once the full TTL has elapsed,
    /// so `now - ts >= ttl` means stale and `now - ts < ttl` means fresh.
    pub fn is_fresh(&self, now: u64, ttl_secs: u64) -> bool {
        now.saturating_sub(self.ts) < ttl_secs
    }
}

// == Bundle Entry ==
/// A resolved bundle: its member item ids.
///
/// An empty list means "resolved, has none". Bundle membership is treated as
/// immutable once resolved; entries carry a timestamp for inspection but are
/// never aged out, only cleared explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleEntry {
    /// Resolution timestamp (epoch seconds)
    pub ts: u64,
    /// Member item ids
    pub items: Vec<u32>,
}

impl BundleEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(items: Vec<u32>) -> Self {
        Self {
            ts: now_secs(),
            items,
        }
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in seconds.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_secs()
}
