//! Entity Expiry Sweep Task
//!
//! Background task that periodically offers the entity cache a sweep pass.
//! The cache's own cooldown decides whether a pass actually runs, so the
//! interval here only controls how often the offer is made.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::EntityCache;

/// Spawns a background task that periodically sweeps expired entity entries.
///
/// The task loops forever, sleeping for the given interval between offers
/// and sweeping each listed bucket with the same TTL. Sweep failures are
/// logged and do not end the task.
///
/// # Arguments
/// * `cache` - Entity cache to sweep (clones share cooldown state)
/// * `buckets` - Bucket names to sweep each round
/// * `ttl_secs` - Freshness window applied to every bucket
/// * `interval` - Sleep between sweep offers
///
/// # Returns
/// A JoinHandle used to abort the task during shutdown.
pub fn spawn_sweep_task(
    cache: EntityCache,
    buckets: Vec<String>,
    ttl_secs: u64,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            ?interval,
            ttl_secs,
            buckets = buckets.len(),
            "Starting entity expiry sweep task"
        );

        loop {
            tokio::time::sleep(interval).await;

            for bucket in &buckets {
                match cache.sweep_expired(bucket, ttl_secs).await {
                    Ok(Some(removed)) if removed > 0 => {
                        info!(bucket = bucket.as_str(), removed, "Sweep removed expired entries");
                    }
                    Ok(Some(_)) => {
                        debug!(bucket = bucket.as_str(), "Sweep found nothing expired");
                    }
                    Ok(None) => {
                        debug!(bucket = bucket.as_str(), "Sweep on cooldown");
                    }
                    Err(err) => {
                        warn!(bucket = bucket.as_str(), "Sweep failed: {}", err);
                    }
                }
            }
        }
    })
}
