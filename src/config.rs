//! Configuration Module
//!
//! Handles loading and managing pipeline configuration from environment variables.

use std::env;
use std::path::PathBuf;

/// Lower bound for the enrichment worker pool width.
pub const MIN_CONCURRENCY: usize = 2;
/// Upper bound for the enrichment worker pool width.
pub const MAX_CONCURRENCY: usize = 10;

/// Pipeline configuration parameters.
///
/// All values can be configured via environment variables with sensible
/// defaults. The struct is immutable once built; each component receives its
/// own copy at construction instead of reading shared global state.
#[derive(Debug, Clone)]
pub struct Config {
    /// Re-scan safety window in days; records older than this AND older than
    /// the page's last refresh stop the scan
    pub safety_window_days: u64,
    /// Maximum total records across all cached pages before LRU eviction
    pub page_cache_capacity: usize,
    /// Freshness window in days for per-entity metadata
    pub entity_ttl_days: u64,
    /// Minimum hours between passive expiry sweeps
    pub sweep_cooldown_hours: u64,
    /// Worker pool width for enrichment fetches
    pub enrichment_concurrency: usize,
    /// Directory for the persistent key-value store
    pub data_dir: PathBuf,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SAFETY_WINDOW_DAYS` - Re-scan safety window in days (default: 14)
    /// - `PAGE_CACHE_CAPACITY` - Total record budget across pages (default: 50000)
    /// - `ENTITY_TTL_DAYS` - Entity metadata freshness in days (default: 5)
    /// - `SWEEP_COOLDOWN_HOURS` - Hours between expiry sweeps (default: 1)
    /// - `ENRICHMENT_CONCURRENCY` - Worker pool width, clamped to 2..=10 (default: 6)
    /// - `DATA_DIR` - Persistent store location (default: ./wintrack-data)
    pub fn from_env() -> Self {
        let concurrency = env::var("ENRICHMENT_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(6);

        Self {
            safety_window_days: env::var("SAFETY_WINDOW_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(14),
            page_cache_capacity: env::var("PAGE_CACHE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50_000),
            entity_ttl_days: env::var("ENTITY_TTL_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            sweep_cooldown_hours: env::var("SWEEP_COOLDOWN_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1),
            enrichment_concurrency: concurrency.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY),
            data_dir: env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./wintrack-data")),
        }
    }

    /// Safety window expressed in seconds.
    pub fn safety_window_secs(&self) -> u64 {
        self.safety_window_days * 24 * 3600
    }

    /// Entity TTL expressed in seconds.
    pub fn entity_ttl_secs(&self) -> u64 {
        self.entity_ttl_days * 24 * 3600
    }

    /// Sweep cooldown expressed in seconds.
    pub fn sweep_cooldown_secs(&self) -> u64 {
        self.sweep_cooldown_hours * 3600
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            safety_window_days: 14,
            page_cache_capacity: 50_000,
            entity_ttl_days: 5,
            sweep_cooldown_hours: 1,
            enrichment_concurrency: 6,
            data_dir: PathBuf::from("./wintrack-data"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.safety_window_days, 14);
        assert_eq!(config.page_cache_capacity, 50_000);
        assert_eq!(config.entity_ttl_days, 5);
        assert_eq!(config.sweep_cooldown_hours, 1);
        assert_eq!(config.enrichment_concurrency, 6);
    }

    // Env-var cases live in one test: the process environment is shared
    // across parallel test threads
    #[test]
    fn test_config_from_env() {
        env::remove_var("SAFETY_WINDOW_DAYS");
        env::remove_var("PAGE_CACHE_CAPACITY");
        env::remove_var("ENTITY_TTL_DAYS");
        env::remove_var("SWEEP_COOLDOWN_HOURS");
        env::remove_var("ENRICHMENT_CONCURRENCY");
        env::remove_var("DATA_DIR");

        let config = Config::from_env();
        assert_eq!(config.safety_window_days, 14);
        assert_eq!(config.page_cache_capacity, 50_000);
        assert_eq!(config.entity_ttl_days, 5);
        assert_eq!(config.sweep_cooldown_hours, 1);
        assert_eq!(config.enrichment_concurrency, 6);
        assert_eq!(config.data_dir, PathBuf::from("./wintrack-data"));

        env::set_var("ENRICHMENT_CONCURRENCY", "1");
        assert_eq!(Config::from_env().enrichment_concurrency, MIN_CONCURRENCY);

        env::set_var("ENRICHMENT_CONCURRENCY", "64");
        assert_eq!(Config::from_env().enrichment_concurrency, MAX_CONCURRENCY);

        env::remove_var("ENRICHMENT_CONCURRENCY");
    }

    #[test]
    fn test_unit_conversions() {
        let config = Config::default();
        assert_eq!(config.safety_window_secs(), 14 * 86_400);
        assert_eq!(config.entity_ttl_secs(), 5 * 86_400);
        assert_eq!(config.sweep_cooldown_secs(), 3600);
    }
}
