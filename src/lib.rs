//! Wintrack - incremental giveaway-scan cache and enrichment pipeline
//!
//! Scans a paginated giveaway source into a durable merge-on-rescan page
//! cache with LRU eviction, then enriches each winner's records through a
//! TTL entity cache and a bounded-concurrency worker pool.

pub mod cache;
pub mod config;
pub mod enrich;
pub mod error;
pub mod models;
pub mod store;
pub mod tasks;

pub use config::Config;
pub use enrich::{Orchestrator, RunReport, RunState, ScanMode, Sources};
pub use error::{CoreError, Result};
pub use store::{KeyValueStore, MemoryStore, SledStore};
pub use tasks::spawn_sweep_task;
