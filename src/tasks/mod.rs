//! Task Execution Module
//!
//! Contains the bounded-concurrency worker pool that drives enrichment
//! fetches and the background task that periodically offers the entity
//! cache an expiry sweep.

mod pool;
mod sweep;

pub use pool::run_pool;
pub use sweep::spawn_sweep_task;
