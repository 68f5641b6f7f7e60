//! Key-Value Store Module
//!
//! Durable, keyed, asynchronous storage abstraction (bucket → key → value)
//! used by every cache. Failures are surfaced as storage errors and never
//! retried here; callers decide.

mod kvs;
mod memory;

pub use kvs::{KeyValueStore, SledStore};
pub use memory::MemoryStore;
