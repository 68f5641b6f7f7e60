//! Error types for the scan/enrichment pipeline
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Core Error Enum ==
/// Unified error type for the pipeline and its caches.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Key-value store operation failed; propagated to the caller, never
    /// silently retried.
    #[error("Storage failure: {0}")]
    Storage(String),

    /// Identity or profile could not be resolved to an external handle.
    #[error("Identity not found: {0}")]
    NotFound(String),

    /// Transient network failure while talking to a remote collaborator.
    #[error("Network failure: {0}")]
    Network(String),

    /// The scan phase itself failed; fatal to the whole run.
    #[error("Scan failed: {0}")]
    ScanFailed(String),
}

// == Conversions ==
impl From<sled::Error> for CoreError {
    fn from(err: sled::Error) -> Self {
        CoreError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Storage(format!("serialization: {}", err))
    }
}

// == Result Type Alias ==
/// Convenience Result type for the crate.
pub type Result<T> = std::result::Result<T, CoreError>;
