//! Error types for the simulator

use generational_gc::GcError;
use thiserror::Error;

/// Simulator errors
#[derive(Debug, Error)]
pub enum SimError {
    /// Collector error, including allocation failure
    #[error("collector error: {0}")]
    Gc(#[from] GcError),

    /// Config file could not be read
    #[error("file error: {0}")]
    Io(#[from] std::io::Error),

    /// Report serialization failed
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid workload parameter
    #[error("invalid workload: {0}")]
    Workload(String),
}

/// Result type for simulator operations
pub type SimResult<T> = Result<T, SimError>;
