//! Error types for hgraph.

use thiserror::Error;

/// Errors surfaced by public index operations.
#[derive(Debug, Error)]
pub enum HGraphError {
    /// Caller-supplied argument failed validation (dimension mismatch,
    /// non-positive k, zero limit, unknown label, negative radius, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Deserialize was attempted on an index that already holds points.
    #[error("index is not empty")]
    IndexNotEmpty,

    /// A serialized payload was truncated, inconsistent, or its underlying
    /// IO failed.
    #[error("read error: {0}")]
    ReadError(String),

    /// An allocation inside a public operation could not be satisfied.
    #[error("not enough memory: {0}")]
    NoEnoughMemory(String),
}

impl From<std::io::Error> for HGraphError {
    fn from(e: std::io::Error) -> Self {
        HGraphError::ReadError(e.to_string())
    }
}

impl From<std::collections::TryReserveError> for HGraphError {
    fn from(e: std::collections::TryReserveError) -> Self {
        HGraphError::NoEnoughMemory(e.to_string())
    }
}

/// Result type alias for hgraph operations.
pub type Result<T> = std::result::Result<T, HGraphError>;
