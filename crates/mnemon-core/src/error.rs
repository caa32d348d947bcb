//! Crate-level error taxonomy
//!
//! Layer-specific errors (store, embedder, index) fold into `MemoryError`
//! at the operation boundary. Cross-workspace references surface as
//! `NotFound` so existence never leaks across the isolation boundary.

use thiserror::Error;

/// Error taxonomy for all public operations
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Malformed materials, empty purpose, non-positive budget, unknown filter
    /// value. No state change.
    #[error("invalid input: {0}")]
    InputInvalid(String),

    /// Unknown item or artifact (including ids from other workspaces)
    #[error("not found: {0}")]
    NotFound(String),

    /// Dependency momentarily unavailable after exhausting local retries
    #[error("transient dependency failure: {0}")]
    TransientDependency(String),

    /// Link invariant violation (supersedes cycle, duplicate-of on self)
    #[error("conflict between {from_id} and {to_id}: {reason}")]
    Conflict {
        from_id: String,
        to_id: String,
        reason: String,
    },

    /// Deadline exceeded; ingestion returns partial results separately
    #[error("deadline exceeded")]
    Cancelled,

    /// Invariant violation, surfaced with a diagnostic id
    #[error("internal error [{diagnostic_id}]: {message}")]
    Internal {
        diagnostic_id: String,
        message: String,
    },
}

impl MemoryError {
    /// Build an `Internal` error with a fresh diagnostic id
    pub fn internal(message: impl Into<String>) -> Self {
        MemoryError::Internal {
            diagnostic_id: uuid::Uuid::new_v4().to_string(),
            message: message.into(),
        }
    }

    /// Whether retrying the operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, MemoryError::TransientDependency(_))
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, MemoryError>;

// ============================================================================
// TESTS
// ============================================================================
