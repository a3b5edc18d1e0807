//! Error types for vicinity-lsh.

use thiserror::Error;

use crate::VectorId;

/// Errors that can occur during indexing, querying, or store access.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LshError {
    /// Malformed call or configuration. Raised before any store write.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Embedding length differs from the configured dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The store could not be reached or did not answer in time.
    ///
    /// Retryable. A timeout is never reported as an empty result.
    #[error("storage unavailable: {reason}")]
    StorageUnavailable { reason: String },

    /// Persisted state disagrees with the configuration, or a stored blob is
    /// corrupt. Proceeding would silently break recall, so this is fatal.
    #[error("storage inconsistent: {0}")]
    StorageInconsistent(String),

    /// Direct lookup of an id that is not indexed.
    #[error("vector {0} not found")]
    NotFound(VectorId),
}

impl LshError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    #[cfg_attr(not(feature = "redis"), allow(dead_code))]
    pub(crate) fn unavailable(reason: impl Into<String>) -> Self {
        Self::StorageUnavailable {
            reason: reason.into(),
        }
    }

    pub(crate) fn inconsistent(msg: impl Into<String>) -> Self {
        Self::StorageInconsistent(msg.into())
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable { .. })
    }
}

impl From<serde_json::Error> for LshError {
    fn from(e: serde_json::Error) -> Self {
        Self::StorageInconsistent(format!("meta blob: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, LshError>;
