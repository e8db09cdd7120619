//! Error types for mctx core.

use crate::types::CollectionId;
use bytes::Bytes;
use mctx_storage::StorageError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors returned by the transaction engine.
///
/// None of these are retried internally. Errors raised by `commit`, by lock
/// acquisition and by intermediate commits abort the transaction as a side
/// effect; the caller does not need to roll back afterwards.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Optimistic validation found a conflicting committed write.
    ///
    /// Retry the whole transaction from scratch.
    #[error("conflict on key {key:?} in {collection}")]
    Busy {
        /// Collection of the first conflicting key.
        collection: CollectionId,
        /// The first conflicting key found.
        key: Bytes,
    },

    /// Validation could not complete because required history was evicted.
    #[error("try again: {message}")]
    TryAgain {
        /// Why validation could not complete.
        message: String,
    },

    /// A savepoint, key or collection is absent.
    #[error("not found: {message}")]
    NotFound {
        /// What was missing.
        message: String,
    },

    /// The operation is not permitted under the current hints or state.
    #[error("forbidden: {message}")]
    Forbidden {
        /// Why the operation was rejected.
        message: String,
    },

    /// The transaction state machine was misused.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the misuse.
        message: String,
    },

    /// A collection lock was not granted within the configured timeout.
    #[error("timed out waiting for lock on {collection}")]
    LockTimeout {
        /// The contended collection.
        collection: CollectionId,
    },

    /// Any other storage engine failure.
    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl CoreError {
    /// Creates a conflict error.
    pub fn busy(collection: CollectionId, key: impl Into<Bytes>) -> Self {
        Self::Busy {
            collection,
            key: key.into(),
        }
    }

    /// Creates a try-again error.
    pub fn try_again(message: impl Into<String>) -> Self {
        Self::TryAgain {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a forbidden error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if retrying the whole transaction may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Busy { .. } | Self::TryAgain { .. } | Self::LockTimeout { .. }
        )
    }
}

impl From<StorageError> for CoreError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::LockTimeout { collection, .. } => Self::LockTimeout { collection },
            StorageError::HistoryUnavailable { .. } => Self::try_again(error.to_string()),
            other => Self::Storage(other),
        }
    }
}
