//! Error types for storage operations.

use crate::types::{CollectionId, LockMode, SequenceNumber};
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A native collection lock could not be acquired in time.
    #[error("timed out acquiring {mode} lock on {collection}")]
    LockTimeout {
        /// The contended collection.
        collection: CollectionId,
        /// The requested mode.
        mode: LockMode,
    },

    /// The write history needed to answer a conflict query was evicted.
    #[error(
        "write history for {collection} after {since} is no longer retained (evicted through {evicted_through})"
    )]
    HistoryUnavailable {
        /// Collection being checked.
        collection: CollectionId,
        /// Sequence the caller asked about.
        since: SequenceNumber,
        /// Highest sequence whose history has been discarded.
        evicted_through: SequenceNumber,
    },

    /// A commit precondition rejected the batch; nothing was applied.
    #[error("commit precondition failed")]
    PreconditionFailed,
}
