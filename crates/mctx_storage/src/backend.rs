//! Storage engine and lock backend trait definitions.

use crate::batch::WriteBatch;
use crate::error::StorageResult;
use crate::types::{CollectionId, LockHandle, LockMode, SequenceNumber, Snapshot, TransactionId};
use bytes::Bytes;
use std::time::Duration;

/// Native per-collection locking provided by a storage engine.
///
/// # Invariants
///
/// - Locks are owner-aware: a request never conflicts with locks held by
///   the same `owner`, so re-entry and upgrades cannot self-deadlock
/// - An owner holds at most one mode per collection; acquiring a stronger
///   mode upgrades the existing holding in place
/// - `release_lock` drops the owner's holding entirely
pub trait LockBackend: Send + Sync {
    /// Acquires (or upgrades to) `mode` on `collection` for `owner`.
    ///
    /// `timeout` of `None` waits indefinitely; `Some(Duration::ZERO)` fails
    /// immediately when the lock is contended.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::LockTimeout` if the lock is not granted in time.
    fn acquire_lock(
        &self,
        collection: CollectionId,
        owner: TransactionId,
        mode: LockMode,
        timeout: Option<Duration>,
    ) -> StorageResult<LockHandle>;

    /// Releases a holding previously returned by `acquire_lock`.
    fn release_lock(&self, handle: LockHandle);
}

/// Callback evaluated by `StorageEngine::apply_log` while commits are
/// serialized, before anything is published.
pub type Precondition<'a> = dyn FnMut() -> StorageResult<()> + 'a;

/// The narrow storage interface consumed by the transaction engine.
///
/// Implementations own committed data, the commit history used for
/// optimistic conflict checks and the native lock table. They must be
/// `Send + Sync`; every method takes `&self`.
pub trait StorageEngine: Send + Sync {
    /// Returns the engine's native lock capability.
    fn locks(&self) -> &dyn LockBackend;

    /// Returns the sequence number of the most recent committed batch.
    fn latest_sequence(&self) -> SequenceNumber;

    /// Captures the current committed state.
    fn take_snapshot(&self) -> Snapshot {
        Snapshot::at(self.latest_sequence())
    }

    /// Reads a key as of `snapshot`, or the latest committed value.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot serve the read.
    fn get(
        &self,
        collection: CollectionId,
        key: &[u8],
        snapshot: Option<&Snapshot>,
    ) -> StorageResult<Option<Bytes>>;

    /// Answers whether `key` was committed with a sequence above `since`.
    ///
    /// Both the mutable write history and still-retained immutable history
    /// must be consulted.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::HistoryUnavailable` if the answer depends on
    /// history that has already been evicted.
    fn has_committed_since(
        &self,
        collection: CollectionId,
        key: &[u8],
        since: SequenceNumber,
    ) -> StorageResult<bool>;

    /// Atomically applies `batch` after `precondition` accepts it.
    ///
    /// Commits are serialized: no other batch is published between the
    /// precondition check and the publication of this batch. The whole
    /// batch receives a single new sequence number, which is returned. An
    /// empty batch only evaluates the precondition and returns the current
    /// sequence.
    ///
    /// # Errors
    ///
    /// Returns the precondition's error unchanged, in which case nothing
    /// was applied.
    fn apply_log(
        &self,
        batch: WriteBatch,
        precondition: &mut Precondition<'_>,
    ) -> StorageResult<SequenceNumber>;

    /// Applies `batch` unconditionally.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the batch.
    fn write(&self, batch: WriteBatch) -> StorageResult<SequenceNumber> {
        self.apply_log(batch, &mut || Ok(()))
    }
}
