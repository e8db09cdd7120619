//! Transaction state.

use crate::access::AccessMode;
use crate::config::{Config, TransactionHints};
use crate::error::{CoreError, CoreResult};
use crate::transaction::collection::{CollectionLock, LockOutcome};
use crate::transaction::manager::Registry;
use crate::transaction::savepoint::{SavepointMarker, SavepointStack};
use crate::transaction::tracker::{AccessKind, KeyTracker};
use crate::transaction::validator::{ConflictValidator, Validation};
use crate::types::{CollectionId, NestingLevel, SequenceNumber, Snapshot, TransactionId};
use bytes::Bytes;
use mctx_storage::{Operation, StorageEngine, StorageError, WriteBatch};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Created; collections may be registered, locks are not yet taken.
    Created,
    /// Begun; reads and writes are allowed.
    Running,
    /// Committed; the transaction is inert.
    Committed,
    /// Aborted; the transaction is inert.
    Aborted,
}

impl TransactionStatus {
    /// Returns true for `Committed` and `Aborted`.
    #[must_use]
    pub fn is_terminated(self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }
}

/// A multi-collection transaction.
///
/// Writes are buffered in per-collection logs and become visible to
/// others atomically at commit. Keys read for update or written are
/// validated at commit against writes committed after the transaction's
/// reference point; the first committer of an overlapping key wins.
///
/// A transaction is owned by one caller at a time. Dropping a transaction
/// that has not terminated aborts it.
///
/// # Example
///
/// ```rust
/// use mctx_core::{AccessMode, CollectionId, TransactionHints, TransactionManager};
///
/// let manager = TransactionManager::in_memory();
/// let users = CollectionId::new(1);
///
/// let mut txn = manager
///     .begin(TransactionHints::default(), &[(users, AccessMode::Write)])
///     .unwrap();
/// txn.put(users, "alice", "admin").unwrap();
/// txn.commit().unwrap();
///
/// assert_eq!(manager.get(users, b"alice").unwrap().as_deref(), Some(&b"admin"[..]));
/// ```
pub struct Transaction {
    id: TransactionId,
    engine: Arc<dyn StorageEngine>,
    config: Config,
    hints: TransactionHints,
    registry: Arc<Registry>,
    status: TransactionStatus,
    nesting: NestingLevel,
    snapshot: Option<Snapshot>,
    /// Registration order.
    collections: Vec<CollectionLock>,
    savepoints: SavepointStack,
    tracker: KeyTracker,
    next_log_seq: u64,
    pending_bytes: usize,
}

impl Transaction {
    pub(crate) fn new(
        id: TransactionId,
        engine: Arc<dyn StorageEngine>,
        config: Config,
        hints: TransactionHints,
        registry: Arc<Registry>,
    ) -> Self {
        registry.started(id);
        debug!(txn = %id, ?hints, "created transaction");
        Self {
            id,
            engine,
            config,
            hints,
            registry,
            status: TransactionStatus::Created,
            nesting: NestingLevel::TOP,
            snapshot: None,
            collections: Vec::new(),
            savepoints: SavepointStack::new(),
            tracker: KeyTracker::default(),
            next_log_seq: 0,
            pending_bytes: 0,
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    /// Returns true while reads and writes are allowed.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == TransactionStatus::Running
    }

    /// Returns the hints fixed at creation.
    #[must_use]
    pub fn hints(&self) -> TransactionHints {
        self.hints
    }

    /// Returns the current nesting level.
    #[must_use]
    pub fn nesting_level(&self) -> NestingLevel {
        self.nesting
    }

    /// Returns the snapshot reads are served from, if one is set.
    #[must_use]
    pub fn snapshot(&self) -> Option<Snapshot> {
        self.snapshot
    }

    /// Returns a registered collection.
    #[must_use]
    pub fn collection(&self, collection: CollectionId) -> Option<&CollectionLock> {
        self.collections.iter().find(|entry| entry.id() == collection)
    }

    /// Iterates registered collections in registration order.
    pub fn collections(&self) -> impl Iterator<Item = &CollectionLock> {
        self.collections.iter()
    }

    /// Number of savepoints currently set.
    #[must_use]
    pub fn savepoint_count(&self) -> usize {
        self.savepoints.len()
    }

    /// Registers `collection` with at least `access`.
    ///
    /// Re-registration at a weaker or equal mode is a no-op; a stronger mode
    /// upgrades the existing registration. Once running, new registrations
    /// and upgrades need the `allow_implicit_collections` hint and take the
    /// lock immediately. Inside a nested level only read registrations may
    /// be added or upgraded.
    ///
    /// # Errors
    ///
    /// - `Forbidden` if the registration is not allowed in the current state
    /// - `LockTimeout` if the lock is not granted in time; the transaction is
    ///   aborted
    /// - `Internal` if the transaction has terminated
    pub fn register_collection(
        &mut self,
        collection: CollectionId,
        access: AccessMode,
    ) -> CoreResult<()> {
        self.register(collection, access).map(|_| ())
    }

    fn register(&mut self, collection: CollectionId, access: AccessMode) -> CoreResult<usize> {
        self.ensure_live()?;
        let running = self.is_running();
        let level = self.nesting;

        let index = match self.position(collection) {
            Some(index) => {
                let entry = &self.collections[index];
                if access > entry.requested_access() {
                    if running && !self.hints.allow_implicit_collections {
                        return Err(CoreError::forbidden(format!(
                            "cannot upgrade {collection} to {access} after begin"
                        )));
                    }
                    if entry.registered_at() < level {
                        return Err(CoreError::forbidden(format!(
                            "{collection} was registered at level {} and cannot be upgraded at level {level}",
                            entry.registered_at()
                        )));
                    }
                    Self::ensure_nested_read_only(collection, access, level)?;
                }
                self.collections[index].request(access, level);
                index
            }
            None => {
                if running && !self.hints.allow_implicit_collections {
                    return Err(CoreError::forbidden(format!(
                        "{collection} was not registered before begin"
                    )));
                }
                Self::ensure_nested_read_only(collection, access, level)?;
                self.collections
                    .push(CollectionLock::new(collection, access, level));
                self.collections.len() - 1
            }
        };
        trace!(txn = %self.id, %collection, %access, %level, "registered collection");

        if running {
            self.lock_collection(index)?;
        }
        Ok(index)
    }

    /// Nested levels release their locks on exit while pending writes stay
    /// in the log, so they may only add or upgrade read registrations.
    fn ensure_nested_read_only(
        collection: CollectionId,
        access: AccessMode,
        level: NestingLevel,
    ) -> CoreResult<()> {
        if level.is_top() || !access.allows_writes() {
            return Ok(());
        }
        Err(CoreError::forbidden(format!(
            "{collection} cannot be registered for {access} at nested level {level}"
        )))
    }

    /// Starts the transaction, locking every registered collection.
    ///
    /// # Errors
    ///
    /// If a lock cannot be acquired the transaction is aborted, no lock is
    /// left held and the lock error is returned. Returns `Internal` if the
    /// transaction was already begun or has terminated.
    pub fn begin(&mut self) -> CoreResult<()> {
        self.ensure_live()?;
        if self.status != TransactionStatus::Created {
            return Err(CoreError::internal(format!("{} already begun", self.id)));
        }
        for index in 0..self.collections.len() {
            self.lock_collection(index)?;
        }
        self.status = TransactionStatus::Running;
        debug!(txn = %self.id, collections = self.collections.len(), "began transaction");
        Ok(())
    }

    /// Re-enters the transaction one level deeper.
    ///
    /// # Errors
    ///
    /// Returns `Internal` unless the transaction is running.
    pub fn enter_nested(&mut self) -> CoreResult<NestingLevel> {
        self.ensure_running()?;
        self.nesting = NestingLevel::new(self.nesting.as_u32() + 1);
        debug!(txn = %self.id, level = %self.nesting, "entered nested level");
        Ok(self.nesting)
    }

    /// Leaves the current nesting level, releasing locks it took.
    ///
    /// # Errors
    ///
    /// Returns `Internal` at the top level or unless running.
    pub fn exit_nested(&mut self) -> CoreResult<NestingLevel> {
        self.ensure_running()?;
        if self.nesting.is_top() {
            return Err(CoreError::internal(format!(
                "{} is not inside a nested level",
                self.id
            )));
        }
        let level = self.nesting;
        let engine = Arc::clone(&self.engine);
        let mut released = 0;
        for entry in &mut self.collections {
            if entry.unlock(level, engine.locks()) {
                released += 1;
            }
        }
        self.nesting = NestingLevel::new(level.as_u32() - 1);
        debug!(txn = %self.id, %level, released, "exited nested level");
        Ok(self.nesting)
    }

    /// Fixes reads to the engine's current committed state.
    ///
    /// Keys tracked afterwards are validated against this snapshot.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the transaction has terminated.
    pub fn set_snapshot(&mut self) -> CoreResult<Snapshot> {
        self.ensure_live()?;
        let snapshot = self.engine.take_snapshot();
        self.snapshot = Some(snapshot);
        trace!(txn = %self.id, sequence = %snapshot.sequence(), "set snapshot");
        Ok(snapshot)
    }

    /// Reads a key.
    ///
    /// The transaction's own pending writes are seen first, then the
    /// snapshot or the latest committed state. Requires read access.
    ///
    /// # Errors
    ///
    /// - `Forbidden` if the collection is not accessible for reading
    /// - `Internal` unless running
    pub fn get(&mut self, collection: CollectionId, key: &[u8]) -> CoreResult<Option<Bytes>> {
        let index = self.ensure_access(collection, AccessMode::Read)?;
        self.read_value(index, key)
    }

    /// Reads a key and tracks it for conflict validation.
    ///
    /// Requires write access.
    ///
    /// # Errors
    ///
    /// - `Forbidden` if the collection is not accessible for writing
    /// - `Internal` unless running
    pub fn get_for_update(
        &mut self,
        collection: CollectionId,
        key: &[u8],
    ) -> CoreResult<Option<Bytes>> {
        let index = self.ensure_access(collection, AccessMode::Write)?;
        let since = self.reference_sequence();
        let log_seq = self.next_log_seq();
        self.tracker.track(
            log_seq,
            collection,
            Bytes::copy_from_slice(key),
            AccessKind::ReadForUpdate,
            since,
        );
        self.read_value(index, key)
    }

    /// Stops tracking the most recent read-for-update of `key`.
    ///
    /// Writes and other reads stay tracked. Calling this more often than
    /// the key was read for update has no effect. Rolling back to a
    /// savepoint set before the undo tracks the read again.
    ///
    /// # Errors
    ///
    /// Returns `Internal` unless running.
    pub fn undo_get_for_update(&mut self, collection: CollectionId, key: &[u8]) -> CoreResult<()> {
        self.ensure_running()?;
        let log_seq = self.next_log_seq();
        let removed = self.tracker.untrack_read(log_seq, collection, key);
        trace!(txn = %self.id, %collection, removed, "undid read for update");
        Ok(())
    }

    /// Writes `value` under `key`.
    ///
    /// # Errors
    ///
    /// - `Forbidden` if the collection is not accessible for writing, or a
    ///   single-operation transaction already wrote
    /// - `Busy`, `TryAgain` or `LockTimeout` from an intermediate commit;
    ///   the transaction is aborted
    /// - `Internal` unless running
    pub fn put(
        &mut self,
        collection: CollectionId,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> CoreResult<()> {
        self.write(collection, Operation::put(key, value))
    }

    /// Deletes `key`.
    ///
    /// # Errors
    ///
    /// Same as [`Transaction::put`].
    pub fn delete(&mut self, collection: CollectionId, key: impl Into<Bytes>) -> CoreResult<()> {
        self.write(collection, Operation::delete(key))
    }

    fn write(&mut self, collection: CollectionId, operation: Operation) -> CoreResult<()> {
        let index = self.ensure_access(collection, AccessMode::Write)?;
        if self.hints.single_operation && self.num_puts() + self.num_deletes() > 0 {
            return Err(CoreError::forbidden(format!(
                "{} is limited to a single operation",
                self.id
            )));
        }

        let since = self.reference_sequence();
        let log_seq = self.next_log_seq();
        self.tracker
            .track(log_seq, collection, operation.key.clone(), AccessKind::Write, since);
        self.pending_bytes += operation.payload_size();
        self.collections[index].append(log_seq, operation);

        self.maybe_intermediate_commit()
    }

    /// Sets a savepoint at the current end of the operation log.
    ///
    /// # Errors
    ///
    /// Returns `Internal` unless running.
    pub fn set_savepoint(&mut self) -> CoreResult<SavepointMarker> {
        self.ensure_running()?;
        let marker = self.savepoints.push(self.next_log_seq);
        self.next_log_seq = marker.sequence_in_log() + 1;
        trace!(txn = %self.id, marker = marker.sequence_in_log(), "set savepoint");
        Ok(marker)
    }

    /// Undoes everything done since the most recent savepoint and removes it.
    ///
    /// Pending writes and tracked reads after the marker are discarded.
    /// Collection registrations and locks are kept.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no savepoint is set
    /// - `Internal` unless running
    pub fn rollback_to_savepoint(&mut self) -> CoreResult<()> {
        self.ensure_running()?;
        let marker = self
            .savepoints
            .pop()
            .ok_or_else(|| CoreError::not_found(format!("no savepoint set in {}", self.id)))?;

        let at = marker.sequence_in_log();
        for entry in &mut self.collections {
            entry.truncate_from(at);
        }
        self.tracker.truncate_from(at);
        self.pending_bytes = self.collections.iter().map(CollectionLock::pending_bytes).sum();

        self.registry.stats.record_savepoint_rollback();
        debug!(txn = %self.id, marker = at, remaining = self.savepoints.len(), "rolled back to savepoint");
        Ok(())
    }

    /// Validates and applies all pending writes atomically.
    ///
    /// A transaction without pending writes or tracked keys commits
    /// trivially. Returns the sequence at which the writes became visible.
    ///
    /// # Errors
    ///
    /// - `Busy` if a tracked key was committed by another transaction
    /// - `TryAgain` if validation needed evicted history
    /// - `Internal` unless running at nesting level 0
    ///
    /// Validation and storage errors abort the transaction; nothing is
    /// applied.
    pub fn commit(&mut self) -> CoreResult<SequenceNumber> {
        self.ensure_running()?;
        if !self.nesting.is_top() {
            return Err(CoreError::internal(format!(
                "{} cannot commit at nesting level {}",
                self.id, self.nesting
            )));
        }

        let (sequence, operations) = self.apply_pending()?;
        self.release_locks();
        self.status = TransactionStatus::Committed;
        self.registry.finish(self.id);
        self.registry.stats.record_commit(operations);
        debug!(txn = %self.id, %sequence, operations, "committed transaction");
        Ok(sequence)
    }

    /// Discards all pending writes and releases every lock.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the transaction has already terminated or is
    /// inside a nested level.
    pub fn abort(&mut self) -> CoreResult<()> {
        self.ensure_live()?;
        if !self.nesting.is_top() {
            return Err(CoreError::internal(format!(
                "{} cannot abort at nesting level {}",
                self.id, self.nesting
            )));
        }
        self.abort_internal();
        Ok(())
    }

    /// Alias for [`Transaction::abort`].
    ///
    /// # Errors
    ///
    /// Same as [`Transaction::abort`].
    pub fn rollback(&mut self) -> CoreResult<()> {
        self.abort()
    }

    /// Number of distinct keys tracked for validation.
    #[must_use]
    pub fn num_keys(&self) -> usize {
        self.tracker.num_keys()
    }

    /// Puts performed, including intermediately committed ones.
    #[must_use]
    pub fn num_puts(&self) -> u64 {
        self.collections.iter().map(CollectionLock::num_puts).sum()
    }

    /// Deletes performed, including intermediately committed ones.
    #[must_use]
    pub fn num_deletes(&self) -> u64 {
        self.collections.iter().map(CollectionLock::num_deletes).sum()
    }

    /// Writes waiting to be committed.
    #[must_use]
    pub fn pending_operations(&self) -> usize {
        self.collections
            .iter()
            .map(CollectionLock::pending_operations)
            .sum()
    }

    fn ensure_live(&self) -> CoreResult<()> {
        match self.status {
            TransactionStatus::Committed => Err(CoreError::internal(format!(
                "{} already committed",
                self.id
            ))),
            TransactionStatus::Aborted => {
                Err(CoreError::internal(format!("{} already aborted", self.id)))
            }
            TransactionStatus::Created | TransactionStatus::Running => Ok(()),
        }
    }

    fn ensure_running(&self) -> CoreResult<()> {
        self.ensure_live()?;
        if self.status == TransactionStatus::Created {
            return Err(CoreError::internal(format!("{} has not begun", self.id)));
        }
        Ok(())
    }

    fn position(&self, collection: CollectionId) -> Option<usize> {
        self.collections
            .iter()
            .position(|entry| entry.id() == collection)
    }

    /// Resolves `collection` for an operation needing `required` access.
    fn ensure_access(&mut self, collection: CollectionId, required: AccessMode) -> CoreResult<usize> {
        self.ensure_running()?;
        let existing = self.position(collection);
        let covered = existing.filter(|&index| {
            self.collections[index]
                .requested_access()
                .covers(required)
        });

        let index = match (covered, existing) {
            (Some(index), _) => index,
            _ if self.hints.allow_implicit_collections => self.register(collection, required)?,
            (None, Some(index)) => {
                return Err(CoreError::forbidden(format!(
                    "{collection} is registered for {} but {required} is required",
                    self.collections[index].requested_access()
                )))
            }
            (None, None) => {
                return Err(CoreError::forbidden(format!(
                    "{collection} is not registered with {}",
                    self.id
                )))
            }
        };

        // A nested level may have released the lock on exit.
        if self.collections[index].held_lock() < self.collections[index].requested_access() {
            self.lock_collection(index)?;
        }
        Ok(index)
    }

    fn lock_collection(&mut self, index: usize) -> CoreResult<LockOutcome> {
        let engine = Arc::clone(&self.engine);
        let backend = (!self.hints.no_usage_lock).then(|| engine.locks());
        let result = self.collections[index].lock(
            self.nesting,
            self.id,
            backend,
            self.config.lock_timeout,
        );

        result.map_err(|err| {
            let collection = self.collections[index].id();
            if matches!(err, CoreError::LockTimeout { .. }) {
                self.registry.stats.record_lock_timeout();
            }
            warn!(txn = %self.id, %collection, error = %err, "lock acquisition failed");
            self.abort_internal();
            err
        })
    }

    fn reference_sequence(&self) -> SequenceNumber {
        self.snapshot
            .map_or_else(|| self.engine.latest_sequence(), |snapshot| snapshot.sequence())
    }

    fn next_log_seq(&mut self) -> u64 {
        let seq = self.next_log_seq;
        self.next_log_seq += 1;
        seq
    }

    fn read_value(&self, index: usize, key: &[u8]) -> CoreResult<Option<Bytes>> {
        let entry = &self.collections[index];
        if let Some(operation) = entry.pending(key) {
            return Ok(operation.value().cloned());
        }
        Ok(self.engine.get(entry.id(), key, self.snapshot.as_ref())?)
    }

    fn maybe_intermediate_commit(&mut self) -> CoreResult<()> {
        if !self.hints.intermediate_commits {
            return Ok(());
        }
        let pending = self.pending_operations();
        if pending < self.config.intermediate_commit_count
            && self.pending_bytes < self.config.intermediate_commit_size
        {
            return Ok(());
        }

        let (sequence, operations) = self.apply_pending()?;
        self.tracker.clear();
        self.savepoints.clear();
        if self.snapshot.is_some() {
            self.snapshot = Some(self.engine.take_snapshot());
        }
        self.registry.stats.record_intermediate_commit(operations);
        debug!(txn = %self.id, %sequence, operations, "intermediate commit");
        Ok(())
    }

    /// Validates and applies the pending logs; aborts on failure.
    fn apply_pending(&mut self) -> CoreResult<(SequenceNumber, u64)> {
        match self.try_apply() {
            Ok(applied) => Ok(applied),
            Err(err) => {
                match &err {
                    CoreError::Busy { collection, key } => {
                        self.registry.stats.record_conflict();
                        debug!(txn = %self.id, %collection, ?key, "write conflict");
                    }
                    CoreError::TryAgain { .. } => {
                        self.registry.stats.record_history_unavailable();
                        warn!(txn = %self.id, error = %err, "conflict history unavailable");
                    }
                    _ => warn!(txn = %self.id, error = %err, "commit failed"),
                }
                self.abort_internal();
                Err(err)
            }
        }
    }

    fn try_apply(&mut self) -> CoreResult<(SequenceNumber, u64)> {
        let keys = self.tracker.conflict_keys();
        let mut batch = WriteBatch::new();
        for entry in &self.collections {
            batch.push_collection(entry.id(), entry.operations().cloned().collect());
        }
        let operations = batch.len() as u64;

        if batch.is_empty() && keys.is_empty() {
            return Ok((self.engine.latest_sequence(), 0));
        }

        let validator = ConflictValidator::new(self.engine.as_ref());
        let mut rejection = None;
        let result = self.engine.apply_log(batch, &mut || {
            let err = match validator.validate(&keys) {
                Ok(Validation::Clean) => return Ok(()),
                Ok(Validation::Conflict(key)) => CoreError::busy(key.collection, key.key),
                Err(err) => err,
            };
            rejection = Some(err);
            Err(StorageError::PreconditionFailed)
        });

        let sequence = match result {
            Ok(sequence) => sequence,
            Err(err) => return Err(rejection.unwrap_or_else(|| err.into())),
        };
        for entry in &mut self.collections {
            entry.mark_applied();
        }
        self.pending_bytes = 0;
        Ok((sequence, operations))
    }

    fn release_locks(&mut self) {
        let engine = Arc::clone(&self.engine);
        for entry in &mut self.collections {
            entry.release_all(engine.locks());
        }
    }

    fn abort_internal(&mut self) {
        if self.status.is_terminated() {
            return;
        }
        self.release_locks();
        for entry in &mut self.collections {
            entry.discard_log();
        }
        self.tracker.clear();
        self.savepoints.clear();
        self.pending_bytes = 0;
        self.nesting = NestingLevel::TOP;
        self.status = TransactionStatus::Aborted;
        self.registry.finish(self.id);
        self.registry.stats.record_abort();
        debug!(txn = %self.id, "aborted transaction");
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.status.is_terminated() {
            self.abort_internal();
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("nesting", &self.nesting)
            .field("snapshot", &self.snapshot)
            .field("hints", &self.hints)
            .field("collections", &self.collections)
            .field("savepoints", &self.savepoints.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::manager::TransactionManager;
    use mctx_storage::{InMemoryEngine, LockMode};
    use std::time::Duration;

    const USERS: CollectionId = CollectionId(1);
    const ORDERS: CollectionId = CollectionId(2);

    fn manager() -> TransactionManager {
        TransactionManager::in_memory()
    }

    fn begin_write(manager: &TransactionManager) -> Transaction {
        manager
            .begin(TransactionHints::default(), &[(USERS, AccessMode::Write)])
            .unwrap()
    }

    fn value(bytes: Option<Bytes>) -> Option<Vec<u8>> {
        bytes.map(|b| b.to_vec())
    }

    #[test]
    fn new_transaction_is_created() {
        let manager = manager();
        let txn = manager.create(TransactionHints::default());
        assert_eq!(txn.status(), TransactionStatus::Created);
        assert!(!txn.is_running());
    }

    #[test]
    fn operations_require_begin() {
        let manager = manager();
        let mut txn = manager.create(TransactionHints::default());
        txn.register_collection(USERS, AccessMode::Write).unwrap();

        let err = txn.put(USERS, "a", "1").unwrap_err();
        assert!(matches!(err, CoreError::Internal { .. }));
        assert!(matches!(txn.commit().unwrap_err(), CoreError::Internal { .. }));
    }

    #[test]
    fn reads_see_own_writes() {
        let manager = manager();
        manager.put(USERS, "a", "old").unwrap();

        let mut txn = begin_write(&manager);
        txn.put(USERS, "a", "new").unwrap();
        assert_eq!(value(txn.get(USERS, b"a").unwrap()), Some(b"new".to_vec()));

        txn.delete(USERS, "a").unwrap();
        assert_eq!(txn.get(USERS, b"a").unwrap(), None);

        assert_eq!(value(manager.get(USERS, b"a").unwrap()), Some(b"old".to_vec()));
    }

    #[test]
    fn commit_publishes_all_writes_at_one_sequence() {
        let manager = manager();
        let mut txn = manager
            .begin(
                TransactionHints::default(),
                &[(USERS, AccessMode::Write), (ORDERS, AccessMode::Write)],
            )
            .unwrap();
        txn.put(USERS, "u", "1").unwrap();
        txn.put(ORDERS, "o", "2").unwrap();
        let sequence = txn.commit().unwrap();

        assert_eq!(manager.engine().latest_sequence(), sequence);
        assert!(manager.get(USERS, b"u").unwrap().is_some());
        assert!(manager.get(ORDERS, b"o").unwrap().is_some());
        assert_eq!(txn.status(), TransactionStatus::Committed);
    }

    #[test]
    fn snapshot_reads_are_repeatable() {
        let manager = manager();
        manager.put(USERS, "a", "1").unwrap();

        let mut txn = manager
            .begin(TransactionHints::default(), &[(USERS, AccessMode::Read)])
            .unwrap();
        txn.set_snapshot().unwrap();
        manager.put(USERS, "a", "2").unwrap();

        assert_eq!(value(txn.get(USERS, b"a").unwrap()), Some(b"1".to_vec()));
        txn.commit().unwrap();
    }

    #[test]
    fn terminated_transaction_is_inert() {
        let manager = manager();
        let mut txn = begin_write(&manager);
        txn.abort().unwrap();

        assert!(matches!(txn.abort().unwrap_err(), CoreError::Internal { .. }));
        assert!(matches!(txn.rollback().unwrap_err(), CoreError::Internal { .. }));
        assert!(matches!(txn.get(USERS, b"a").unwrap_err(), CoreError::Internal { .. }));
        assert!(matches!(
            txn.register_collection(ORDERS, AccessMode::Read).unwrap_err(),
            CoreError::Internal { .. }
        ));
    }

    #[test]
    fn abort_discards_writes() {
        let manager = manager();
        let mut txn = begin_write(&manager);
        txn.put(USERS, "a", "1").unwrap();
        txn.abort().unwrap();

        assert_eq!(manager.get(USERS, b"a").unwrap(), None);
        assert_eq!(manager.stats().transactions_aborted(), 1);
    }

    #[test]
    fn unregistered_collection_is_forbidden() {
        let manager = manager();
        let mut txn = begin_write(&manager);

        assert!(matches!(
            txn.get(ORDERS, b"a").unwrap_err(),
            CoreError::Forbidden { .. }
        ));
        assert!(matches!(
            txn.register_collection(ORDERS, AccessMode::Read).unwrap_err(),
            CoreError::Forbidden { .. }
        ));
        assert!(txn.is_running());
    }

    #[test]
    fn read_access_cannot_write() {
        let manager = manager();
        let mut txn = manager
            .begin(TransactionHints::default(), &[(USERS, AccessMode::Read)])
            .unwrap();

        assert!(matches!(
            txn.put(USERS, "a", "1").unwrap_err(),
            CoreError::Forbidden { .. }
        ));
        assert!(matches!(
            txn.get_for_update(USERS, b"a").unwrap_err(),
            CoreError::Forbidden { .. }
        ));
        assert!(txn.get(USERS, b"a").unwrap().is_none());
    }

    #[test]
    fn implicit_registration_upgrades() {
        let manager = manager();
        let hints = TransactionHints::new().allow_implicit_collections(true);
        let mut txn = manager.begin(hints, &[(USERS, AccessMode::Read)]).unwrap();

        txn.put(USERS, "a", "1").unwrap();
        txn.get(ORDERS, b"x").unwrap();

        assert_eq!(txn.collection(USERS).unwrap().held_lock(), AccessMode::Write);
        assert_eq!(txn.collection(ORDERS).unwrap().requested_access(), AccessMode::Read);
        let order: Vec<_> = txn.collections().map(CollectionLock::id).collect();
        assert_eq!(order, vec![USERS, ORDERS]);
    }

    #[test]
    fn reregistration_never_downgrades() {
        let manager = manager();
        let mut txn = manager.create(TransactionHints::default());
        txn.register_collection(USERS, AccessMode::Exclusive).unwrap();
        txn.register_collection(USERS, AccessMode::Read).unwrap();
        txn.begin().unwrap();

        let entry = txn.collection(USERS).unwrap();
        assert_eq!(entry.requested_access(), AccessMode::Exclusive);
        assert_eq!(entry.held_lock(), AccessMode::Exclusive);
        assert_eq!(txn.collections().count(), 1);
    }

    #[test]
    fn commit_releases_locks() {
        let engine = Arc::new(InMemoryEngine::new());
        let manager = TransactionManager::new(engine.clone(), Config::default());
        let mut txn = manager
            .begin(TransactionHints::default(), &[(USERS, AccessMode::Exclusive)])
            .unwrap();
        assert_eq!(engine.lock_table().held_by(USERS, txn.id()), Some(LockMode::Exclusive));

        txn.commit().unwrap();
        assert_eq!(engine.lock_table().holder_count(USERS), 0);
    }

    #[test]
    fn drop_aborts_and_releases() {
        let engine = Arc::new(InMemoryEngine::new());
        let manager = TransactionManager::new(engine.clone(), Config::default());
        {
            let mut txn = manager
                .begin(TransactionHints::default(), &[(USERS, AccessMode::Exclusive)])
                .unwrap();
            txn.put(USERS, "a", "1").unwrap();
        }
        assert_eq!(engine.lock_table().holder_count(USERS), 0);
        assert_eq!(manager.get(USERS, b"a").unwrap(), None);
        assert_eq!(manager.stats().transactions_aborted(), 1);
        assert!(manager.active_transactions().is_empty());
    }

    #[test]
    fn lock_timeout_aborts_begin() {
        let engine = Arc::new(InMemoryEngine::new());
        let config = Config::new().lock_timeout(Some(Duration::ZERO));
        let manager = TransactionManager::new(engine.clone(), config);

        let holder = manager
            .begin(TransactionHints::default(), &[(USERS, AccessMode::Exclusive)])
            .unwrap();

        let mut txn = manager.create(TransactionHints::default());
        txn.register_collection(ORDERS, AccessMode::Write).unwrap();
        txn.register_collection(USERS, AccessMode::Read).unwrap();
        let err = txn.begin().unwrap_err();

        assert!(matches!(err, CoreError::LockTimeout { collection } if collection == USERS));
        assert_eq!(txn.status(), TransactionStatus::Aborted);
        assert_eq!(engine.lock_table().holder_count(ORDERS), 0);
        assert_eq!(manager.stats().lock_timeouts(), 1);
        drop(holder);
    }

    #[test]
    fn no_usage_lock_skips_native_locks() {
        let engine = Arc::new(InMemoryEngine::new());
        let manager = TransactionManager::new(engine.clone(), Config::default());
        let hints = TransactionHints::new().no_usage_lock(true);
        let mut txn = manager.begin(hints, &[(USERS, AccessMode::Exclusive)]).unwrap();

        assert_eq!(engine.lock_table().holder_count(USERS), 0);
        assert_eq!(txn.collection(USERS).unwrap().held_lock(), AccessMode::Exclusive);
        txn.put(USERS, "a", "1").unwrap();
        txn.commit().unwrap();
    }

    #[test]
    fn single_operation_allows_one_write() {
        let manager = manager();
        let hints = TransactionHints::new().single_operation(true);
        let mut txn = manager.begin(hints, &[(USERS, AccessMode::Write)]).unwrap();

        txn.put(USERS, "a", "1").unwrap();
        let err = txn.delete(USERS, "b").unwrap_err();
        assert!(matches!(err, CoreError::Forbidden { .. }));
        txn.commit().unwrap();
        assert!(manager.get(USERS, b"a").unwrap().is_some());
    }

    #[test]
    fn savepoint_rollback_restores_log() {
        let manager = manager();
        let mut txn = begin_write(&manager);
        txn.put(USERS, "A", "a").unwrap();
        txn.set_savepoint().unwrap();
        txn.put(USERS, "B", "b").unwrap();
        txn.get_for_update(USERS, b"C").unwrap();
        assert_eq!(txn.num_keys(), 3);

        txn.rollback_to_savepoint().unwrap();

        assert_eq!(txn.num_keys(), 1);
        assert_eq!(txn.pending_operations(), 1);
        assert_eq!(txn.get(USERS, b"B").unwrap(), None);
        assert!(matches!(
            txn.rollback_to_savepoint().unwrap_err(),
            CoreError::NotFound { .. }
        ));
    }

    #[test]
    fn nested_savepoints_unwind_in_order() {
        let manager = manager();
        let mut txn = begin_write(&manager);
        txn.set_savepoint().unwrap();
        txn.put(USERS, "a", "1").unwrap();
        txn.set_savepoint().unwrap();
        txn.set_savepoint().unwrap();
        txn.put(USERS, "b", "2").unwrap();
        assert_eq!(txn.savepoint_count(), 3);

        txn.rollback_to_savepoint().unwrap();
        assert_eq!(txn.pending_operations(), 1);
        txn.rollback_to_savepoint().unwrap();
        assert_eq!(txn.pending_operations(), 1);
        txn.rollback_to_savepoint().unwrap();
        assert_eq!(txn.pending_operations(), 0);
    }

    #[test]
    fn counters_track_operations() {
        let manager = manager();
        let mut txn = begin_write(&manager);
        txn.put(USERS, "a", "1").unwrap();
        txn.put(USERS, "a", "2").unwrap();
        txn.delete(USERS, "b").unwrap();

        assert_eq!(txn.num_puts(), 2);
        assert_eq!(txn.num_deletes(), 1);
        assert_eq!(txn.num_keys(), 2);
        assert_eq!(txn.pending_operations(), 3);
    }

    #[test]
    fn nested_levels_release_their_locks() {
        let engine = Arc::new(InMemoryEngine::new());
        let manager = TransactionManager::new(engine.clone(), Config::default());
        let hints = TransactionHints::new().allow_implicit_collections(true);
        let mut txn = manager.begin(hints, &[(USERS, AccessMode::Write)]).unwrap();

        assert_eq!(txn.enter_nested().unwrap(), NestingLevel::new(1));
        txn.register_collection(ORDERS, AccessMode::Read).unwrap();
        txn.register_collection(USERS, AccessMode::Read).unwrap();
        assert_eq!(engine.lock_table().holder_count(ORDERS), 1);
        assert!(matches!(
            txn.commit().unwrap_err(),
            CoreError::Internal { .. }
        ));

        txn.exit_nested().unwrap();
        assert_eq!(engine.lock_table().holder_count(ORDERS), 0);
        assert_eq!(engine.lock_table().holder_count(USERS), 1);

        // Writing from the outer level upgrades and relocks it there.
        txn.put(ORDERS, "o", "1").unwrap();
        assert_eq!(engine.lock_table().holder_count(ORDERS), 1);
        txn.commit().unwrap();
    }

    #[test]
    fn nested_level_cannot_register_for_writes() {
        let engine = Arc::new(InMemoryEngine::new());
        let manager = TransactionManager::new(engine.clone(), Config::default());
        let hints = TransactionHints::new().allow_implicit_collections(true);
        let mut txn = manager.begin(hints, &[(USERS, AccessMode::Write)]).unwrap();

        txn.enter_nested().unwrap();
        for access in [AccessMode::Write, AccessMode::Exclusive] {
            let err = txn.register_collection(ORDERS, access).unwrap_err();
            assert!(matches!(err, CoreError::Forbidden { .. }));
        }
        assert!(matches!(
            txn.put(ORDERS, "o", "1").unwrap_err(),
            CoreError::Forbidden { .. }
        ));

        txn.register_collection(ORDERS, AccessMode::Read).unwrap();
        let err = txn.register_collection(ORDERS, AccessMode::Write).unwrap_err();
        assert!(matches!(err, CoreError::Forbidden { .. }));
        assert_eq!(txn.pending_operations(), 0);
        assert!(txn.is_running());

        // Collections registered at the outer level stay writable.
        txn.put(USERS, "u", "1").unwrap();
        txn.exit_nested().unwrap();
        assert_eq!(engine.lock_table().holder_count(ORDERS), 0);
        txn.commit().unwrap();
    }

    #[test]
    fn rollback_restores_undone_read_for_update() {
        let manager = manager();
        let mut txn = begin_write(&manager);

        txn.get_for_update(USERS, b"a").unwrap();
        txn.set_savepoint().unwrap();
        txn.undo_get_for_update(USERS, b"a").unwrap();
        assert_eq!(txn.num_keys(), 0);

        txn.rollback_to_savepoint().unwrap();
        assert_eq!(txn.num_keys(), 1);

        manager.put(USERS, "a", "external").unwrap();
        assert!(matches!(txn.commit().unwrap_err(), CoreError::Busy { .. }));
    }

    #[test]
    fn undo_before_savepoint_survives_rollback() {
        let manager = manager();
        let mut txn = begin_write(&manager);

        txn.get_for_update(USERS, b"a").unwrap();
        txn.undo_get_for_update(USERS, b"a").unwrap();
        txn.set_savepoint().unwrap();
        txn.get_for_update(USERS, b"b").unwrap();
        txn.rollback_to_savepoint().unwrap();
        assert_eq!(txn.num_keys(), 0);

        manager.put(USERS, "a", "external").unwrap();
        txn.commit().unwrap();
    }

    #[test]
    fn nested_level_cannot_upgrade_outer_registration() {
        let manager = manager();
        let hints = TransactionHints::new().allow_implicit_collections(true);
        let mut txn = manager.begin(hints, &[(USERS, AccessMode::Read)]).unwrap();

        txn.enter_nested().unwrap();
        let err = txn
            .register_collection(USERS, AccessMode::Exclusive)
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden { .. }));

        txn.exit_nested().unwrap();
        assert!(matches!(txn.exit_nested().unwrap_err(), CoreError::Internal { .. }));
        txn.register_collection(USERS, AccessMode::Exclusive).unwrap();
    }

    #[test]
    fn write_conflict_aborts_second_committer() {
        let manager = manager();
        let mut t1 = begin_write(&manager);
        let mut t2 = begin_write(&manager);
        t1.put(USERS, "k", "1").unwrap();
        t2.put(USERS, "k", "2").unwrap();

        t1.commit().unwrap();
        let err = t2.commit().unwrap_err();

        assert!(matches!(err, CoreError::Busy { collection, ref key } if collection == USERS && key == "k"));
        assert_eq!(t2.status(), TransactionStatus::Aborted);
        assert_eq!(manager.stats().conflicts(), 1);
        assert_eq!(value(manager.get(USERS, b"k").unwrap()), Some(b"1".to_vec()));
    }

    #[test]
    fn intermediate_commits_apply_in_place() {
        let engine: Arc<dyn StorageEngine> = Arc::new(InMemoryEngine::new());
        let config = Config::new().intermediate_commit_count(2);
        let manager = TransactionManager::new(engine, config);
        let hints = TransactionHints::new().intermediate_commits(true);
        let mut txn = manager.begin(hints, &[(USERS, AccessMode::Write)]).unwrap();

        txn.put(USERS, "a", "1").unwrap();
        txn.set_savepoint().unwrap();
        txn.put(USERS, "b", "2").unwrap();

        assert!(txn.is_running());
        assert_eq!(txn.pending_operations(), 0);
        assert_eq!(txn.savepoint_count(), 0);
        assert_eq!(txn.num_keys(), 0);
        assert_eq!(txn.num_puts(), 2);
        assert!(manager.get(USERS, b"b").unwrap().is_some());

        txn.put(USERS, "c", "3").unwrap();
        txn.abort().unwrap();
        assert!(manager.get(USERS, b"a").unwrap().is_some());
        assert!(manager.get(USERS, b"c").unwrap().is_none());
        assert_eq!(manager.stats().intermediate_commits(), 1);
    }
}
