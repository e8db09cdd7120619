//! Per-collection lock holder and pending-operation log.

use crate::access::AccessMode;
use crate::error::CoreResult;
use crate::types::{CollectionId, NestingLevel, TransactionId};
use mctx_storage::{LockBackend, LockHandle, Operation, OperationKind};
use std::time::Duration;

/// Result of [`CollectionLock::lock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// A native lock was newly acquired or upgraded; the caller's level owns it.
    Acquired,
    /// The held lock already satisfied the requested access.
    AlreadyHeld,
    /// Locking is disabled for this transaction; access was granted without
    /// a native lock.
    Skipped,
}

/// One logged write, tagged with its position in the transaction log.
#[derive(Debug, Clone)]
pub(crate) struct PendingOperation {
    pub(crate) log_seq: u64,
    pub(crate) operation: Operation,
}

/// A collection registered with a transaction.
///
/// # Invariants
///
/// - `held_lock` is either `None` or equal to `requested_access`
/// - `requested_access` never decreases
#[derive(Debug)]
pub struct CollectionLock {
    id: CollectionId,
    requested: AccessMode,
    held: AccessMode,
    registered_at: NestingLevel,
    /// Level that last changed `held`.
    locked_at: Option<NestingLevel>,
    handle: Option<LockHandle>,
    log: Vec<PendingOperation>,
    applied_puts: u64,
    applied_deletes: u64,
}

impl CollectionLock {
    pub(crate) fn new(id: CollectionId, access: AccessMode, level: NestingLevel) -> Self {
        Self {
            id,
            requested: access,
            held: AccessMode::None,
            registered_at: level,
            locked_at: None,
            handle: None,
            log: Vec::new(),
            applied_puts: 0,
            applied_deletes: 0,
        }
    }

    /// Returns the collection ID.
    #[must_use]
    pub fn id(&self) -> CollectionId {
        self.id
    }

    /// Returns the highest access mode requested so far.
    #[must_use]
    pub fn requested_access(&self) -> AccessMode {
        self.requested
    }

    /// Returns the access mode currently backed by a lock.
    #[must_use]
    pub fn held_lock(&self) -> AccessMode {
        self.held
    }

    /// Returns the outermost nesting level that registered this collection.
    #[must_use]
    pub fn registered_at(&self) -> NestingLevel {
        self.registered_at
    }

    /// Returns true if writes are waiting to be committed.
    #[must_use]
    pub fn has_pending_operations(&self) -> bool {
        !self.log.is_empty()
    }

    /// Number of pending operations.
    #[must_use]
    pub fn pending_operations(&self) -> usize {
        self.log.len()
    }

    /// Puts performed on this collection, including intermediately committed ones.
    #[must_use]
    pub fn num_puts(&self) -> u64 {
        self.applied_puts + self.count_pending(|kind| matches!(kind, OperationKind::Put(_)))
    }

    /// Deletes performed on this collection, including intermediately committed ones.
    #[must_use]
    pub fn num_deletes(&self) -> u64 {
        self.applied_deletes + self.count_pending(|kind| matches!(kind, OperationKind::Delete))
    }

    fn count_pending(&self, filter: impl Fn(&OperationKind) -> bool) -> u64 {
        self.log
            .iter()
            .filter(|pending| filter(&pending.operation.kind))
            .count() as u64
    }

    /// Raises the requested access, returning true if it was upgraded.
    ///
    /// A request from a lower nesting level moves ownership of the
    /// registration (and of a held lock) outward to that level.
    pub(crate) fn request(&mut self, access: AccessMode, level: NestingLevel) -> bool {
        if level < self.registered_at {
            self.registered_at = level;
            if self.locked_at.is_some() {
                self.locked_at = Some(level);
            }
        }
        if access > self.requested {
            self.requested = access;
            return true;
        }
        false
    }

    /// Makes the held lock satisfy the requested access.
    ///
    /// `backend` of `None` grants access without a native lock.
    pub(crate) fn lock(
        &mut self,
        level: NestingLevel,
        owner: TransactionId,
        backend: Option<&dyn LockBackend>,
        timeout: Option<Duration>,
    ) -> CoreResult<LockOutcome> {
        if self.held >= self.requested {
            return Ok(LockOutcome::AlreadyHeld);
        }
        self.registered_at = self.registered_at.min(level);

        let (Some(backend), Some(mode)) = (backend, self.requested.lock_mode()) else {
            self.held = self.requested;
            self.locked_at = Some(level);
            return Ok(LockOutcome::Skipped);
        };

        let handle = backend.acquire_lock(self.id, owner, mode, timeout)?;
        self.handle = Some(handle);
        self.held = self.requested;
        self.locked_at = Some(level);
        tracing::trace!(txn = %owner, collection = %self.id, %level, access = %self.held, "locked collection");
        Ok(LockOutcome::Acquired)
    }

    /// Releases the lock if `level` is the level that took it.
    ///
    /// Returns true if something was released.
    pub(crate) fn unlock(&mut self, level: NestingLevel, backend: &dyn LockBackend) -> bool {
        if self.held == AccessMode::None || self.locked_at != Some(level) {
            return false;
        }
        self.release(backend);
        true
    }

    /// Releases the lock regardless of level.
    pub(crate) fn release_all(&mut self, backend: &dyn LockBackend) {
        if self.held != AccessMode::None {
            self.release(backend);
        }
    }

    fn release(&mut self, backend: &dyn LockBackend) {
        if let Some(handle) = self.handle.take() {
            backend.release_lock(handle);
            tracing::trace!(txn = %handle.owner, collection = %self.id, "released collection lock");
        }
        self.held = AccessMode::None;
        self.locked_at = None;
    }

    pub(crate) fn append(&mut self, log_seq: u64, operation: Operation) {
        self.log.push(PendingOperation { log_seq, operation });
    }

    /// Latest pending operation on `key`.
    pub(crate) fn pending(&self, key: &[u8]) -> Option<&Operation> {
        self.log
            .iter()
            .rev()
            .map(|pending| &pending.operation)
            .find(|operation| operation.key.as_ref() == key)
    }

    pub(crate) fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.log.iter().map(|pending| &pending.operation)
    }

    pub(crate) fn pending_bytes(&self) -> usize {
        self.operations().map(Operation::payload_size).sum()
    }

    /// Drops every operation logged at or after `marker`.
    pub(crate) fn truncate_from(&mut self, marker: u64) {
        let keep = self.log.partition_point(|pending| pending.log_seq < marker);
        self.log.truncate(keep);
    }

    /// Moves the pending log into the applied counters.
    pub(crate) fn mark_applied(&mut self) {
        self.applied_puts = self.num_puts();
        self.applied_deletes = self.num_deletes();
        self.log.clear();
    }

    pub(crate) fn discard_log(&mut self) {
        self.log.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mctx_storage::{LockMode, LockTable};

    const COL: CollectionId = CollectionId(1);
    const OWNER: TransactionId = TransactionId(1);
    const TOP: NestingLevel = NestingLevel::TOP;

    #[test]
    fn request_only_upgrades() {
        let mut lock = CollectionLock::new(COL, AccessMode::Write, TOP);
        assert!(!lock.request(AccessMode::Read, TOP));
        assert_eq!(lock.requested_access(), AccessMode::Write);
        assert!(lock.request(AccessMode::Exclusive, TOP));
        assert_eq!(lock.requested_access(), AccessMode::Exclusive);
    }

    #[test]
    fn lock_is_idempotent() {
        let table = LockTable::new();
        let mut lock = CollectionLock::new(COL, AccessMode::Write, TOP);

        let first = lock.lock(TOP, OWNER, Some(&table), None).unwrap();
        let second = lock.lock(TOP, OWNER, Some(&table), None).unwrap();

        assert_eq!(first, LockOutcome::Acquired);
        assert_eq!(second, LockOutcome::AlreadyHeld);
        assert_eq!(lock.held_lock(), AccessMode::Write);
        assert_eq!(table.held_by(COL, OWNER), Some(LockMode::Shared));
    }

    #[test]
    fn upgrade_relocks_stronger() {
        let table = LockTable::new();
        let mut lock = CollectionLock::new(COL, AccessMode::Read, TOP);
        lock.lock(TOP, OWNER, Some(&table), None).unwrap();

        lock.request(AccessMode::Exclusive, TOP);
        let outcome = lock.lock(TOP, OWNER, Some(&table), None).unwrap();

        assert_eq!(outcome, LockOutcome::Acquired);
        assert_eq!(table.held_by(COL, OWNER), Some(LockMode::Exclusive));
    }

    #[test]
    fn disabled_backend_skips_native_lock() {
        let mut lock = CollectionLock::new(COL, AccessMode::Exclusive, TOP);
        let outcome = lock.lock(TOP, OWNER, None, None).unwrap();
        assert_eq!(outcome, LockOutcome::Skipped);
        assert_eq!(lock.held_lock(), AccessMode::Exclusive);
    }

    #[test]
    fn unlock_only_at_locking_level() {
        let table = LockTable::new();
        let inner = NestingLevel::new(1);
        let mut lock = CollectionLock::new(COL, AccessMode::Write, inner);
        lock.lock(inner, OWNER, Some(&table), None).unwrap();

        assert!(!lock.unlock(TOP, &table));
        assert_eq!(table.holder_count(COL), 1);

        assert!(lock.unlock(inner, &table));
        assert_eq!(lock.held_lock(), AccessMode::None);
        assert_eq!(table.holder_count(COL), 0);
    }

    #[test]
    fn outer_request_takes_over_lock() {
        let table = LockTable::new();
        let inner = NestingLevel::new(1);
        let mut lock = CollectionLock::new(COL, AccessMode::Write, inner);
        lock.lock(inner, OWNER, Some(&table), None).unwrap();

        lock.request(AccessMode::Read, TOP);

        assert_eq!(lock.registered_at(), TOP);
        assert!(!lock.unlock(inner, &table));
        assert!(lock.unlock(TOP, &table));
    }

    #[test]
    fn log_truncation_and_counters() {
        let mut lock = CollectionLock::new(COL, AccessMode::Write, TOP);
        lock.append(0, Operation::put("a", "1"));
        lock.append(1, Operation::delete("b"));
        lock.append(3, Operation::put("a", "2"));

        assert_eq!(lock.num_puts(), 2);
        assert_eq!(lock.num_deletes(), 1);
        assert_eq!(lock.pending(b"a").and_then(Operation::value).map(|v| &v[..]), Some(&b"2"[..]));

        lock.truncate_from(2);
        assert_eq!(lock.pending_operations(), 2);
        assert_eq!(lock.pending(b"a").and_then(Operation::value).map(|v| &v[..]), Some(&b"1"[..]));

        lock.mark_applied();
        assert!(!lock.has_pending_operations());
        assert_eq!(lock.num_puts(), 1);
        assert_eq!(lock.num_deletes(), 1);
    }
}
