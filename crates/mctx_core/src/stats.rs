//! Transaction statistics.
//!
//! Counters are shared by all transactions of one
//! [`TransactionManager`](crate::TransactionManager).
//!
//! # Usage
//!
//! ```rust
//! use mctx_core::TransactionManager;
//!
//! let manager = TransactionManager::in_memory();
//! let stats = manager.stats().snapshot();
//! assert_eq!(stats.transactions_committed, 0);
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Transaction statistics.
///
/// All counters are atomic and monotonically increasing, except the
/// `active` gauge.
#[derive(Debug, Default)]
pub struct TransactionStats {
    started: AtomicU64,
    committed: AtomicU64,
    aborted: AtomicU64,
    active: AtomicU64,

    conflicts: AtomicU64,
    history_unavailable: AtomicU64,
    lock_timeouts: AtomicU64,

    intermediate_commits: AtomicU64,
    savepoint_rollbacks: AtomicU64,
    operations_committed: AtomicU64,
}

impl TransactionStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_start(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self, operations: u64) {
        self.committed.fetch_add(1, Ordering::Relaxed);
        self.operations_committed
            .fetch_add(operations, Ordering::Relaxed);
        self.finish();
    }

    pub(crate) fn record_abort(&self) {
        self.aborted.fetch_add(1, Ordering::Relaxed);
        self.finish();
    }

    pub(crate) fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_history_unavailable(&self) {
        self.history_unavailable.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lock_timeout(&self) {
        self.lock_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_intermediate_commit(&self, operations: u64) {
        self.intermediate_commits.fetch_add(1, Ordering::Relaxed);
        self.operations_committed
            .fetch_add(operations, Ordering::Relaxed);
    }

    pub(crate) fn record_savepoint_rollback(&self) {
        self.savepoint_rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    fn finish(&self) {
        let _ = self
            .active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
    }

    /// Returns the total number of transactions started.
    pub fn transactions_started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }

    /// Returns the total number of transactions committed.
    pub fn transactions_committed(&self) -> u64 {
        self.committed.load(Ordering::Relaxed)
    }

    /// Returns the total number of transactions aborted.
    ///
    /// Includes transactions aborted by failed commits.
    pub fn transactions_aborted(&self) -> u64 {
        self.aborted.load(Ordering::Relaxed)
    }

    /// Returns the number of transactions started but not yet terminated.
    pub fn active_transactions(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    /// Returns the number of commits rejected with `Busy`.
    pub fn conflicts(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }

    /// Returns the number of commits rejected with `TryAgain`.
    pub fn history_unavailable(&self) -> u64 {
        self.history_unavailable.load(Ordering::Relaxed)
    }

    /// Returns the number of lock acquisitions that timed out.
    pub fn lock_timeouts(&self) -> u64 {
        self.lock_timeouts.load(Ordering::Relaxed)
    }

    /// Returns the number of intermediate commits.
    pub fn intermediate_commits(&self) -> u64 {
        self.intermediate_commits.load(Ordering::Relaxed)
    }

    /// Returns the number of savepoint rollbacks.
    pub fn savepoint_rollbacks(&self) -> u64 {
        self.savepoint_rollbacks.load(Ordering::Relaxed)
    }

    /// Returns the number of operations applied by commits.
    pub fn operations_committed(&self) -> u64 {
        self.operations_committed.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            transactions_started: self.transactions_started(),
            transactions_committed: self.transactions_committed(),
            transactions_aborted: self.transactions_aborted(),
            active_transactions: self.active_transactions(),
            conflicts: self.conflicts(),
            history_unavailable: self.history_unavailable(),
            lock_timeouts: self.lock_timeouts(),
            intermediate_commits: self.intermediate_commits(),
            savepoint_rollbacks: self.savepoint_rollbacks(),
            operations_committed: self.operations_committed(),
        }
    }
}

/// A point-in-time snapshot of transaction statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    /// Transactions started.
    pub transactions_started: u64,
    /// Transactions committed.
    pub transactions_committed: u64,
    /// Transactions aborted.
    pub transactions_aborted: u64,
    /// Transactions currently running or created.
    pub active_transactions: u64,
    /// Commits rejected with `Busy`.
    pub conflicts: u64,
    /// Commits rejected with `TryAgain`.
    pub history_unavailable: u64,
    /// Lock acquisitions that timed out.
    pub lock_timeouts: u64,
    /// Intermediate commits performed.
    pub intermediate_commits: u64,
    /// Savepoint rollbacks performed.
    pub savepoint_rollbacks: u64,
    /// Operations applied by commits and intermediate commits.
    pub operations_committed: u64,
}
