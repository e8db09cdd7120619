//! Transaction manager.

use crate::access::AccessMode;
use crate::config::{Config, TransactionHints};
use crate::error::CoreResult;
use crate::stats::TransactionStats;
use crate::transaction::facade::SingleCollectionTransaction;
use crate::transaction::state::Transaction;
use crate::types::{CollectionId, SequenceNumber, TransactionId};
use bytes::Bytes;
use mctx_storage::{InMemoryEngine, StorageEngine};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Bookkeeping shared between a manager and its transactions.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    pub(crate) stats: TransactionStats,
    active: RwLock<Vec<TransactionId>>,
}

impl Registry {
    pub(crate) fn started(&self, id: TransactionId) {
        self.active.write().push(id);
        self.stats.record_start();
    }

    pub(crate) fn finish(&self, id: TransactionId) {
        self.active.write().retain(|active| *active != id);
    }
}

/// Creates transactions over one storage engine.
///
/// The manager provides:
/// - Transaction ID allocation
/// - The shared [`Config`] every transaction runs with
/// - Statistics and the set of live transactions
/// - Non-transactional convenience reads and writes
///
/// Concurrency control is entirely optimistic except for the engine's
/// native collection locks: transactions on the same collection run in
/// parallel and the first committer of an overlapping key wins.
pub struct TransactionManager {
    engine: Arc<dyn StorageEngine>,
    config: Config,
    next_txid: AtomicU64,
    registry: Arc<Registry>,
}

impl TransactionManager {
    /// Creates a manager over `engine`.
    pub fn new(engine: Arc<dyn StorageEngine>, config: Config) -> Self {
        Self {
            engine,
            config,
            next_txid: AtomicU64::new(1),
            registry: Arc::new(Registry::default()),
        }
    }

    /// Creates a manager over a fresh [`InMemoryEngine`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryEngine::new()), Config::default())
    }

    /// Returns the storage engine.
    #[must_use]
    pub fn engine(&self) -> &Arc<dyn StorageEngine> {
        &self.engine
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns transaction statistics.
    #[must_use]
    pub fn stats(&self) -> &TransactionStats {
        &self.registry.stats
    }

    /// IDs of transactions that are created or running.
    #[must_use]
    pub fn active_transactions(&self) -> Vec<TransactionId> {
        self.registry.active.read().clone()
    }

    /// Creates a transaction in the `Created` state.
    ///
    /// Register collections, then call [`Transaction::begin`].
    #[must_use]
    pub fn create(&self, hints: TransactionHints) -> Transaction {
        let id = TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst));
        Transaction::new(
            id,
            Arc::clone(&self.engine),
            self.config.clone(),
            hints,
            Arc::clone(&self.registry),
        )
    }

    /// Creates a transaction, registers `collections` and begins it.
    ///
    /// # Errors
    ///
    /// Returns the lock error if a collection cannot be locked; the
    /// transaction is aborted and holds no locks.
    pub fn begin(
        &self,
        hints: TransactionHints,
        collections: &[(CollectionId, AccessMode)],
    ) -> CoreResult<Transaction> {
        let mut txn = self.create(hints);
        for &(collection, access) in collections {
            txn.register_collection(collection, access)?;
        }
        txn.begin()?;
        Ok(txn)
    }

    /// Begins a transaction confined to one collection.
    ///
    /// # Errors
    ///
    /// Same as [`TransactionManager::begin`].
    pub fn begin_single(
        &self,
        collection: CollectionId,
        access: AccessMode,
        hints: TransactionHints,
    ) -> CoreResult<SingleCollectionTransaction> {
        let txn = self.begin(hints, &[(collection, access)])?;
        Ok(SingleCollectionTransaction::new(txn, collection, access))
    }

    /// Runs `f` inside a transaction.
    ///
    /// Commits if `f` returns `Ok`, aborts if it returns `Err`. Conflicts
    /// are returned, not retried.
    ///
    /// # Errors
    ///
    /// Returns the error of `f`, of beginning, or of committing.
    pub fn transaction<F, T>(
        &self,
        hints: TransactionHints,
        collections: &[(CollectionId, AccessMode)],
        f: F,
    ) -> CoreResult<T>
    where
        F: FnOnce(&mut Transaction) -> CoreResult<T>,
    {
        let mut txn = self.begin(hints, collections)?;
        let value = f(&mut txn)?;
        if !txn.status().is_terminated() {
            txn.commit()?;
        }
        Ok(value)
    }

    /// Reads the latest committed value of `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot serve the read.
    pub fn get(&self, collection: CollectionId, key: &[u8]) -> CoreResult<Option<Bytes>> {
        Ok(self.engine.get(collection, key, None)?)
    }

    /// Writes one key in its own single-operation transaction.
    ///
    /// # Errors
    ///
    /// Returns `Busy` if the key was committed concurrently.
    pub fn put(
        &self,
        collection: CollectionId,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> CoreResult<SequenceNumber> {
        let mut txn = self.begin_single(collection, AccessMode::Write, Self::single_op())?;
        txn.put(key, value)?;
        txn.commit()
    }

    /// Deletes one key in its own single-operation transaction.
    ///
    /// # Errors
    ///
    /// Returns `Busy` if the key was committed concurrently.
    pub fn delete(
        &self,
        collection: CollectionId,
        key: impl Into<Bytes>,
    ) -> CoreResult<SequenceNumber> {
        let mut txn = self.begin_single(collection, AccessMode::Write, Self::single_op())?;
        txn.delete(key)?;
        txn.commit()
    }

    const fn single_op() -> TransactionHints {
        TransactionHints::new().single_operation(true)
    }
}

impl fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionManager")
            .field("config", &self.config)
            .field("next_txid", &self.next_txid)
            .field("active", &self.registry.active.read().len())
            .finish_non_exhaustive()
    }
}
