//! In-memory MVCC storage engine.

use crate::backend::{LockBackend, Precondition, StorageEngine};
use crate::batch::{OperationKind, WriteBatch};
use crate::config::EngineConfig;
use crate::error::StorageResult;
use crate::history::WriteHistory;
use crate::lock::LockTable;
use crate::types::{CollectionId, SequenceNumber, Snapshot};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;

/// One committed version of a key. `None` marks a deletion.
#[derive(Debug, Clone)]
struct Version {
    sequence: SequenceNumber,
    value: Option<Bytes>,
}

#[derive(Debug)]
struct EngineState {
    /// Version chains, oldest first.
    data: HashMap<CollectionId, HashMap<Bytes, Vec<Version>>>,
    history: WriteHistory,
    latest: SequenceNumber,
    committed_batches: u64,
}

/// Point-in-time counters of an [`InMemoryEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineStats {
    /// Latest committed sequence.
    pub latest_sequence: SequenceNumber,
    /// Non-empty batches committed.
    pub committed_batches: u64,
    /// History tables sealed so far.
    pub sealed_tables: u64,
    /// History tables evicted so far.
    pub evicted_tables: u64,
    /// Sealed history tables currently retained.
    pub retained_tables: usize,
}

/// An in-memory storage engine with snapshot reads and conflict history.
///
/// This engine is suitable for:
/// - Unit and integration tests of the transaction layer
/// - Ephemeral stores that don't need persistence
///
/// Every key keeps its full version chain so snapshot reads at any past
/// sequence are served. Conflict history is bounded by [`EngineConfig`].
///
/// # Example
///
/// ```rust
/// use mctx_storage::{CollectionId, InMemoryEngine, Operation, StorageEngine, WriteBatch};
///
/// let engine = InMemoryEngine::new();
/// let users = CollectionId::new(1);
///
/// let mut batch = WriteBatch::new();
/// batch.push(users, Operation::put("alice", "admin"));
/// let seq = engine.write(batch).unwrap();
///
/// assert_eq!(engine.latest_sequence(), seq);
/// assert_eq!(engine.get(users, b"alice", None).unwrap().as_deref(), Some(&b"admin"[..]));
/// ```
#[derive(Debug)]
pub struct InMemoryEngine {
    config: EngineConfig,
    /// Serializes commits so preconditions see a stable history.
    commit_lock: Mutex<()>,
    state: RwLock<EngineState>,
    locks: LockTable,
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self::with_config(EngineConfig::default())
    }
}

impl InMemoryEngine {
    /// Creates an engine with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an engine with the given configuration.
    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        let history = WriteHistory::new(config.memtable_capacity, config.max_retained_memtables);
        Self {
            config,
            commit_lock: Mutex::new(()),
            state: RwLock::new(EngineState {
                data: HashMap::new(),
                history,
                latest: SequenceNumber::default(),
                committed_batches: 0,
            }),
            locks: LockTable::new(),
        }
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the native lock table.
    #[must_use]
    pub fn lock_table(&self) -> &LockTable {
        &self.locks
    }

    /// Seals the mutable history table, as a memtable flush would.
    pub fn flush_history(&self) {
        self.state.write().history.seal();
    }

    /// Returns current engine counters.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        let state = self.state.read();
        EngineStats {
            latest_sequence: state.latest,
            committed_batches: state.committed_batches,
            sealed_tables: state.history.sealed_total(),
            evicted_tables: state.history.evicted_total(),
            retained_tables: state.history.retained_tables(),
        }
    }

    /// Number of live keys in a collection at the latest sequence.
    #[must_use]
    pub fn live_keys(&self, collection: CollectionId) -> usize {
        self.state.read().data.get(&collection).map_or(0, |keys| {
            keys.values()
                .filter(|chain| chain.last().is_some_and(|v| v.value.is_some()))
                .count()
        })
    }
}

impl StorageEngine for InMemoryEngine {
    fn locks(&self) -> &dyn LockBackend {
        &self.locks
    }

    fn latest_sequence(&self) -> SequenceNumber {
        self.state.read().latest
    }

    fn get(
        &self,
        collection: CollectionId,
        key: &[u8],
        snapshot: Option<&Snapshot>,
    ) -> StorageResult<Option<Bytes>> {
        let state = self.state.read();
        let Some(chain) = state.data.get(&collection).and_then(|keys| keys.get(key)) else {
            return Ok(None);
        };

        let visible = match snapshot {
            Some(snapshot) => chain
                .iter()
                .rev()
                .find(|version| version.sequence <= snapshot.sequence()),
            None => chain.last(),
        };
        Ok(visible.and_then(|version| version.value.clone()))
    }

    fn has_committed_since(
        &self,
        collection: CollectionId,
        key: &[u8],
        since: SequenceNumber,
    ) -> StorageResult<bool> {
        self.state
            .read()
            .history
            .committed_since(collection, key, since)
    }

    fn apply_log(
        &self,
        batch: WriteBatch,
        precondition: &mut Precondition<'_>,
    ) -> StorageResult<SequenceNumber> {
        let _commit = self.commit_lock.lock();
        precondition()?;

        let mut state = self.state.write();
        if batch.is_empty() {
            return Ok(state.latest);
        }

        let sequence = state.latest.next();
        let EngineState { data, history, .. } = &mut *state;
        for (collection, operations) in batch.iter() {
            let keys = data.entry(collection).or_default();
            for operation in operations {
                let value = match &operation.kind {
                    OperationKind::Put(value) => Some(value.clone()),
                    OperationKind::Delete => None,
                };
                let chain = keys.entry(operation.key.clone()).or_default();
                match chain.last_mut() {
                    // Later operations of the same batch replace earlier ones.
                    Some(last) if last.sequence == sequence => last.value = value,
                    _ => chain.push(Version { sequence, value }),
                }
                history.record(collection, operation.key.clone(), sequence);
            }
        }
        history.maybe_seal();
        state.latest = sequence;
        state.committed_batches += 1;

        tracing::trace!(%sequence, operations = batch.len(), "applied write batch");
        Ok(sequence)
    }
}
