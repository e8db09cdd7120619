//! Commit history retained for optimistic conflict checks.
//!
//! Every committed key is recorded with its commit sequence in a mutable
//! table. Once the table reaches its capacity it is sealed and kept as
//! immutable history; the oldest sealed tables are evicted beyond the
//! retention limit. A conflict query that would need evicted history is
//! answered with `HistoryUnavailable` instead of a possibly wrong `false`.

use crate::error::{StorageError, StorageResult};
use crate::types::{CollectionId, SequenceNumber};
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};

/// Latest commit sequence per key within one table.
#[derive(Debug, Default)]
struct HistoryTable {
    writes: HashMap<CollectionId, HashMap<Bytes, SequenceNumber>>,
    keys: usize,
    max_sequence: SequenceNumber,
}

impl HistoryTable {
    fn record(&mut self, collection: CollectionId, key: Bytes, sequence: SequenceNumber) {
        let previous = self
            .writes
            .entry(collection)
            .or_default()
            .insert(key, sequence);
        if previous.is_none() {
            self.keys += 1;
        }
        self.max_sequence = self.max_sequence.max(sequence);
    }

    fn latest(&self, collection: CollectionId, key: &[u8]) -> Option<SequenceNumber> {
        self.writes
            .get(&collection)
            .and_then(|keys| keys.get(key).copied())
    }

    fn is_empty(&self) -> bool {
        self.keys == 0
    }
}

/// Mutable plus retained immutable write history.
#[derive(Debug)]
pub(crate) struct WriteHistory {
    mutable: HistoryTable,
    /// Oldest first.
    sealed: VecDeque<HistoryTable>,
    evicted_through: SequenceNumber,
    capacity: usize,
    max_retained: usize,
    sealed_total: u64,
    evicted_total: u64,
}

impl WriteHistory {
    pub(crate) fn new(capacity: usize, max_retained: usize) -> Self {
        Self {
            mutable: HistoryTable::default(),
            sealed: VecDeque::new(),
            evicted_through: SequenceNumber::default(),
            capacity: capacity.max(1),
            max_retained,
            sealed_total: 0,
            evicted_total: 0,
        }
    }

    pub(crate) fn record(&mut self, collection: CollectionId, key: Bytes, sequence: SequenceNumber) {
        self.mutable.record(collection, key, sequence);
    }

    /// Seals the mutable table once it is full.
    pub(crate) fn maybe_seal(&mut self) {
        if self.mutable.keys >= self.capacity {
            self.seal();
        }
    }

    /// Seals the mutable table and evicts history beyond the retention limit.
    pub(crate) fn seal(&mut self) {
        if self.mutable.is_empty() {
            return;
        }
        let table = std::mem::take(&mut self.mutable);
        self.sealed.push_back(table);
        self.sealed_total += 1;

        while self.sealed.len() > self.max_retained {
            let Some(evicted) = self.sealed.pop_front() else {
                break;
            };
            self.evicted_through = self.evicted_through.max(evicted.max_sequence);
            self.evicted_total += 1;
            tracing::debug!(evicted_through = %self.evicted_through, "evicted write history table");
        }
    }

    /// Reports whether `key` was committed with a sequence above `since`.
    pub(crate) fn committed_since(
        &self,
        collection: CollectionId,
        key: &[u8],
        since: SequenceNumber,
    ) -> StorageResult<bool> {
        if self
            .mutable
            .latest(collection, key)
            .is_some_and(|seq| seq > since)
        {
            return Ok(true);
        }

        for table in self.sealed.iter().rev() {
            // Tables are ordered by sequence, so nothing older can be newer
            // than `since` either.
            if table.max_sequence <= since {
                return Ok(false);
            }
            if table
                .latest(collection, key)
                .is_some_and(|seq| seq > since)
            {
                return Ok(true);
            }
        }

        if since < self.evicted_through {
            return Err(StorageError::HistoryUnavailable {
                collection,
                since,
                evicted_through: self.evicted_through,
            });
        }
        Ok(false)
    }

    pub(crate) fn retained_tables(&self) -> usize {
        self.sealed.len()
    }

    pub(crate) fn sealed_total(&self) -> u64 {
        self.sealed_total
    }

    pub(crate) fn evicted_total(&self) -> u64 {
        self.evicted_total
    }

    pub(crate) fn evicted_through(&self) -> SequenceNumber {
        self.evicted_through
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const C: CollectionId = CollectionId(1);

    fn seq(n: u64) -> SequenceNumber {
        SequenceNumber::new(n)
    }

    #[test]
    fn mutable_table_answers_conflicts() {
        let mut history = WriteHistory::new(16, 2);
        history.record(C, Bytes::from_static(b"a"), seq(3));

        assert!(history.committed_since(C, b"a", seq(2)).unwrap());
        assert!(!history.committed_since(C, b"a", seq(3)).unwrap());
        assert!(!history.committed_since(C, b"b", seq(0)).unwrap());
        assert!(!history.committed_since(CollectionId::new(2), b"a", seq(0)).unwrap());
    }

    #[test]
    fn sealed_tables_are_still_consulted() {
        let mut history = WriteHistory::new(1, 2);
        history.record(C, Bytes::from_static(b"a"), seq(1));
        history.maybe_seal();
        history.record(C, Bytes::from_static(b"b"), seq(2));
        history.maybe_seal();

        assert_eq!(history.retained_tables(), 2);
        assert!(history.committed_since(C, b"a", seq(0)).unwrap());
        assert!(history.committed_since(C, b"b", seq(1)).unwrap());
    }

    #[test]
    fn evicted_history_is_reported() {
        let mut history = WriteHistory::new(1, 0);
        history.record(C, Bytes::from_static(b"a"), seq(1));
        history.maybe_seal();

        assert_eq!(history.evicted_through(), seq(1));
        assert_eq!(history.evicted_total(), 1);
        let result = history.committed_since(C, b"a", seq(0));
        assert!(matches!(result, Err(StorageError::HistoryUnavailable { .. })));

        // Nothing newer than the evicted range is needed here.
        assert!(!history.committed_since(C, b"a", seq(1)).unwrap());
    }

    #[test]
    fn old_tables_are_pruned_without_error() {
        let mut history = WriteHistory::new(1, 1);
        history.record(C, Bytes::from_static(b"a"), seq(1));
        history.maybe_seal();
        history.record(C, Bytes::from_static(b"b"), seq(2));
        history.maybe_seal();

        // Table holding seq 1 was evicted, but the retained table already
        // proves nothing relevant is missing for since = 2.
        assert!(!history.committed_since(C, b"a", seq(2)).unwrap());
        assert!(matches!(
            history.committed_since(C, b"a", seq(0)),
            Err(StorageError::HistoryUnavailable { .. })
        ));
    }

    #[test]
    fn sealing_an_empty_table_is_a_no_op() {
        let mut history = WriteHistory::new(4, 1);
        history.seal();
        assert_eq!(history.sealed_total(), 0);
    }
}
