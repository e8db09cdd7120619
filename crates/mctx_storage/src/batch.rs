//! Write batches handed to the engine at commit time.

use crate::types::CollectionId;
use bytes::Bytes;

/// The effect of a single logged operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    /// Insert or replace the value.
    Put(Bytes),
    /// Remove the key.
    Delete,
}

/// One keyed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// Target key.
    pub key: Bytes,
    /// What happens to it.
    pub kind: OperationKind,
}

impl Operation {
    /// Creates a put operation.
    pub fn put(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            kind: OperationKind::Put(value.into()),
        }
    }

    /// Creates a delete operation.
    pub fn delete(key: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            kind: OperationKind::Delete,
        }
    }

    /// Returns the value written by this operation, `None` for deletes.
    #[must_use]
    pub fn value(&self) -> Option<&Bytes> {
        match &self.kind {
            OperationKind::Put(value) => Some(value),
            OperationKind::Delete => None,
        }
    }

    /// Approximate payload size in bytes.
    #[must_use]
    pub fn payload_size(&self) -> usize {
        self.key.len() + self.value().map_or(0, Bytes::len)
    }
}

/// Ordered per-collection operation lists applied as one atomic unit.
///
/// Operations on the same key are applied in order, so the last one wins.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    collections: Vec<(CollectionId, Vec<Operation>)>,
}

impl WriteBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the operation log of one collection.
    ///
    /// Empty logs are ignored.
    pub fn push_collection(&mut self, collection: CollectionId, operations: Vec<Operation>) {
        if operations.is_empty() {
            return;
        }
        match self.collections.iter_mut().find(|(c, _)| *c == collection) {
            Some((_, existing)) => existing.extend(operations),
            None => self.collections.push((collection, operations)),
        }
    }

    /// Appends a single operation.
    pub fn push(&mut self, collection: CollectionId, operation: Operation) {
        self.push_collection(collection, vec![operation]);
    }

    /// Returns true if no operation is contained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Total number of operations across collections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.collections.iter().map(|(_, ops)| ops.len()).sum()
    }

    /// Iterates collections in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (CollectionId, &[Operation])> {
        self.collections.iter().map(|(c, ops)| (*c, ops.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_merges_same_collection() {
        let mut batch = WriteBatch::new();
        batch.push(CollectionId::new(1), Operation::put("a", "1"));
        batch.push(CollectionId::new(2), Operation::delete("b"));
        batch.push(CollectionId::new(1), Operation::put("c", "3"));

        assert_eq!(batch.len(), 3);
        let collections: Vec<_> = batch.iter().map(|(c, ops)| (c, ops.len())).collect();
        assert_eq!(
            collections,
            vec![(CollectionId::new(1), 2), (CollectionId::new(2), 1)]
        );
    }

    #[test]
    fn empty_logs_are_skipped() {
        let mut batch = WriteBatch::new();
        batch.push_collection(CollectionId::new(1), Vec::new());
        assert!(batch.is_empty());
    }

    #[test]
    fn payload_size_counts_key_and_value() {
        assert_eq!(Operation::put("key", "value").payload_size(), 8);
        assert_eq!(Operation::delete("key").payload_size(), 3);
    }
}
