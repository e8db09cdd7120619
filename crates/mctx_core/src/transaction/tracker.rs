//! Keys tracked for commit-time conflict validation.

use crate::transaction::validator::ConflictKey;
use crate::types::{CollectionId, SequenceNumber};
use bytes::Bytes;
use std::collections::HashMap;

/// Why a key is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AccessKind {
    ReadForUpdate,
    Write,
}

#[derive(Debug, Clone)]
struct TrackedAccess {
    log_seq: u64,
    collection: CollectionId,
    key: Bytes,
    kind: AccessKind,
    since: SequenceNumber,
    /// Log position of the undo that stopped tracking this read.
    undone_at: Option<u64>,
}

/// Ordered record of read-for-update and write accesses.
#[derive(Debug, Default)]
pub(crate) struct KeyTracker {
    entries: Vec<TrackedAccess>,
}

impl KeyTracker {
    pub(crate) fn track(
        &mut self,
        log_seq: u64,
        collection: CollectionId,
        key: Bytes,
        kind: AccessKind,
        since: SequenceNumber,
    ) {
        self.entries.push(TrackedAccess {
            log_seq,
            collection,
            key,
            kind,
            since,
            undone_at: None,
        });
    }

    /// Undoes the most recent live read-for-update of `key`, if any, as of
    /// log position `log_seq`.
    pub(crate) fn untrack_read(
        &mut self,
        log_seq: u64,
        collection: CollectionId,
        key: &[u8],
    ) -> bool {
        let found = self.entries.iter_mut().rev().find(|entry| {
            entry.kind == AccessKind::ReadForUpdate
                && entry.undone_at.is_none()
                && entry.collection == collection
                && entry.key.as_ref() == key
        });
        match found {
            Some(entry) => {
                entry.undone_at = Some(log_seq);
                true
            }
            None => false,
        }
    }

    /// Drops every access tracked at or after `marker` and revives reads
    /// undone at or after it.
    pub(crate) fn truncate_from(&mut self, marker: u64) {
        let keep = self.entries.partition_point(|entry| entry.log_seq < marker);
        self.entries.truncate(keep);
        for entry in &mut self.entries {
            if entry.undone_at.is_some_and(|at| at >= marker) {
                entry.undone_at = None;
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    /// True if no access is tracked for validation.
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.iter().all(|entry| entry.undone_at.is_some())
    }

    /// Number of distinct tracked keys.
    pub(crate) fn num_keys(&self) -> usize {
        self.conflict_keys().len()
    }

    /// Distinct keys in first-tracked order, each with the oldest reference
    /// sequence it was tracked under.
    pub(crate) fn conflict_keys(&self) -> Vec<ConflictKey> {
        let mut index: HashMap<(CollectionId, &[u8]), usize> = HashMap::new();
        let mut keys: Vec<ConflictKey> = Vec::new();
        for entry in self.entries.iter().filter(|entry| entry.undone_at.is_none()) {
            match index.get(&(entry.collection, entry.key.as_ref())) {
                Some(&at) => keys[at].since = keys[at].since.min(entry.since),
                None => {
                    index.insert((entry.collection, entry.key.as_ref()), keys.len());
                    keys.push(ConflictKey {
                        collection: entry.collection,
                        key: entry.key.clone(),
                        since: entry.since,
                    });
                }
            }
        }
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COL: CollectionId = CollectionId(1);

    fn seq(n: u64) -> SequenceNumber {
        SequenceNumber::new(n)
    }

    #[test]
    fn keys_are_distinct_and_ordered() {
        let mut tracker = KeyTracker::default();
        tracker.track(0, COL, Bytes::from("b"), AccessKind::Write, seq(4));
        tracker.track(1, COL, Bytes::from("a"), AccessKind::ReadForUpdate, seq(2));
        tracker.track(2, COL, Bytes::from("b"), AccessKind::ReadForUpdate, seq(1));

        let keys = tracker.conflict_keys();
        assert_eq!(tracker.num_keys(), 2);
        assert_eq!(keys[0].key, Bytes::from("b"));
        assert_eq!(keys[0].since, seq(1));
        assert_eq!(keys[1].key, Bytes::from("a"));
    }

    #[test]
    fn untrack_removes_latest_read_only() {
        let mut tracker = KeyTracker::default();
        tracker.track(0, COL, Bytes::from("a"), AccessKind::ReadForUpdate, seq(0));
        tracker.track(1, COL, Bytes::from("a"), AccessKind::ReadForUpdate, seq(0));
        tracker.track(2, COL, Bytes::from("w"), AccessKind::Write, seq(0));

        assert!(tracker.untrack_read(3, COL, b"a"));
        assert!(tracker.untrack_read(4, COL, b"a"));
        assert!(!tracker.untrack_read(5, COL, b"a"));
        assert!(!tracker.untrack_read(6, COL, b"w"));
        assert_eq!(tracker.num_keys(), 1);
    }

    #[test]
    fn truncation_revives_later_undo() {
        let mut tracker = KeyTracker::default();
        tracker.track(0, COL, Bytes::from("a"), AccessKind::ReadForUpdate, seq(3));
        assert!(tracker.untrack_read(2, COL, b"a"));
        assert!(tracker.is_empty());

        tracker.truncate_from(1);
        assert_eq!(tracker.num_keys(), 1);
        assert_eq!(tracker.conflict_keys()[0].since, seq(3));

        assert!(tracker.untrack_read(4, COL, b"a"));
        tracker.truncate_from(5);
        assert!(tracker.is_empty());
    }

    #[test]
    fn truncate_drops_later_accesses() {
        let mut tracker = KeyTracker::default();
        tracker.track(0, COL, Bytes::from("a"), AccessKind::Write, seq(0));
        tracker.track(5, COL, Bytes::from("b"), AccessKind::ReadForUpdate, seq(0));

        tracker.truncate_from(3);
        assert_eq!(tracker.num_keys(), 1);

        tracker.clear();
        assert!(tracker.is_empty());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;
        use std::collections::BTreeMap;

        proptest! {
            #[test]
            fn each_key_keeps_its_oldest_reference(
                accesses in prop::collection::vec((0u8..4, 0u64..10), 0..32),
            ) {
                let mut tracker = KeyTracker::default();
                let mut expected: BTreeMap<u8, u64> = BTreeMap::new();
                for (log_seq, (key, since)) in accesses.iter().enumerate() {
                    tracker.track(
                        log_seq as u64,
                        COL,
                        Bytes::copy_from_slice(&[*key]),
                        AccessKind::Write,
                        seq(*since),
                    );
                    let min = expected.entry(*key).or_insert(*since);
                    *min = (*min).min(*since);
                }

                let keys = tracker.conflict_keys();
                prop_assert_eq!(keys.len(), expected.len());
                for key in keys {
                    prop_assert_eq!(Some(&key.since.as_u64()), expected.get(&key.key[0]));
                }
            }

            #[test]
            fn truncation_matches_prefix(len in 0usize..20, marker in 0u64..24) {
                let mut tracker = KeyTracker::default();
                let mut prefix = KeyTracker::default();
                for log_seq in 0..len as u64 {
                    let key = Bytes::from(format!("k{log_seq}"));
                    tracker.track(log_seq, COL, key.clone(), AccessKind::ReadForUpdate, seq(0));
                    if log_seq < marker {
                        prefix.track(log_seq, COL, key, AccessKind::ReadForUpdate, seq(0));
                    }
                }

                tracker.truncate_from(marker);
                prop_assert_eq!(tracker.conflict_keys(), prefix.conflict_keys());
            }
        }
    }
}
