//! Value types shared between the storage engine and the transaction layer.

use std::fmt;

/// Unique identifier for a transaction.
///
/// Transaction IDs are monotonically increasing and never reused. The
/// storage engine uses them to identify lock owners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Sequence number for ordering commits.
///
/// Every committed batch receives exactly one sequence number; all of its
/// writes become visible together at that sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    /// Creates a new sequence number.
    #[must_use]
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// Returns the raw sequence value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next sequence number.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq:{}", self.0)
    }
}

/// Identifier for a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CollectionId(pub u32);

impl CollectionId {
    /// Creates a new collection ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "col:{}", self.0)
    }
}

/// Native lock mode understood by the engine's lock table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockMode {
    /// Compatible with other shared holders.
    Shared,
    /// Compatible with nothing held by another owner.
    Exclusive,
}

impl LockMode {
    /// Returns true if a holder in `self` mode can coexist with one in `other`.
    #[must_use]
    pub const fn is_compatible_with(self, other: LockMode) -> bool {
        matches!((self, other), (LockMode::Shared, LockMode::Shared))
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::Shared => f.write_str("shared"),
            LockMode::Exclusive => f.write_str("exclusive"),
        }
    }
}

/// Proof of a native lock held by one owner on one collection.
///
/// Handles are returned by `LockBackend::acquire_lock` and must be handed
/// back to `LockBackend::release_lock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockHandle {
    /// Locked collection.
    pub collection: CollectionId,
    /// Owning transaction.
    pub owner: TransactionId,
    /// Mode the owner holds after the acquisition.
    pub mode: LockMode,
}

/// A fixed point in the commit history.
///
/// Reads through a snapshot see exactly the batches committed with a
/// sequence number at or below `sequence`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Snapshot {
    sequence: SequenceNumber,
}

impl Snapshot {
    /// Creates a snapshot at the given sequence.
    #[must_use]
    pub const fn at(sequence: SequenceNumber) -> Self {
        Self { sequence }
    }

    /// Returns the snapshot sequence.
    #[must_use]
    pub const fn sequence(&self) -> SequenceNumber {
        self.sequence
    }
}
