//! Core type definitions for mctx.

pub use mctx_storage::{CollectionId, SequenceNumber, Snapshot, TransactionId};

use std::fmt;

/// Depth of re-entry into a running transaction.
///
/// Level 0 is the outermost caller. Nested sub-operations sharing the
/// transaction run at higher levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NestingLevel(pub u32);

impl NestingLevel {
    /// The outermost level.
    pub const TOP: Self = Self(0);

    /// Creates a nesting level.
    #[must_use]
    pub const fn new(level: u32) -> Self {
        Self(level)
    }

    /// Returns the raw level value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns true for level 0.
    #[must_use]
    pub const fn is_top(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for NestingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
