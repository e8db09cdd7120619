//! Access mode lattice.

use mctx_storage::LockMode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered permission level a transaction requests on a collection.
///
/// The order is total: `None < Read < Write < Exclusive`. Within one
/// transaction the access on a collection can only ever be upgraded.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    /// No access.
    #[default]
    None,
    /// Reads only.
    Read,
    /// Reads and optimistic writes; writers of a collection run concurrently.
    Write,
    /// Sole access to the collection.
    Exclusive,
}

impl AccessMode {
    /// Native lock mode backing this access mode, `None` for no access.
    ///
    /// Read and write access share the collection; conflicts between
    /// concurrent writers are detected at commit instead.
    #[must_use]
    pub const fn lock_mode(self) -> Option<LockMode> {
        match self {
            AccessMode::None => None,
            AccessMode::Read | AccessMode::Write => Some(LockMode::Shared),
            AccessMode::Exclusive => Some(LockMode::Exclusive),
        }
    }

    /// Returns true for `Write` and `Exclusive`.
    #[must_use]
    pub fn allows_writes(self) -> bool {
        self >= AccessMode::Write
    }

    /// Returns true if this mode satisfies a requirement of `required`.
    #[must_use]
    pub fn covers(self, required: AccessMode) -> bool {
        self >= required
    }

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            AccessMode::None => "none",
            AccessMode::Read => "read",
            AccessMode::Write => "write",
            AccessMode::Exclusive => "exclusive",
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
