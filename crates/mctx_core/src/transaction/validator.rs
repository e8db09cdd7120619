//! Optimistic conflict validation.

use crate::error::CoreResult;
use crate::types::{CollectionId, SequenceNumber};
use bytes::Bytes;
use mctx_storage::StorageEngine;

/// A key to validate and the sequence it must not have been written after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictKey {
    /// Collection of the key.
    pub collection: CollectionId,
    /// The key.
    pub key: Bytes,
    /// Commits above this sequence conflict.
    pub since: SequenceNumber,
}

/// Outcome of a validation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// No conflicting commit was found.
    Clean,
    /// The first conflicting key found.
    Conflict(ConflictKey),
}

impl Validation {
    /// Returns true for [`Validation::Clean`].
    #[must_use]
    pub fn is_clean(&self) -> bool {
        matches!(self, Validation::Clean)
    }
}

/// Checks tracked keys against the engine's commit history.
///
/// The validator only reads. It stops at the first conflicting key. A
/// question that needs evicted history fails with `TryAgain` instead of
/// being answered as "no conflict".
#[derive(Clone, Copy)]
pub struct ConflictValidator<'a> {
    engine: &'a dyn StorageEngine,
}

impl<'a> ConflictValidator<'a> {
    /// Creates a validator over `engine`.
    pub fn new(engine: &'a dyn StorageEngine) -> Self {
        Self { engine }
    }

    /// Validates keys in order.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::TryAgain` if required history was evicted.
    pub fn validate<'k>(
        &self,
        keys: impl IntoIterator<Item = &'k ConflictKey>,
    ) -> CoreResult<Validation> {
        let latest = self.engine.latest_sequence();
        for key in keys {
            if key.since >= latest {
                continue;
            }
            let changed = self
                .engine
                .has_committed_since(key.collection, &key.key, key.since)?;
            tracing::trace!(collection = %key.collection, since = %key.since, changed, "validated key");
            if changed {
                return Ok(Validation::Conflict(key.clone()));
            }
        }
        Ok(Validation::Clean)
    }

    /// Validates read-for-update and written keys against one snapshot.
    ///
    /// Reads are checked before writes.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::TryAgain` if required history was evicted.
    pub fn check(
        &self,
        snapshot: SequenceNumber,
        reads: &[(CollectionId, Bytes)],
        writes: &[(CollectionId, Bytes)],
    ) -> CoreResult<Validation> {
        let keys: Vec<ConflictKey> = reads
            .iter()
            .chain(writes)
            .map(|(collection, key)| ConflictKey {
                collection: *collection,
                key: key.clone(),
                since: snapshot,
            })
            .collect();
        self.validate(&keys)
    }
}

impl std::fmt::Debug for ConflictValidator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConflictValidator")
            .field("latest", &self.engine.latest_sequence())
            .finish()
    }
}
