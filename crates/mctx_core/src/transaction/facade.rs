//! Single-collection convenience wrapper.

use crate::access::AccessMode;
use crate::error::{CoreError, CoreResult};
use crate::transaction::savepoint::SavepointMarker;
use crate::transaction::state::{Transaction, TransactionStatus};
use crate::types::{CollectionId, SequenceNumber, Snapshot, TransactionId};
use bytes::Bytes;

/// A transaction fixed to one collection at one access mode.
///
/// Operations take no collection argument. Registering any other
/// collection, or the same one at a stronger mode, is `Forbidden`.
#[derive(Debug)]
pub struct SingleCollectionTransaction {
    inner: Transaction,
    collection: CollectionId,
    access: AccessMode,
}

impl SingleCollectionTransaction {
    pub(crate) fn new(inner: Transaction, collection: CollectionId, access: AccessMode) -> Self {
        Self {
            inner,
            collection,
            access,
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.inner.id()
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> TransactionStatus {
        self.inner.status()
    }

    /// The collection this transaction is confined to.
    #[must_use]
    pub fn collection(&self) -> CollectionId {
        self.collection
    }

    /// The access mode fixed at construction.
    #[must_use]
    pub fn access_mode(&self) -> AccessMode {
        self.access
    }

    /// Accepts only the wrapped collection at or below the fixed mode.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` for any other registration.
    pub fn register_collection(
        &mut self,
        collection: CollectionId,
        access: AccessMode,
    ) -> CoreResult<()> {
        if collection != self.collection {
            return Err(CoreError::forbidden(format!(
                "{} is confined to {}, cannot add {collection}",
                self.inner.id(),
                self.collection
            )));
        }
        if access > self.access {
            return Err(CoreError::forbidden(format!(
                "{} is fixed at {} access, {access} requested",
                self.inner.id(),
                self.access
            )));
        }
        Ok(())
    }

    /// See [`Transaction::get`].
    ///
    /// # Errors
    ///
    /// Same as [`Transaction::get`].
    pub fn get(&mut self, key: &[u8]) -> CoreResult<Option<Bytes>> {
        self.inner.get(self.collection, key)
    }

    /// See [`Transaction::get_for_update`].
    ///
    /// # Errors
    ///
    /// Same as [`Transaction::get_for_update`].
    pub fn get_for_update(&mut self, key: &[u8]) -> CoreResult<Option<Bytes>> {
        self.inner.get_for_update(self.collection, key)
    }

    /// See [`Transaction::undo_get_for_update`].
    ///
    /// # Errors
    ///
    /// Same as [`Transaction::undo_get_for_update`].
    pub fn undo_get_for_update(&mut self, key: &[u8]) -> CoreResult<()> {
        self.inner.undo_get_for_update(self.collection, key)
    }

    /// See [`Transaction::put`].
    ///
    /// # Errors
    ///
    /// Same as [`Transaction::put`].
    pub fn put(&mut self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> CoreResult<()> {
        self.inner.put(self.collection, key, value)
    }

    /// See [`Transaction::delete`].
    ///
    /// # Errors
    ///
    /// Same as [`Transaction::delete`].
    pub fn delete(&mut self, key: impl Into<Bytes>) -> CoreResult<()> {
        self.inner.delete(self.collection, key)
    }

    /// See [`Transaction::set_snapshot`].
    ///
    /// # Errors
    ///
    /// Same as [`Transaction::set_snapshot`].
    pub fn set_snapshot(&mut self) -> CoreResult<Snapshot> {
        self.inner.set_snapshot()
    }

    /// See [`Transaction::set_savepoint`].
    ///
    /// # Errors
    ///
    /// Same as [`Transaction::set_savepoint`].
    pub fn set_savepoint(&mut self) -> CoreResult<SavepointMarker> {
        self.inner.set_savepoint()
    }

    /// See [`Transaction::rollback_to_savepoint`].
    ///
    /// # Errors
    ///
    /// Same as [`Transaction::rollback_to_savepoint`].
    pub fn rollback_to_savepoint(&mut self) -> CoreResult<()> {
        self.inner.rollback_to_savepoint()
    }

    /// See [`Transaction::commit`].
    ///
    /// # Errors
    ///
    /// Same as [`Transaction::commit`].
    pub fn commit(&mut self) -> CoreResult<SequenceNumber> {
        self.inner.commit()
    }

    /// See [`Transaction::abort`].
    ///
    /// # Errors
    ///
    /// Same as [`Transaction::abort`].
    pub fn abort(&mut self) -> CoreResult<()> {
        self.inner.abort()
    }

    /// Alias for [`SingleCollectionTransaction::abort`].
    ///
    /// # Errors
    ///
    /// Same as [`Transaction::abort`].
    pub fn rollback(&mut self) -> CoreResult<()> {
        self.inner.rollback()
    }

    /// Number of distinct keys tracked for validation.
    #[must_use]
    pub fn num_keys(&self) -> usize {
        self.inner.num_keys()
    }

    /// The wrapped transaction.
    #[must_use]
    pub fn as_transaction(&self) -> &Transaction {
        &self.inner
    }

    /// Unwraps into the general transaction.
    #[must_use]
    pub fn into_inner(self) -> Transaction {
        self.inner
    }
}
