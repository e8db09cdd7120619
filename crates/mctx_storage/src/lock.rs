//! Owner-aware native collection lock table.

use crate::backend::LockBackend;
use crate::error::{StorageError, StorageResult};
use crate::types::{CollectionId, LockHandle, LockMode, TransactionId};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Collection locks keyed by collection, then by owner.
///
/// Waiters block on a single condition variable that is notified whenever
/// a holding is released.
#[derive(Debug, Default)]
pub struct LockTable {
    holders: Mutex<HashMap<CollectionId, HashMap<TransactionId, LockMode>>>,
    released: Condvar,
}

impl LockTable {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the mode `owner` holds on `collection`, if any.
    #[must_use]
    pub fn held_by(&self, collection: CollectionId, owner: TransactionId) -> Option<LockMode> {
        self.holders
            .lock()
            .get(&collection)
            .and_then(|owners| owners.get(&owner).copied())
    }

    /// Returns the number of owners currently holding `collection`.
    #[must_use]
    pub fn holder_count(&self, collection: CollectionId) -> usize {
        self.holders.lock().get(&collection).map_or(0, HashMap::len)
    }

    fn grantable(
        owners: Option<&HashMap<TransactionId, LockMode>>,
        owner: TransactionId,
        mode: LockMode,
    ) -> bool {
        owners.map_or(true, |owners| {
            owners
                .iter()
                .filter(|(holder, _)| **holder != owner)
                .all(|(_, held)| mode.is_compatible_with(*held))
        })
    }
}

impl LockBackend for LockTable {
    fn acquire_lock(
        &self,
        collection: CollectionId,
        owner: TransactionId,
        mode: LockMode,
        timeout: Option<Duration>,
    ) -> StorageResult<LockHandle> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut holders = self.holders.lock();

        while !Self::grantable(holders.get(&collection), owner, mode) {
            match deadline {
                None => self.released.wait(&mut holders),
                Some(deadline) => {
                    let timed_out = self.released.wait_until(&mut holders, deadline).timed_out();
                    if timed_out && !Self::grantable(holders.get(&collection), owner, mode) {
                        tracing::debug!(%collection, %owner, %mode, "lock wait timed out");
                        return Err(StorageError::LockTimeout { collection, mode });
                    }
                }
            }
        }

        let held = holders
            .entry(collection)
            .or_default()
            .entry(owner)
            .or_insert(mode);
        *held = (*held).max(mode);
        let granted = *held;
        tracing::trace!(%collection, %owner, mode = %granted, "lock granted");

        Ok(LockHandle {
            collection,
            owner,
            mode: granted,
        })
    }

    fn release_lock(&self, handle: LockHandle) {
        let mut holders = self.holders.lock();
        let removed = holders
            .get_mut(&handle.collection)
            .is_some_and(|owners| owners.remove(&handle.owner).is_some());
        if holders
            .get(&handle.collection)
            .is_some_and(HashMap::is_empty)
        {
            holders.remove(&handle.collection);
        }
        drop(holders);

        if removed {
            tracing::trace!(collection = %handle.collection, owner = %handle.owner, "lock released");
            self.released.notify_all();
        } else {
            tracing::debug!(
                collection = %handle.collection,
                owner = %handle.owner,
                "release of a lock that is not held"
            );
        }
    }
}
