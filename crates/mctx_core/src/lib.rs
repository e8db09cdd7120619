//! # mctx Core
//!
//! Multi-collection transaction engine for mctx.
//!
//! This crate provides:
//! - The [`AccessMode`] lattice and per-collection locking ([`CollectionLock`])
//! - Transactions with snapshot reads and optimistic commit-time validation
//! - Savepoints for partial rollback
//! - Nested re-entry into a running transaction
//! - A single-collection convenience wrapper
//!
//! Committed data, commit history and native locks live in a storage
//! engine implementing [`mctx_storage::StorageEngine`].
//!
//! ## Example
//!
//! ```rust
//! use mctx_core::{AccessMode, CollectionId, CoreError, TransactionHints, TransactionManager};
//!
//! let manager = TransactionManager::in_memory();
//! let accounts = CollectionId::new(1);
//! let hints = TransactionHints::default();
//!
//! let mut t1 = manager.begin(hints, &[(accounts, AccessMode::Write)]).unwrap();
//! let mut t2 = manager.begin(hints, &[(accounts, AccessMode::Write)]).unwrap();
//! t1.put(accounts, "alice", "10").unwrap();
//! t2.put(accounts, "alice", "20").unwrap();
//!
//! t1.commit().unwrap();
//! assert!(matches!(t2.commit(), Err(CoreError::Busy { .. })));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod access;
mod config;
mod error;
mod stats;
mod transaction;
mod types;

pub use access::AccessMode;
pub use config::{Config, TransactionHints};
pub use error::{CoreError, CoreResult};
pub use stats::{StatsSnapshot, TransactionStats};
pub use transaction::{
    CollectionLock, ConflictKey, ConflictValidator, LockOutcome, SavepointMarker, SavepointStack,
    SingleCollectionTransaction, Transaction, TransactionManager, TransactionStatus, Validation,
};
pub use types::{CollectionId, NestingLevel, SequenceNumber, Snapshot, TransactionId};

/// Version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
