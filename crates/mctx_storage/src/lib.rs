//! # mctx Storage
//!
//! The storage-engine side of the mctx transaction engine.
//!
//! The transaction layer never touches committed data directly. It consumes
//! a narrow interface from the engine:
//!
//! - native per-collection locks ([`LockBackend`])
//! - snapshots and snapshot reads
//! - commit history queries for optimistic conflict checks
//! - atomic application of a transaction's write log
//!
//! ## Available Engines
//!
//! - [`InMemoryEngine`] - MVCC version chains with bounded conflict history
//!
//! ## Example
//!
//! ```rust
//! use mctx_storage::{CollectionId, InMemoryEngine, Operation, StorageEngine, WriteBatch};
//!
//! let engine = InMemoryEngine::new();
//! let before = engine.take_snapshot();
//!
//! let mut batch = WriteBatch::new();
//! batch.push(CollectionId::new(1), Operation::put("k", "v"));
//! engine.write(batch).unwrap();
//!
//! assert!(engine
//!     .has_committed_since(CollectionId::new(1), b"k", before.sequence())
//!     .unwrap());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod batch;
mod config;
mod error;
mod history;
mod lock;
mod memory;
mod types;

pub use backend::{LockBackend, Precondition, StorageEngine};
pub use batch::{Operation, OperationKind, WriteBatch};
pub use config::EngineConfig;
pub use error::{StorageError, StorageResult};
pub use lock::LockTable;
pub use memory::{EngineStats, InMemoryEngine};
pub use types::{CollectionId, LockHandle, LockMode, SequenceNumber, Snapshot, TransactionId};
