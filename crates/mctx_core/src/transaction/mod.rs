//! Multi-collection transactions with savepoints.
//!
//! mctx transactions provide:
//! - **Atomicity**: all writes of a commit become visible at one sequence
//! - **Isolation**: optional snapshot reads; optimistic validation of keys
//!   read for update or written (first committer wins)
//! - **Partial rollback**: LIFO savepoints over the pending operation log
//! - **Collection locks**: per-collection access modes backed by the
//!   engine's native locks, re-entrant across nesting levels

mod collection;
mod facade;
mod manager;
mod savepoint;
mod state;
mod tracker;
mod validator;

pub use collection::{CollectionLock, LockOutcome};
pub use facade::SingleCollectionTransaction;
pub use manager::TransactionManager;
pub use savepoint::{SavepointMarker, SavepointStack};
pub use state::{Transaction, TransactionStatus};
pub use validator::{ConflictKey, ConflictValidator, Validation};
