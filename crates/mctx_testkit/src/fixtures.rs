//! Test fixtures and engine helpers.
//!
//! Provides a transaction manager wired to an in-memory engine that tests
//! can still inspect directly (lock table, history, raw reads).

use bytes::Bytes;
use mctx_core::{CollectionId, Config, TransactionManager};
use mctx_storage::{EngineConfig, InMemoryEngine, Operation, StorageEngine, WriteBatch};
use std::sync::Arc;
use std::time::Duration;

/// The collection scenarios and stress runs use unless told otherwise.
pub const DEFAULT_COLLECTION: CollectionId = CollectionId(1);

/// A transaction manager over an inspectable in-memory engine.
pub struct TestEngine {
    /// The engine, shared with the manager.
    pub engine: Arc<InMemoryEngine>,
    /// The manager under test.
    pub manager: TransactionManager,
}

impl TestEngine {
    /// Creates a fixture with default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default(), Config::default())
    }

    /// Creates a fixture with explicit engine and manager configuration.
    pub fn with_config(engine_config: EngineConfig, config: Config) -> Self {
        let engine = Arc::new(InMemoryEngine::with_config(engine_config));
        let manager = TransactionManager::new(engine.clone(), config);
        Self { engine, manager }
    }

    /// Creates a fixture whose lock acquisition gives up after `timeout`.
    pub fn with_lock_timeout(timeout: Duration) -> Self {
        Self::with_config(
            EngineConfig::default(),
            Config::new().lock_timeout(Some(timeout)),
        )
    }

    /// Creates a fixture that keeps at most `retained` sealed history tables
    /// of `capacity` keys each.
    pub fn with_history(capacity: usize, retained: usize) -> Self {
        Self::with_config(
            EngineConfig::new()
                .memtable_capacity(capacity)
                .max_retained_memtables(retained),
            Config::default(),
        )
    }

    /// Commits `entries` into `collection` as one batch, bypassing transactions.
    pub fn seed(&self, collection: CollectionId, entries: &[(&str, &str)]) {
        let mut batch = WriteBatch::new();
        for (key, value) in entries {
            batch.push(collection, Operation::put(key.to_string(), value.to_string()));
        }
        self.engine.write(batch).expect("Failed to seed engine");
    }

    /// Latest committed value of `key` as a string.
    pub fn read(&self, collection: CollectionId, key: &str) -> Option<String> {
        self.engine
            .get(collection, key.as_bytes(), None)
            .expect("Failed to read engine")
            .map(|value| String::from_utf8_lossy(&value).into_owned())
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestEngine {
    type Target = TransactionManager;

    fn deref(&self) -> &Self::Target {
        &self.manager
    }
}

/// Runs `f` with a fresh in-memory fixture.
///
/// # Example
///
/// ```rust
/// use mctx_testkit::{with_test_engine, DEFAULT_COLLECTION};
///
/// with_test_engine(|fixture| {
///     fixture.put(DEFAULT_COLLECTION, "k", "v").unwrap();
///     assert_eq!(fixture.read(DEFAULT_COLLECTION, "k").as_deref(), Some("v"));
/// });
/// ```
pub fn with_test_engine<F, R>(f: F) -> R
where
    F: FnOnce(&TestEngine) -> R,
{
    let fixture = TestEngine::new();
    f(&fixture)
}

/// Decodes a value returned by a transaction read.
pub fn as_text(value: Option<Bytes>) -> Option<String> {
    value.map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}
