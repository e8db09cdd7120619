//! Benchmark utilities.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use bytes::Bytes;
use mctx_core::CollectionId;
use mctx_storage::{InMemoryEngine, Operation, StorageEngine, WriteBatch};
use rand::Rng;

/// Collection every benchmark writes to.
pub const BENCH_COLLECTION: CollectionId = CollectionId(1);

/// Generate random value bytes of the specified size.
pub fn random_value(size: usize) -> Bytes {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen::<u8>()).collect::<Vec<_>>().into()
}

/// Key number `index`.
pub fn key(index: usize) -> Bytes {
    Bytes::from(format!("key-{index:08}"))
}

/// Generate `count` distinct keys.
pub fn generate_keys(count: usize) -> Vec<Bytes> {
    (0..count).map(key).collect()
}

/// Generate `count` keys disjoint from any [`generate_keys`] output.
pub fn absent_keys(count: usize) -> Vec<Bytes> {
    (0..count)
        .map(|index| Bytes::from(format!("absent-{index:08}")))
        .collect()
}

/// Commits one batch per key so every key has its own history entry.
pub fn populate(engine: &InMemoryEngine, keys: &[Bytes], value_size: usize) {
    for k in keys {
        let mut batch = WriteBatch::new();
        batch.push(BENCH_COLLECTION, Operation::put(k.clone(), random_value(value_size)));
        engine.write(batch).expect("Failed to populate engine");
    }
}
