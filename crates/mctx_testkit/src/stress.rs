//! Stress tests for mctx.
//!
//! A read-modify-write counter workload run from many threads. Every
//! increment reads the counter for update, writes it back incremented and
//! commits, retrying the whole transaction on retryable errors. With
//! correct conflict detection the final counter total equals the number of
//! committed increments.

use crate::fixtures::DEFAULT_COLLECTION;
use mctx_core::{
    AccessMode, CollectionId, CoreError, CoreResult, StatsSnapshot, TransactionHints,
    TransactionManager,
};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Configuration for the counter workload.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Concurrent threads.
    pub threads: usize,
    /// Increments attempted per thread.
    pub operations: usize,
    /// Distinct counters; fewer keys mean more conflicts.
    pub keys: usize,
    /// Retries per increment before it counts as failed.
    pub max_retries: usize,
    /// Hints every workload transaction runs with.
    pub hints: TransactionHints,
    /// Collection holding the counters.
    pub collection: CollectionId,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            operations: 1_000,
            keys: 16,
            max_retries: 1_000,
            hints: TransactionHints::default(),
            collection: DEFAULT_COLLECTION,
        }
    }
}

/// Result of a stress run.
#[derive(Debug, Clone, Serialize)]
pub struct StressResult {
    /// Increments committed.
    pub committed: u64,
    /// Attempts rejected with a retryable error and retried.
    pub retries: u64,
    /// Increments given up on.
    pub failed: u64,
    /// Sum of all counters after the run.
    pub final_total: u64,
    /// Committed increments missing from the counters.
    pub lost_updates: u64,
    /// Wall-clock duration.
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    /// Committed increments per second.
    pub ops_per_second: f64,
    /// Manager statistics after the run.
    pub stats: StatsSnapshot,
}

impl StressResult {
    /// Returns true if every committed increment is reflected in the counters.
    pub fn is_consistent(&self) -> bool {
        self.lost_updates == 0 && self.final_total == self.committed
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Committed: {}", self.committed);
        println!("Retries: {}", self.retries);
        println!("Failed: {}", self.failed);
        println!("Final total: {}", self.final_total);
        println!("Lost updates: {}", self.lost_updates);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} commits/sec", self.ops_per_second);
    }
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u128(duration.as_millis())
    }
}

/// Key of counter `index`.
pub fn counter_key(index: usize) -> String {
    format!("counter-{index:04}")
}

/// Performs one increment of `key` in its own transaction.
///
/// # Errors
///
/// Returns whatever the transaction returned; nothing is retried here.
pub fn increment(
    manager: &TransactionManager,
    collection: CollectionId,
    key: &str,
    hints: TransactionHints,
) -> CoreResult<u64> {
    manager.transaction(hints, &[(collection, AccessMode::Write)], |txn| {
        let current = txn
            .get_for_update(collection, key.as_bytes())?
            .map(|bytes| parse_counter(&bytes))
            .transpose()?
            .unwrap_or(0);
        let next = current + 1;
        txn.put(collection, key.to_string(), next.to_string())?;
        Ok(next)
    })
}

fn parse_counter(bytes: &[u8]) -> CoreResult<u64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| CoreError::internal(format!("corrupt counter value {bytes:?}")))
}

/// Sums every counter as currently committed.
///
/// # Errors
///
/// Returns an error if a counter cannot be read or parsed.
pub fn counter_total(
    manager: &TransactionManager,
    collection: CollectionId,
    keys: usize,
) -> CoreResult<u64> {
    let mut total = 0;
    for index in 0..keys {
        if let Some(bytes) = manager.get(collection, counter_key(index).as_bytes())? {
            total += parse_counter(&bytes)?;
        }
    }
    Ok(total)
}

/// Runs the counter workload and checks for lost updates.
///
/// # Errors
///
/// Returns an error if the final counters cannot be read.
pub fn run_counter_stress(
    manager: Arc<TransactionManager>,
    config: &StressConfig,
) -> CoreResult<StressResult> {
    let keys = config.keys.max(1);
    let committed = Arc::new(AtomicU64::new(0));
    let retries = Arc::new(AtomicU64::new(0));
    let failed = Arc::new(AtomicU64::new(0));
    let baseline = counter_total(&manager, config.collection, keys)?;

    let start = Instant::now();
    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let manager = Arc::clone(&manager);
            let committed = Arc::clone(&committed);
            let retries = Arc::clone(&retries);
            let failed = Arc::clone(&failed);
            let config = config.clone();

            thread::spawn(move || {
                for i in 0..config.operations {
                    let key = counter_key((t * 31 + i * 7) % keys);
                    let mut attempts = 0;
                    loop {
                        match increment(&manager, config.collection, &key, config.hints) {
                            Ok(_) => {
                                committed.fetch_add(1, Ordering::Relaxed);
                                break;
                            }
                            Err(err) if err.is_retryable() && attempts < config.max_retries => {
                                attempts += 1;
                                retries.fetch_add(1, Ordering::Relaxed);
                                thread::yield_now();
                            }
                            Err(err) => {
                                tracing::warn!(%key, error = %err, "increment failed");
                                failed.fetch_add(1, Ordering::Relaxed);
                                break;
                            }
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }
    let duration = start.elapsed();

    let committed = committed.load(Ordering::Relaxed);
    let final_total = counter_total(&manager, config.collection, keys)? - baseline;
    let ops_per_second = if duration.as_secs_f64() > 0.0 {
        committed as f64 / duration.as_secs_f64()
    } else {
        0.0
    };

    Ok(StressResult {
        committed,
        retries: retries.load(Ordering::Relaxed),
        failed: failed.load(Ordering::Relaxed),
        final_total,
        lost_updates: committed.saturating_sub(final_total),
        duration,
        ops_per_second,
        stats: manager.stats().snapshot(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_increments() {
        let manager = TransactionManager::in_memory();
        for expected in 1..=5 {
            let value = increment(&manager, DEFAULT_COLLECTION, "c", TransactionHints::default())
                .unwrap();
            assert_eq!(value, expected);
        }
    }

    #[test]
    fn single_thread_run_is_consistent() {
        let manager = Arc::new(TransactionManager::in_memory());
        let config = StressConfig {
            threads: 1,
            operations: 200,
            keys: 4,
            ..Default::default()
        };

        let result = run_counter_stress(manager, &config).unwrap();
        assert_eq!(result.committed, 200);
        assert_eq!(result.retries, 0);
        assert!(result.is_consistent());
    }

    #[test]
    fn contended_run_loses_nothing() {
        let manager = Arc::new(TransactionManager::in_memory());
        let config = StressConfig {
            threads: 4,
            operations: 200,
            keys: 2,
            ..Default::default()
        };

        let result = run_counter_stress(manager, &config).unwrap();
        assert_eq!(result.failed, 0);
        assert_eq!(result.committed, 800);
        assert!(result.is_consistent());
        let stats = &result.stats;
        assert_eq!(
            stats.conflicts + stats.history_unavailable + stats.lock_timeouts,
            result.retries
        );
    }
}
