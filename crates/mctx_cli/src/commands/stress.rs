//! Stress command implementation.

use mctx_core::{Config, StatsSnapshot, TransactionHints, TransactionManager};
use mctx_storage::InMemoryEngine;
use mctx_testkit::stress::{run_counter_stress, StressConfig, StressResult};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Options of the stress command.
#[derive(Debug)]
pub struct StressOptions {
    /// Worker threads.
    pub threads: usize,
    /// Increments per thread.
    pub ops: usize,
    /// Distinct counters.
    pub keys: usize,
    /// Retries per increment.
    pub max_retries: usize,
    /// Lock timeout in milliseconds.
    pub lock_timeout_ms: Option<u64>,
    /// Hint set as JSON.
    pub hints: Option<String>,
}

/// Engine counters after a run.
#[derive(Debug, Serialize)]
pub struct EngineSummary {
    /// Latest committed sequence.
    pub latest_sequence: u64,
    /// Batches committed.
    pub committed_batches: u64,
    /// History tables sealed.
    pub sealed_tables: u64,
    /// History tables evicted.
    pub evicted_tables: u64,
}

/// Full stress command output.
#[derive(Debug, Serialize)]
pub struct StressReport {
    /// Hints the workload ran with.
    pub hints: TransactionHints,
    /// Workload result.
    pub workload: StressResult,
    /// Engine counters.
    pub engine: EngineSummary,
}

/// Runs the counter workload. Returns true if no update was lost.
pub fn run(options: &StressOptions, format: &str) -> Result<bool, Box<dyn std::error::Error>> {
    let hints = match &options.hints {
        Some(json) => serde_json::from_str(json)
            .map_err(|e| format!("Invalid hints {json:?}: {e}"))?,
        None => TransactionHints::default(),
    };
    let config = Config::new().lock_timeout(options.lock_timeout_ms.map(Duration::from_millis));

    let engine = Arc::new(InMemoryEngine::new());
    let manager = Arc::new(TransactionManager::new(engine.clone(), config));
    let stress = StressConfig {
        threads: options.threads,
        operations: options.ops,
        keys: options.keys,
        max_retries: options.max_retries,
        hints,
        ..Default::default()
    };

    tracing::info!(
        threads = stress.threads,
        ops = stress.operations,
        keys = stress.keys,
        "starting stress run"
    );
    let workload = run_counter_stress(manager, &stress)?;

    let stats = engine.stats();
    let report = StressReport {
        hints,
        engine: EngineSummary {
            latest_sequence: stats.latest_sequence.as_u64(),
            committed_batches: stats.committed_batches,
            sealed_tables: stats.sealed_tables,
            evicted_tables: stats.evicted_tables,
        },
        workload,
    };
    let consistent = report.workload.is_consistent();
    if !consistent {
        tracing::warn!(lost = report.workload.lost_updates, "stress run lost updates");
    }

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_text_output(&report),
    }
    Ok(consistent)
}

fn print_text_output(report: &StressReport) {
    report.workload.print_summary("Counter stress");
    print_stats(&report.workload.stats);

    println!();
    println!("=== Engine ===");
    println!("Latest sequence: {}", report.engine.latest_sequence);
    println!("Committed batches: {}", report.engine.committed_batches);
    println!("Sealed history tables: {}", report.engine.sealed_tables);
    println!("Evicted history tables: {}", report.engine.evicted_tables);
}

fn print_stats(stats: &StatsSnapshot) {
    println!();
    println!("=== Transactions ===");
    println!("Started: {}", stats.transactions_started);
    println!("Committed: {}", stats.transactions_committed);
    println!("Aborted: {}", stats.transactions_aborted);
    println!("Conflicts (Busy): {}", stats.conflicts);
    println!("History unavailable (TryAgain): {}", stats.history_unavailable);
    println!("Lock timeouts: {}", stats.lock_timeouts);
}
