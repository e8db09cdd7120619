//! Scenarios command implementation.

use mctx_testkit::scenarios::{run_scenario, ScenarioReport, SCENARIOS};
use serde::Serialize;

/// A scenario as listed by `--list`.
#[derive(Debug, Serialize)]
pub struct ScenarioInfo {
    /// Scenario identifier.
    pub name: &'static str,
    /// What the scenario demonstrates.
    pub description: &'static str,
}

/// Summary of a scenarios run.
#[derive(Debug, Serialize)]
pub struct ScenariosResult {
    /// Scenarios run.
    pub total: usize,
    /// Scenarios that passed.
    pub passed: usize,
    /// Per-scenario reports.
    pub reports: Vec<ScenarioReport>,
}

/// Prints the available scenarios.
pub fn list(format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let scenarios: Vec<_> = SCENARIOS
        .iter()
        .map(|s| ScenarioInfo {
            name: s.name,
            description: s.description,
        })
        .collect();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&scenarios)?),
        _ => {
            for scenario in scenarios {
                println!("{:<22} {}", scenario.name, scenario.description);
            }
        }
    }
    Ok(())
}

/// Runs all scenarios, or only `name`. Returns true if every run passed.
pub fn run(name: Option<&str>, format: &str) -> Result<bool, Box<dyn std::error::Error>> {
    let selected: Vec<_> = SCENARIOS
        .iter()
        .filter(|s| name.map_or(true, |name| s.name == name))
        .collect();
    if selected.is_empty() {
        return Err(format!("Unknown scenario: {}", name.unwrap_or_default()).into());
    }

    let reports: Vec<ScenarioReport> = selected.into_iter().map(run_scenario).collect();
    let result = ScenariosResult {
        total: reports.len(),
        passed: reports.iter().filter(|r| r.passed).count(),
        reports,
    };
    tracing::info!(total = result.total, passed = result.passed, "scenarios finished");

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(result.passed == result.total)
}

fn print_text_output(result: &ScenariosResult) {
    println!("=== Scenarios ===");
    for report in &result.reports {
        let status = if report.passed { "PASS" } else { "FAIL" };
        match &report.failure {
            Some(failure) => println!("[{status}] {:<22} {failure}", report.name),
            None => println!("[{status}] {}", report.name),
        }
    }
    println!();
    println!("{}/{} passed", result.passed, result.total);
}
