//! Reference transaction scenarios.
//!
//! Each scenario runs on a fresh in-memory fixture and checks one literal
//! interleaving of transactions. They back the integration tests and the
//! `mctx scenarios` command.

use crate::fixtures::{as_text, TestEngine, DEFAULT_COLLECTION};
use mctx_core::{AccessMode, CoreError, CoreResult, Transaction, TransactionHints};
use serde::Serialize;
use std::fmt::Debug;

/// Outcome of one scenario; the error describes the first failed check.
pub type ScenarioResult = Result<(), String>;

/// A named scenario.
#[derive(Debug, Clone, Copy)]
pub struct Scenario {
    /// Short identifier.
    pub name: &'static str,
    /// What the scenario demonstrates.
    pub description: &'static str,
    /// Runs the scenario.
    pub run: fn() -> ScenarioResult,
}

/// Serializable result of a scenario run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    /// Scenario identifier.
    pub name: &'static str,
    /// True if every check passed.
    pub passed: bool,
    /// The failed check, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// Every scenario, in order.
pub const SCENARIOS: [Scenario; 6] = [
    Scenario {
        name: "lost-update",
        description: "two blind writers of one key: first commit wins, second is Busy",
        run: lost_update_prevention,
    },
    Scenario {
        name: "read-conflict",
        description: "a key read for update and then overwritten externally fails the commit",
        run: read_for_update_conflict,
    },
    Scenario {
        name: "savepoint-rollback",
        description: "rolling back to a savepoint restores the pending view exactly",
        run: savepoint_rollback,
    },
    Scenario {
        name: "undo-get-for-update",
        description: "an untracked read no longer conflicts",
        run: undo_get_for_update,
    },
    Scenario {
        name: "put-vs-delete",
        description: "a queued delete loses against a committed put of the same key",
        run: put_delete_race,
    },
    Scenario {
        name: "empty-transaction",
        description: "begin followed by commit always succeeds",
        run: empty_transaction,
    },
];

/// Runs every scenario and collects reports.
pub fn run_all() -> Vec<ScenarioReport> {
    SCENARIOS.iter().map(run_scenario).collect()
}

/// Runs one scenario inside a tracing span.
pub fn run_scenario(scenario: &Scenario) -> ScenarioReport {
    let _span = tracing::debug_span!("scenario", name = scenario.name).entered();
    let result = (scenario.run)();
    if let Err(failure) = &result {
        tracing::warn!(name = scenario.name, %failure, "scenario failed");
    }
    ScenarioReport {
        name: scenario.name,
        passed: result.is_ok(),
        failure: result.err(),
    }
}

/// T1 and T2 both write `foo` without snapshots; T1 commits first, T2 gets `Busy`.
pub fn lost_update_prevention() -> ScenarioResult {
    let fixture = TestEngine::new();
    let mut t1 = begin(&fixture, "begin t1")?;
    let mut t2 = begin(&fixture, "begin t2")?;

    step("t1 put", t1.put(DEFAULT_COLLECTION, "foo", "bar2"))?;
    step("t2 put", t2.put(DEFAULT_COLLECTION, "foo", "bar2"))?;

    step("t1 commit", t1.commit())?;
    expect_busy("t2 commit", t2.commit())?;
    ensure_value("foo after commits", fixture.read(DEFAULT_COLLECTION, "foo"), Some("bar2"))
}

/// A snapshot read for update of `foo` conflicts with a later external write.
pub fn read_for_update_conflict() -> ScenarioResult {
    let fixture = TestEngine::new();
    fixture.seed(DEFAULT_COLLECTION, &[("foo", "bar")]);

    let mut t1 = begin(&fixture, "begin t1")?;
    step("t1 snapshot", t1.set_snapshot())?;
    let read = step("t1 get_for_update", t1.get_for_update(DEFAULT_COLLECTION, b"foo"))?;
    ensure_value("t1 read of foo", as_text(read), Some("bar"))?;

    step("external put", fixture.put(DEFAULT_COLLECTION, "foo", "barz"))?;

    expect_busy("t1 commit", t1.commit())?;
    ensure_value("foo after t1", fixture.read(DEFAULT_COLLECTION, "foo"), Some("barz"))
}

/// Operations after a savepoint vanish on rollback; earlier ones survive.
pub fn savepoint_rollback() -> ScenarioResult {
    let fixture = TestEngine::new();
    let mut t1 = begin(&fixture, "begin t1")?;
    let c = DEFAULT_COLLECTION;

    step("put A", t1.put(c, "A", "a"))?;
    step("put B", t1.put(c, "B", "bb"))?;
    step("put C", t1.put(c, "C", "c"))?;
    step("savepoint", t1.set_savepoint())?;
    step("delete B", t1.delete(c, "B"))?;
    step("put C", t1.put(c, "C", "cc"))?;
    step("put D", t1.put(c, "D", "d"))?;
    step("rollback to savepoint", t1.rollback_to_savepoint())?;

    for (key, expected) in [("A", Some("a")), ("B", Some("bb")), ("C", Some("c")), ("D", None)] {
        let value = step("read after rollback", t1.get(c, key.as_bytes()))?;
        ensure_value(key, as_text(value), expected)?;
    }
    step("t1 commit", t1.commit()).map(|_| ())
}

/// Undoing the only read for update of `A` removes it from validation.
pub fn undo_get_for_update() -> ScenarioResult {
    let fixture = TestEngine::new();
    let mut t1 = begin(&fixture, "begin t1")?;

    step("t1 get_for_update", t1.get_for_update(DEFAULT_COLLECTION, b"A"))?;
    step("t1 undo", t1.undo_get_for_update(DEFAULT_COLLECTION, b"A"))?;

    let mut t2 = begin(&fixture, "begin t2")?;
    step("t2 put", t2.put(DEFAULT_COLLECTION, "A", "x"))?;
    step("t2 commit", t2.commit())?;

    step("t1 commit", t1.commit()).map(|_| ())
}

/// T1's put and T2's delete of `4` race; T1 commits first, T2 is `Busy`.
pub fn put_delete_race() -> ScenarioResult {
    let fixture = TestEngine::new();
    let mut t1 = begin(&fixture, "begin t1")?;
    let mut t2 = begin(&fixture, "begin t2")?;

    step("t1 put", t1.put(DEFAULT_COLLECTION, "4", "x"))?;
    step("t2 delete", t2.delete(DEFAULT_COLLECTION, "4"))?;

    step("t1 commit", t1.commit())?;
    expect_busy("t2 commit", t2.commit())?;
    ensure_value("4 after commits", fixture.read(DEFAULT_COLLECTION, "4"), Some("x"))
}

/// A transaction with no operations commits.
pub fn empty_transaction() -> ScenarioResult {
    let fixture = TestEngine::new();
    let mut t1 = begin(&fixture, "begin t1")?;
    let before = fixture.engine.stats().committed_batches;
    step("commit", t1.commit())?;
    if fixture.engine.stats().committed_batches != before {
        return Err("commit: empty transaction wrote a batch".to_string());
    }
    Ok(())
}

fn begin(fixture: &TestEngine, name: &str) -> Result<Transaction, String> {
    step(
        name,
        fixture.begin(
            TransactionHints::default(),
            &[(DEFAULT_COLLECTION, AccessMode::Write)],
        ),
    )
}

fn step<T>(name: &str, result: CoreResult<T>) -> Result<T, String> {
    result.map_err(|err| format!("{name}: unexpected error: {err}"))
}

fn expect_busy<T: Debug>(name: &str, result: CoreResult<T>) -> ScenarioResult {
    match result {
        Err(CoreError::Busy { .. }) => Ok(()),
        other => Err(format!("{name}: expected Busy, got {other:?}")),
    }
}

fn ensure_value(what: &str, actual: Option<String>, expected: Option<&str>) -> ScenarioResult {
    if actual.as_deref() == expected {
        Ok(())
    } else {
        Err(format!("{what}: expected {expected:?}, got {actual:?}"))
    }
}
