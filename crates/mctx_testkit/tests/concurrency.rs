//! Multi-threaded tests: locking and lost-update freedom.

use mctx_core::{AccessMode, CoreError, TransactionHints, TransactionManager};
use mctx_storage::LockMode;
use mctx_testkit::prelude::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn counter_stress_loses_no_updates() {
    let manager = Arc::new(TransactionManager::in_memory());
    let config = StressConfig {
        threads: 8,
        operations: 100,
        keys: 4,
        ..Default::default()
    };

    let result = run_counter_stress(Arc::clone(&manager), &config).unwrap();
    assert_eq!(result.failed, 0);
    assert_eq!(result.committed, 800);
    assert!(result.is_consistent(), "{result:?}");
    assert_eq!(result.stats.active_transactions, 0);
    assert!(manager.active_transactions().is_empty());
}

#[test]
fn stress_without_usage_locks_is_consistent() {
    let manager = Arc::new(TransactionManager::in_memory());
    let config = StressConfig {
        threads: 4,
        operations: 50,
        keys: 1,
        hints: TransactionHints::new().no_usage_lock(true),
        ..Default::default()
    };

    let result = run_counter_stress(manager, &config).unwrap();
    assert!(result.is_consistent(), "{result:?}");
}

#[test]
fn exclusive_lock_times_out_across_threads() {
    let fixture = TestEngine::with_lock_timeout(Duration::from_millis(50));
    let mut holder = fixture
        .begin(
            TransactionHints::default(),
            &[(DEFAULT_COLLECTION, AccessMode::Exclusive)],
        )
        .unwrap();
    assert_eq!(
        fixture.engine.lock_table().held_by(DEFAULT_COLLECTION, holder.id()),
        Some(LockMode::Exclusive)
    );

    thread::scope(|scope| {
        let waiter = scope.spawn(|| {
            fixture.begin(
                TransactionHints::default(),
                &[(DEFAULT_COLLECTION, AccessMode::Write)],
            )
        });
        let result = waiter.join().unwrap();
        assert!(matches!(result, Err(CoreError::LockTimeout { .. })));
    });

    assert_eq!(fixture.stats().lock_timeouts(), 1);
    holder.commit().unwrap();
    assert_eq!(fixture.engine.lock_table().holder_count(DEFAULT_COLLECTION), 0);
}

#[test]
fn waiter_proceeds_once_exclusive_holder_commits() {
    let fixture = TestEngine::with_lock_timeout(Duration::from_secs(5));
    let mut holder = fixture
        .begin(
            TransactionHints::default(),
            &[(DEFAULT_COLLECTION, AccessMode::Exclusive)],
        )
        .unwrap();
    holder.put(DEFAULT_COLLECTION, "k", "first").unwrap();

    thread::scope(|scope| {
        let waiter = scope.spawn(|| {
            let mut txn = fixture.begin(
                TransactionHints::default(),
                &[(DEFAULT_COLLECTION, AccessMode::Exclusive)],
            )?;
            let seen = txn.get(DEFAULT_COLLECTION, b"k")?;
            txn.commit()?;
            Ok::<_, CoreError>(as_text(seen))
        });

        thread::sleep(Duration::from_millis(20));
        holder.commit().unwrap();
        let seen = waiter.join().unwrap().unwrap();
        assert_eq!(seen.as_deref(), Some("first"));
    });
}

#[test]
fn writers_share_a_collection() {
    let fixture = TestEngine::with_lock_timeout(Duration::from_millis(50));
    let collections = [(DEFAULT_COLLECTION, AccessMode::Write)];
    let mut t1 = fixture.begin(TransactionHints::default(), &collections).unwrap();

    thread::scope(|scope| {
        let other = scope.spawn(|| {
            let mut t2 = fixture.begin(TransactionHints::default(), &collections)?;
            t2.put(DEFAULT_COLLECTION, "b", "2")?;
            t2.commit()
        });
        other.join().unwrap().unwrap();
    });

    t1.put(DEFAULT_COLLECTION, "a", "1").unwrap();
    t1.commit().unwrap();
    assert_eq!(fixture.read(DEFAULT_COLLECTION, "a").as_deref(), Some("1"));
    assert_eq!(fixture.read(DEFAULT_COLLECTION, "b").as_deref(), Some("2"));
}
