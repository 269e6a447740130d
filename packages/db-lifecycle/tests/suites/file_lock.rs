//! Migration file lock behavior.
//!
//! - a held lock makes other contenders see `None`
//! - releasing (or dropping) the guard lets the next contender in
//! - `migrate` gives up with a lock error when the lock never frees
//! - teardown only removes the lock file when nobody holds it

use std::time::Duration;

use db_lifecycle::config::db::sqlite_lock_path;
use db_lifecycle::infra::db::SqliteFileLock;
use db_lifecycle::{DatabaseContext, DbInfraError, SqliteContext};
use lifecycle_test_support::data_dir::TestDataDir;

#[test]
fn contention_then_release() {
    let data = TestDataDir::new();
    let lock_path = data.path().join("contended.db.migrate.lock");

    let mut lock_a = SqliteFileLock::new(&lock_path);
    let mut lock_b = SqliteFileLock::new(&lock_path);

    let guard_a = lock_a
        .try_acquire()
        .expect("A try_acquire should not fail")
        .expect("A should acquire lock");
    assert_eq!(guard_a.lock_path(), lock_path.as_path());

    let contended = lock_b.try_acquire().expect("B try_acquire should not fail");
    assert!(contended.is_none(), "B should not acquire while A holds it");

    guard_a.release().expect("A should release guard");

    let guard_b = lock_b
        .try_acquire()
        .expect("B try_acquire should not fail")
        .expect("B should acquire after A released");
    guard_b.release().expect("B should release guard");
}

#[test]
fn dropping_the_guard_releases_the_lock() {
    let data = TestDataDir::new();
    let lock_path = data.path().join("nested").join("dropped.db.migrate.lock");

    let mut lock = SqliteFileLock::new(&lock_path);
    {
        let _guard = lock
            .try_acquire()
            .expect("try_acquire should not fail")
            .expect("first acquire");
        assert!(lock_path.exists(), "lock file and parent dir are created");
    }

    let again = lock
        .try_acquire()
        .expect("try_acquire should not fail")
        .expect("lock should be free after the guard dropped");
    drop(again);
}

#[tokio::test]
async fn migrate_times_out_while_lock_is_held() {
    let data = TestDataDir::new();
    let mut config = data.config().clone();
    config.lock_acquire_ms = 150;

    let db_path = data.path().join("SQLite-locked.db");
    let mut holder = SqliteFileLock::new(&sqlite_lock_path(&db_path));
    let guard = holder
        .try_acquire()
        .expect("try_acquire should not fail")
        .expect("holder should acquire lock");

    let context = SqliteContext::new(&db_path, &config);
    let started = std::time::Instant::now();
    let err = context
        .migrate()
        .await
        .expect_err("migrate cannot proceed while another holder has the lock");

    assert!(matches!(err, DbInfraError::Lock { .. }), "got {err:?}");
    assert!(started.elapsed() >= Duration::from_millis(150));

    guard.release().expect("holder should release guard");
    context
        .migrate()
        .await
        .expect("migrate should succeed once the lock is free");
    assert_eq!(
        context.applied_migrations().await.expect("history"),
        migration::defined_migration_names()
    );

    assert!(context.ensure_deleted().await.expect("teardown"));
    assert!(data.entries().is_empty(), "left behind: {:?}", data.entries());
}

#[tokio::test]
async fn ensure_deleted_keeps_a_held_lock_file() {
    let data = TestDataDir::new();
    let db_path = data.path().join("SQLite-held.db");
    let lock_path = sqlite_lock_path(&db_path);
    let context = SqliteContext::new(&db_path, data.config());
    assert!(context.ensure_created().await.expect("create"));

    let mut holder = SqliteFileLock::new(&lock_path);
    let guard = holder
        .try_acquire()
        .expect("try_acquire should not fail")
        .expect("holder should acquire lock");

    assert!(context.ensure_deleted().await.expect("teardown"));
    assert!(!db_path.exists());
    assert!(lock_path.exists(), "a held lock file must survive teardown");

    let mut contender = SqliteFileLock::new(&lock_path);
    assert!(
        contender
            .try_acquire()
            .expect("try_acquire should not fail")
            .is_none(),
        "the lock must stay exclusive across teardown"
    );

    guard.release().expect("holder should release guard");
    assert!(!context.ensure_deleted().await.expect("second teardown"));
    assert!(!lock_path.exists(), "a free lock file is removed");
    assert!(data.entries().is_empty(), "left behind: {:?}", data.entries());
}

#[test]
fn removed_lock_file_is_recreated_by_the_next_contender() {
    let data = TestDataDir::new();
    let lock_path = data.path().join("stale.db.migrate.lock");

    let mut lock_a = SqliteFileLock::new(&lock_path);
    let guard_a = lock_a
        .try_acquire()
        .expect("try_acquire should not fail")
        .expect("A should acquire lock");
    guard_a
        .remove_and_release()
        .expect("A should remove and release");
    assert!(!lock_path.exists());

    let mut lock_b = SqliteFileLock::new(&lock_path);
    let guard_b = lock_b
        .try_acquire()
        .expect("try_acquire should not fail")
        .expect("B should acquire the recreated file");
    assert!(lock_path.exists());
    guard_b.release().expect("B should release guard");
}
