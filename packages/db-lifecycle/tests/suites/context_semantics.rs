//! Direct `SqliteContext` behavior outside the verifier.

use db_lifecycle::config::db::sqlite_lock_path;
use db_lifecycle::{
    ContextFactory, DatabaseContext, DbInfraError, DefaultContextFactory, PathStyle, ProviderKind,
    SqliteContext,
};
use lifecycle_test_support::data_dir::TestDataDir;
use migration::defined_migration_names;

use crate::support::target;

fn context_for(data: &TestDataDir, index: u32) -> Box<dyn DatabaseContext> {
    let t = target(data, ProviderKind::EmbeddedFile, PathStyle::Placeholder, index);
    DefaultContextFactory
        .open(t.connection_string(), data.config())
        .expect("factory should open embedded targets")
}

#[tokio::test]
async fn ensure_created_is_idempotent() {
    let data = TestDataDir::new();
    let context = context_for(&data, 1);

    assert!(context.ensure_created().await.expect("first create"));
    assert!(context.artifact_path().exists());
    assert!(
        !context.ensure_created().await.expect("second create"),
        "second call finds the model already there"
    );

    assert!(context.ensure_deleted().await.expect("teardown"));
}

#[tokio::test]
async fn migrate_is_idempotent_and_records_history() {
    let data = TestDataDir::new();
    let context = context_for(&data, 2);

    context.migrate().await.expect("first migrate");
    context.migrate().await.expect("second migrate is a no-op");

    assert_eq!(
        context.applied_migrations().await.expect("history"),
        defined_migration_names()
    );
    assert!(
        !context.ensure_created().await.expect("create after migrate"),
        "a migrated store already has the model"
    );

    assert!(context.ensure_deleted().await.expect("teardown"));
    assert!(
        !sqlite_lock_path(context.artifact_path()).exists(),
        "lock sidecar is removed with the store"
    );
    assert!(data.entries().is_empty(), "left behind: {:?}", data.entries());
}

#[tokio::test]
async fn migrate_after_ensure_created_fails() {
    let data = TestDataDir::new();
    let context = context_for(&data, 3);

    assert!(context.ensure_created().await.expect("create"));
    assert!(context.applied_migrations().await.expect("history").is_empty());

    let err = context
        .migrate()
        .await
        .expect_err("tables already exist without history");
    assert!(
        matches!(err, DbInfraError::Provision { operation: "migrate", .. }),
        "got {err:?}"
    );

    assert!(context.ensure_deleted().await.expect("teardown"));
}

#[tokio::test]
async fn ensure_deleted_on_missing_store_returns_false() {
    let data = TestDataDir::new();
    let context = context_for(&data, 4);

    assert!(!context.ensure_deleted().await.expect("nothing to delete"));
    assert!(data.entries().is_empty());
}

#[tokio::test]
async fn applied_migrations_does_not_create_the_store() {
    let data = TestDataDir::new();
    let context = SqliteContext::new(data.path().join("absent.db"), data.config());

    assert!(context.applied_migrations().await.expect("history").is_empty());
    assert!(!context.artifact_path().exists());
}

#[tokio::test]
async fn ensure_created_makes_missing_data_directory() {
    let data = TestDataDir::new();
    let nested = data.path().join("Data").join("SQLite-5.db");
    let context = SqliteContext::new(&nested, data.config());

    assert!(context.ensure_created().await.expect("create"));
    assert!(nested.exists());

    assert!(context.ensure_deleted().await.expect("teardown"));
    assert!(!nested.exists());
}

#[test]
fn factory_rejects_broken_descriptors() {
    let data = TestDataDir::new();
    for bad in [
        "Data Source=",
        "Data Source=:memory:",
        "Data Source=|DataDirectory|",
        "Mode=ReadOnly",
    ] {
        let result = DefaultContextFactory.open(bad, data.config());
        assert!(
            matches!(result, Err(DbInfraError::Descriptor { .. })),
            "{bad} should be rejected"
        );
    }
}

#[tokio::test]
async fn migration_body_timeout_is_a_provisioning_failure() {
    let data = TestDataDir::new();
    let mut config = data.config().clone();
    config.migrate_body_timeout_ms = 0;
    let context = SqliteContext::new(data.path().join("SQLite-slow.db"), &config);

    let err = context
        .migrate()
        .await
        .expect_err("a zero budget cannot fit the migrator");
    match err {
        DbInfraError::Provision { operation, source } => {
            assert_eq!(operation, "migrate");
            assert!(source.to_string().contains("timed out"), "got {source}");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    context.ensure_deleted().await.expect("teardown");
    assert!(data.entries().is_empty(), "left behind: {:?}", data.entries());
}
