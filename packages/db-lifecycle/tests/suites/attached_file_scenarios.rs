//! Attached LocalDB (`.mdf`) scenarios.
//!
//! LocalDB has no driver in this stack, so these run against the
//! file-backed fake; descriptor building and placeholder resolution are the
//! real ones.

use db_lifecycle::config::descriptor::LOCALDB_SERVER;
use db_lifecycle::{
    ConnectionDescriptor, DbInfraError, DefaultContextFactory, LifecycleVerifier, PathStyle,
    Provisioning, ProviderKind, VerifyError,
};
use lifecycle_test_support::data_dir::TestDataDir;
use lifecycle_test_support::fake_context::FakeContextFactory;
use migration::defined_migration_names;

use crate::support::target;

fn fake_verifier(data: &TestDataDir) -> (LifecycleVerifier<FakeContextFactory>, FakeContextFactory) {
    let factory = FakeContextFactory::new();
    (
        LifecycleVerifier::new(data.config().clone(), factory.clone()),
        factory,
    )
}

#[tokio::test]
async fn localdb_migrate_with_placeholder() {
    let data = TestDataDir::new();
    let t = target(&data, ProviderKind::ServerAttachedFile, PathStyle::Placeholder, 1);
    let expected = data.path().join("LocalDB-1.mdf");
    assert_eq!(
        t.connection_string(),
        format!(
            "Server=(LocalDB)\\MSSQLLocalDB;AttachDbFileName=|DataDirectory|LocalDB-1.mdf;Database={};Integrated Security=True",
            expected.display()
        )
    );

    let (verifier, factory) = fake_verifier(&data);
    let outcome = verifier
        .verify(&t, Provisioning::Migrate)
        .await
        .expect("migrate lifecycle should pass");

    assert_eq!(outcome.artifact_path, expected);
    assert_eq!(outcome.applied_migrations, defined_migration_names());
    assert_eq!(
        factory.log().calls(),
        vec![
            format!("open server-attached-file {}", expected.display()),
            "migrate".to_string(),
            "ensure_deleted".to_string(),
        ]
    );
    assert!(data.entries().is_empty());
}

#[tokio::test]
async fn localdb_migrate_with_literal_path() {
    let data = TestDataDir::new();
    let t = target(&data, ProviderKind::ServerAttachedFile, PathStyle::Literal, 2);
    assert!(t.connection_string().contains(";Initial Catalog="));

    let (verifier, _) = fake_verifier(&data);
    let outcome = verifier
        .verify(&t, Provisioning::Migrate)
        .await
        .expect("migrate lifecycle should pass");
    assert_eq!(outcome.artifact_path, data.path().join("LocalDB-2.mdf"));
}

#[tokio::test]
async fn localdb_ensure_created_with_placeholder() {
    let data = TestDataDir::new();
    let t = target(&data, ProviderKind::ServerAttachedFile, PathStyle::Placeholder, 3);

    let (verifier, _) = fake_verifier(&data);
    let outcome = verifier
        .verify(&t, Provisioning::EnsureCreated)
        .await
        .expect("ensure_created lifecycle should pass");

    assert_eq!(outcome.artifact_path, data.path().join("LocalDB-3.mdf"));
    assert_eq!(outcome.created, Some(true));
    assert!(outcome.applied_migrations.is_empty());
}

#[tokio::test]
async fn localdb_ensure_created_with_literal_path() {
    let data = TestDataDir::new();
    let t = target(&data, ProviderKind::ServerAttachedFile, PathStyle::Literal, 4);
    let expected = data.path().join("LocalDB-4.mdf");

    let descriptor = ConnectionDescriptor::parse(t.connection_string()).unwrap();
    assert_eq!(descriptor.server(), Some(LOCALDB_SERVER));
    assert!(!descriptor.uses_placeholder());
    assert_eq!(descriptor.catalog(), Some(expected.display().to_string().as_str()));
    assert!(descriptor.integrated_security());

    let (verifier, _) = fake_verifier(&data);
    let outcome = verifier
        .verify(&t, Provisioning::EnsureCreated)
        .await
        .expect("ensure_created lifecycle should pass");

    assert_eq!(outcome.artifact_path, expected);
    assert!(data.entries().is_empty());
}

#[tokio::test]
async fn default_factory_rejects_attached_files() {
    let data = TestDataDir::new();
    let t = target(&data, ProviderKind::ServerAttachedFile, PathStyle::Placeholder, 5);
    let verifier = LifecycleVerifier::new(data.config().clone(), DefaultContextFactory);

    let err = verifier
        .verify(&t, Provisioning::Migrate)
        .await
        .expect_err("LocalDB has no driver here");

    assert!(matches!(
        err,
        VerifyError::Provision(DbInfraError::UnsupportedProvider {
            provider: ProviderKind::ServerAttachedFile
        })
    ));
    assert!(!t.artifact_path().exists());
}
