//! Each verification step reports its own failure, and failed runs still
//! try to clean up after themselves.

use db_lifecycle::{
    ContextFactory, DatabaseContext, DbInfraError, DefaultContextFactory, LifecycleVerifier,
    PathStyle, Provisioning, ProviderKind, VerifyError,
};
use lifecycle_test_support::data_dir::TestDataDir;
use lifecycle_test_support::fake_context::{FakeBehavior, FakeContextFactory};

use crate::support::{sqlite_verifier, target};

fn verifier_with(
    data: &TestDataDir,
    behavior: FakeBehavior,
) -> (LifecycleVerifier<FakeContextFactory>, FakeContextFactory) {
    let factory = FakeContextFactory::with_behavior(behavior);
    (
        LifecycleVerifier::new(data.config().clone(), factory.clone()),
        factory,
    )
}

#[tokio::test]
async fn preexisting_artifact_fails_precondition() {
    let data = TestDataDir::new();
    let t = target(&data, ProviderKind::EmbeddedFile, PathStyle::Placeholder, 1);
    std::fs::write(t.artifact_path(), b"stale").expect("seed stale file");

    let (verifier, factory) = verifier_with(&data, FakeBehavior::Normal);
    let err = verifier
        .verify(&t, Provisioning::Migrate)
        .await
        .expect_err("stale artifact must fail the precondition");

    assert!(matches!(err, VerifyError::Precondition { ref path } if path == t.artifact_path()));
    assert!(factory.log().calls().is_empty(), "nothing is opened");
    assert!(t.artifact_path().exists(), "the stale file is not touched");
}

#[tokio::test]
async fn missing_artifact_fails_postcondition() {
    let data = TestDataDir::new();
    let t = target(&data, ProviderKind::ServerAttachedFile, PathStyle::Literal, 2);

    let (verifier, factory) = verifier_with(&data, FakeBehavior::SkipArtifact);
    let err = verifier
        .verify(&t, Provisioning::EnsureCreated)
        .await
        .expect_err("no file was written");

    assert!(matches!(
        err,
        VerifyError::Postcondition {
            provisioning: Provisioning::EnsureCreated,
            ..
        }
    ));
    assert_eq!(
        factory.log().calls().last().map(String::as_str),
        Some("ensure_deleted"),
        "teardown is still attempted"
    );
}

#[tokio::test]
async fn provisioning_error_is_surfaced_and_cleaned_up() {
    let data = TestDataDir::new();
    let t = target(&data, ProviderKind::ServerAttachedFile, PathStyle::Placeholder, 3);

    let (verifier, factory) =
        verifier_with(&data, FakeBehavior::FailProvisioning("disk full".into()));
    let err = verifier
        .verify(&t, Provisioning::Migrate)
        .await
        .expect_err("provisioning fails");

    match err {
        VerifyError::Provision(DbInfraError::Provision { operation, source }) => {
            assert_eq!(operation, "migrate");
            assert!(source.to_string().contains("disk full"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(
        factory.log().calls()[1..],
        ["migrate".to_string(), "ensure_deleted".to_string()]
    );
    assert!(data.entries().is_empty());
}

#[tokio::test]
async fn surviving_artifact_fails_teardown() {
    let data = TestDataDir::new();
    let t = target(&data, ProviderKind::EmbeddedFile, PathStyle::Placeholder, 4);

    let (verifier, _) = verifier_with(&data, FakeBehavior::KeepOnDelete);
    let err = verifier
        .verify(&t, Provisioning::EnsureCreated)
        .await
        .expect_err("file survives teardown");

    assert!(matches!(err, VerifyError::Teardown { ref path } if path == t.artifact_path()));
    assert!(t.artifact_path().exists());
}

#[tokio::test]
async fn call_order_is_open_provision_delete() {
    let data = TestDataDir::new();
    let t = target(&data, ProviderKind::EmbeddedFile, PathStyle::Literal, 5);

    let (verifier, factory) = verifier_with(&data, FakeBehavior::Normal);
    verifier
        .verify(&t, Provisioning::EnsureCreated)
        .await
        .expect("lifecycle should pass");

    assert_eq!(
        factory.log().calls(),
        vec![
            format!("open embedded-file {}", t.artifact_path().display()),
            "ensure_created".to_string(),
            "ensure_deleted".to_string(),
        ]
    );
}

#[tokio::test]
async fn created_sqlite_store_blocks_a_later_migrate_run() {
    let data = TestDataDir::new();
    let t = target(&data, ProviderKind::EmbeddedFile, PathStyle::Placeholder, 6);

    let ctx = DefaultContextFactory
        .open(t.connection_string(), data.config())
        .expect("open");
    assert!(ctx.ensure_created().await.expect("create"));

    let verifier = sqlite_verifier(&data);
    let err = verifier
        .verify(&t, Provisioning::Migrate)
        .await
        .expect_err("the created store already exists");
    assert!(matches!(err, VerifyError::Precondition { .. }));

    assert!(ctx.ensure_deleted().await.expect("cleanup"));
    assert!(data.entries().is_empty(), "left behind: {:?}", data.entries());
}
