
use db_lifecycle::{
    DatabaseTarget, DefaultContextFactory, LifecycleVerifier, PathStyle, ProviderKind,
};
use lifecycle_test_support::data_dir::TestDataDir;

/// Verifier over real SQLite contexts rooted in `data`.
pub fn sqlite_verifier(data: &TestDataDir) -> LifecycleVerifier<DefaultContextFactory> {
    LifecycleVerifier::new(data.config().clone(), DefaultContextFactory)
}

pub fn target(
    data: &TestDataDir,
    provider: ProviderKind,
    style: PathStyle,
    index: u32,
) -> DatabaseTarget {
    DatabaseTarget::numbered(provider, style, index, data.data_dir())
        .expect("scenario target should be valid")
}
