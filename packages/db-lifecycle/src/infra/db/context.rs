use std::path::Path;

use async_trait::async_trait;

use crate::config::db::LifecycleConfig;
use crate::config::descriptor::{ConnectionDescriptor, ProviderKind};
use crate::error::DbInfraError;
use crate::infra::db::sqlite::SqliteContext;

/// The database layer as seen by the lifecycle verifier.
///
/// One instance is scoped to one store. Implementations open and release
/// their own connections per call, so dropping a context never leaks a
/// handle on the store file.
#[async_trait]
pub trait DatabaseContext: Send + Sync {
    /// File this context provisions, with the placeholder already resolved.
    fn artifact_path(&self) -> &Path;

    /// Create the store from the current model, without migration history.
    /// Returns `false` and changes nothing when the store already has tables.
    async fn ensure_created(&self) -> Result<bool, DbInfraError>;

    /// Apply pending migrations in order, recording history.
    async fn migrate(&self) -> Result<(), DbInfraError>;

    /// Delete the store. Returns `false` when there was nothing to delete.
    async fn ensure_deleted(&self) -> Result<bool, DbInfraError>;

    /// Names of applied migrations. Never creates the store.
    async fn applied_migrations(&self) -> Result<Vec<String>, DbInfraError>;
}

/// Opens a [`DatabaseContext`] for a connection string.
pub trait ContextFactory: Send + Sync {
    fn open(
        &self,
        connection_string: &str,
        config: &LifecycleConfig,
    ) -> Result<Box<dyn DatabaseContext>, DbInfraError>;
}

/// SeaORM-backed factory. Only the embedded SQLite provider has a driver
/// in this stack; attached LocalDB files are rejected.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultContextFactory;

impl ContextFactory for DefaultContextFactory {
    fn open(
        &self,
        connection_string: &str,
        config: &LifecycleConfig,
    ) -> Result<Box<dyn DatabaseContext>, DbInfraError> {
        let descriptor = ConnectionDescriptor::parse(connection_string)?;
        match descriptor.provider() {
            ProviderKind::EmbeddedFile => {
                Ok(Box::new(SqliteContext::from_descriptor(&descriptor, config)?))
            }
            provider @ ProviderKind::ServerAttachedFile => {
                Err(DbInfraError::UnsupportedProvider { provider })
            }
        }
    }
}
