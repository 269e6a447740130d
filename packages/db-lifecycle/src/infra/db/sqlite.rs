use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use tracing::{debug, info};

use crate::config::db::{sqlite_lock_path, sqlite_sidecar_paths, LifecycleConfig};
use crate::config::descriptor::{ConnectionDescriptor, ProviderKind};
use crate::error::DbInfraError;
use crate::infra::db::context::DatabaseContext;
use crate::infra::db::core::{
    applied_migration_names, close_quietly, create_schema_from_model, migrate_sqlite_file,
    open_sqlite, user_table_count,
};
use crate::infra::db::diagnostics::lifecycle_counters;
use crate::infra::db::locking::SqliteFileLock;

/// Embedded SQLite store driven through SeaORM.
#[derive(Debug, Clone)]
pub struct SqliteContext {
    db_path: PathBuf,
    config: LifecycleConfig,
}

impl SqliteContext {
    pub fn new(db_path: impl Into<PathBuf>, config: &LifecycleConfig) -> Self {
        Self {
            db_path: db_path.into(),
            config: config.clone(),
        }
    }

    pub fn from_descriptor(
        descriptor: &ConnectionDescriptor,
        config: &LifecycleConfig,
    ) -> Result<Self, DbInfraError> {
        if descriptor.provider() != ProviderKind::EmbeddedFile {
            return Err(DbInfraError::UnsupportedProvider {
                provider: descriptor.provider(),
            });
        }
        let db_path = descriptor.resolve_artifact_path(&config.data_dir)?;
        Ok(Self::new(db_path, config))
    }

    /// Remove `<db>.migrate.lock` only while holding it; a running migrator
    /// keeps its lock file.
    fn remove_lock_file(&self) -> Result<(), DbInfraError> {
        let lock_path = sqlite_lock_path(&self.db_path);
        if !lock_path.exists() {
            return Ok(());
        }
        match SqliteFileLock::new(&lock_path).try_acquire()? {
            Some(guard) => guard.remove_and_release(),
            None => {
                debug!(
                    lock_path = %lock_path.display(),
                    "migration lock is held elsewhere, leaving lock file"
                );
                Ok(())
            }
        }
    }

    fn ensure_parent_dir(&self) -> Result<(), DbInfraError> {
        match self.db_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
                .map_err(|e| DbInfraError::io(parent.to_path_buf(), e)),
            _ => Ok(()),
        }
    }
}

async fn create_if_empty(conn: &DatabaseConnection) -> Result<bool, DbInfraError> {
    let tables = user_table_count(conn)
        .await
        .map_err(|e| DbInfraError::provision("ensure_created", e))?;
    if tables > 0 {
        return Ok(false);
    }
    create_schema_from_model(conn)
        .await
        .map_err(|e| DbInfraError::provision("ensure_created", e))?;
    Ok(true)
}

#[async_trait]
impl DatabaseContext for SqliteContext {
    fn artifact_path(&self) -> &Path {
        &self.db_path
    }

    async fn ensure_created(&self) -> Result<bool, DbInfraError> {
        self.ensure_parent_dir()?;
        info!("ensure_created=start path={}", self.db_path.display());

        let conn = open_sqlite(&self.db_path, &self.config.db_settings(), true).await?;
        let result = create_if_empty(&conn).await;
        close_quietly(conn, &self.db_path).await;

        match result {
            Ok(true) => lifecycle_counters::created(),
            Ok(false) => lifecycle_counters::create_skipped(),
            Err(_) => {}
        }
        info!("ensure_created=done created={:?}", result.as_ref().ok());
        result
    }

    async fn migrate(&self) -> Result<(), DbInfraError> {
        self.ensure_parent_dir()?;
        migrate_sqlite_file(&self.db_path, &self.config).await
    }

    async fn ensure_deleted(&self) -> Result<bool, DbInfraError> {
        let existed = match std::fs::remove_file(&self.db_path) {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(DbInfraError::io(self.db_path.clone(), e)),
        };

        for sidecar in sqlite_sidecar_paths(&self.db_path) {
            match std::fs::remove_file(&sidecar) {
                Ok(()) => debug!(path = %sidecar.display(), "removed sidecar"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(DbInfraError::io(sidecar, e)),
            }
        }
        self.remove_lock_file()?;

        if existed {
            lifecycle_counters::deleted();
        } else {
            lifecycle_counters::delete_missing();
        }
        info!(
            "ensure_deleted=done path={} existed={}",
            self.db_path.display(),
            existed
        );
        Ok(existed)
    }

    async fn applied_migrations(&self) -> Result<Vec<String>, DbInfraError> {
        if !self.db_path.exists() {
            return Ok(Vec::new());
        }

        let conn = open_sqlite(&self.db_path, &self.config.db_settings(), false).await?;
        let result = applied_migration_names(&conn)
            .await
            .map_err(|e| DbInfraError::provision("applied_migrations", e));
        close_quietly(conn, &self.db_path).await;
        result
    }
}
