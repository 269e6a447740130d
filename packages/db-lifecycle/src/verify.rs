//! Lifecycle verification: precondition, provisioning, postcondition,
//! teardown, teardown re-check.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::db::LifecycleConfig;
use crate::error::DbInfraError;
use crate::infra::db::context::{ContextFactory, DatabaseContext};
use crate::target::DatabaseTarget;

/// How the store gets built. A created store has no migration history, a
/// migrated one does; the two are never interchangeable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioning {
    EnsureCreated,
    Migrate,
}

impl fmt::Display for Provisioning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provisioning::EnsureCreated => f.write_str("ensure_created"),
            Provisioning::Migrate => f.write_str("migrate"),
        }
    }
}

/// What one verified lifecycle observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleOutcome {
    pub provisioning: Provisioning,
    pub artifact_path: PathBuf,
    pub absent_before: bool,
    pub present_after: bool,
    pub absent_after_teardown: bool,
    /// `ensure_created`'s return value; `None` for migrations.
    pub created: Option<bool>,
    /// Migration history right after provisioning.
    pub applied_migrations: Vec<String>,
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("artifact already exists before provisioning: {}", path.display())]
    Precondition { path: PathBuf },

    #[error("artifact missing after {provisioning}: {}", path.display())]
    Postcondition {
        path: PathBuf,
        provisioning: Provisioning,
    },

    #[error("artifact still present after teardown: {}", path.display())]
    Teardown { path: PathBuf },

    #[error(transparent)]
    Provision(#[from] DbInfraError),
}

/// Runs one create-or-migrate + teardown cycle per target against contexts
/// opened by the injected factory.
pub struct LifecycleVerifier<F> {
    config: LifecycleConfig,
    factory: F,
}

impl<F: ContextFactory> LifecycleVerifier<F> {
    pub fn new(config: LifecycleConfig, factory: F) -> Self {
        Self { config, factory }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub async fn verify(
        &self,
        target: &DatabaseTarget,
        provisioning: Provisioning,
    ) -> Result<LifecycleOutcome, VerifyError> {
        let path = target.artifact_path().to_path_buf();
        info!(
            "verify=start provider={} style={:?} provisioning={} path={}",
            target.provider(),
            target.style(),
            provisioning,
            path.display()
        );

        if path.exists() {
            return Err(VerifyError::Precondition { path });
        }

        let context = self.factory.open(target.connection_string(), &self.config)?;
        if context.artifact_path() != path.as_path() {
            return Err(DbInfraError::descriptor(format!(
                "descriptor resolved to {} but the target expects {}",
                context.artifact_path().display(),
                path.display()
            ))
            .into());
        }

        let provisioned = provision(context.as_ref(), provisioning).await;
        let (created, applied_migrations) = match provisioned {
            Ok(created) => match context.applied_migrations().await {
                Ok(applied) => (created, applied),
                Err(e) => {
                    teardown_best_effort(context.as_ref()).await;
                    return Err(e.into());
                }
            },
            Err(e) => {
                teardown_best_effort(context.as_ref()).await;
                return Err(e.into());
            }
        };

        if !path.exists() {
            teardown_best_effort(context.as_ref()).await;
            return Err(VerifyError::Postcondition { path, provisioning });
        }

        context.ensure_deleted().await?;
        if path.exists() {
            return Err(VerifyError::Teardown { path });
        }

        info!("verify=done path={}", path.display());
        Ok(LifecycleOutcome {
            provisioning,
            artifact_path: path,
            absent_before: true,
            present_after: true,
            absent_after_teardown: true,
            created,
            applied_migrations,
        })
    }
}

async fn provision(
    context: &dyn DatabaseContext,
    provisioning: Provisioning,
) -> Result<Option<bool>, DbInfraError> {
    match provisioning {
        Provisioning::EnsureCreated => context.ensure_created().await.map(Some),
        Provisioning::Migrate => context.migrate().await.map(|()| None),
    }
}

async fn teardown_best_effort(context: &dyn DatabaseContext) {
    if let Err(e) = context.ensure_deleted().await {
        warn!(
            error = %e,
            path = %context.artifact_path().display(),
            "teardown after failed verification did not complete"
        );
    }
}
