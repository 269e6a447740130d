//! File-backed fake database context.
//!
//! The fake parses the descriptor and resolves `|DataDirectory|` exactly like
//! the real factory, then stands in for the engine by writing a small text
//! file at the artifact path:
//!
//! ```text
//! fake-store
//! model                      <- written by ensure_created
//! migration:<name>           <- one line per applied migration
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use db_lifecycle::{
    ConnectionDescriptor, ContextFactory, DatabaseContext, DbInfraError, LifecycleConfig,
};
use sea_orm::DbErr;

const HEADER: &str = "fake-store";
const MODEL_LINE: &str = "model";
const MIGRATION_PREFIX: &str = "migration:";

/// How a fake context misbehaves, if at all.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FakeBehavior {
    #[default]
    Normal,
    /// Report success without writing the artifact.
    SkipArtifact,
    /// Fail every provisioning call with this message.
    FailProvisioning(String),
    /// Report success from `ensure_deleted` but leave the file behind.
    KeepOnDelete,
}

/// Call log shared between a factory and the contexts it opened.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    fn push(&self, call: impl Into<String>) {
        self.0.lock().expect("call log poisoned").push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().expect("call log poisoned").clone()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeContextFactory {
    behavior: FakeBehavior,
    log: CallLog,
}

impl FakeContextFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: FakeBehavior) -> Self {
        Self {
            behavior,
            log: CallLog::default(),
        }
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }
}

impl ContextFactory for FakeContextFactory {
    fn open(
        &self,
        connection_string: &str,
        config: &LifecycleConfig,
    ) -> Result<Box<dyn DatabaseContext>, DbInfraError> {
        let descriptor = ConnectionDescriptor::parse(connection_string)?;
        let path = descriptor.resolve_artifact_path(&config.data_dir)?;
        self.log
            .push(format!("open {} {}", descriptor.provider(), path.display()));
        Ok(Box::new(FakeContext {
            path,
            behavior: self.behavior.clone(),
            log: self.log.clone(),
        }))
    }
}

pub struct FakeContext {
    path: PathBuf,
    behavior: FakeBehavior,
    log: CallLog,
}

impl FakeContext {
    fn read_lines(&self) -> Result<Option<Vec<String>>, DbInfraError> {
        match std::fs::read_to_string(&self.path) {
            Ok(body) => Ok(Some(body.lines().map(str::to_string).collect())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DbInfraError::io(self.path.clone(), e)),
        }
    }

    fn write_lines(&self, lines: &[String]) -> Result<(), DbInfraError> {
        if matches!(self.behavior, FakeBehavior::SkipArtifact) {
            return Ok(());
        }
        let mut body = lines.join("\n");
        body.push('\n');
        std::fs::write(&self.path, body).map_err(|e| DbInfraError::io(self.path.clone(), e))
    }

    fn check_failure(&self, operation: &'static str) -> Result<(), DbInfraError> {
        match &self.behavior {
            FakeBehavior::FailProvisioning(message) => Err(DbInfraError::provision(
                operation,
                DbErr::Custom(message.clone()),
            )),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl DatabaseContext for FakeContext {
    fn artifact_path(&self) -> &Path {
        &self.path
    }

    async fn ensure_created(&self) -> Result<bool, DbInfraError> {
        self.log.push("ensure_created");
        self.check_failure("ensure_created")?;

        match self.read_lines()? {
            Some(lines) if lines.len() > 1 => Ok(false),
            _ => {
                self.write_lines(&[HEADER.to_string(), MODEL_LINE.to_string()])?;
                Ok(true)
            }
        }
    }

    async fn migrate(&self) -> Result<(), DbInfraError> {
        self.log.push("migrate");
        self.check_failure("migrate")?;

        let mut lines = self
            .read_lines()?
            .unwrap_or_else(|| vec![HEADER.to_string()]);
        if lines.iter().any(|l| l == MODEL_LINE) {
            return Err(DbInfraError::provision(
                "migrate",
                DbErr::Custom("store was created without migration history".to_string()),
            ));
        }

        for name in migration::defined_migration_names() {
            let line = format!("{MIGRATION_PREFIX}{name}");
            if !lines.contains(&line) {
                lines.push(line);
            }
        }
        self.write_lines(&lines)
    }

    async fn ensure_deleted(&self) -> Result<bool, DbInfraError> {
        self.log.push("ensure_deleted");
        if matches!(self.behavior, FakeBehavior::KeepOnDelete) {
            return Ok(self.path.exists());
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(DbInfraError::io(self.path.clone(), e)),
        }
    }

    async fn applied_migrations(&self) -> Result<Vec<String>, DbInfraError> {
        Ok(self
            .read_lines()?
            .unwrap_or_default()
            .iter()
            .filter_map(|l| l.strip_prefix(MIGRATION_PREFIX))
            .map(str::to_string)
            .collect())
    }
}
