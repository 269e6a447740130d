use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::DbInfraError;

pub const DATA_DIR_ENV: &str = "LIFECYCLE_DATA_DIR";
pub const LOCK_TIMEOUT_ENV: &str = "LIFECYCLE_LOCK_TIMEOUT_MS";
pub const MIGRATE_TIMEOUT_ENV: &str = "LIFECYCLE_MIGRATE_TIMEOUT_MS";
pub const BUSY_TIMEOUT_ENV: &str = "LIFECYCLE_BUSY_TIMEOUT_MS";

const DEFAULT_LOCK_ACQUIRE_MS: u64 = 3000;
const DEFAULT_MIGRATE_BODY_TIMEOUT_MS: u64 = 120_000;
const DEFAULT_BUSY_TIMEOUT_MS: u32 = 5000;

/// Directory that `|DataDirectory|` resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDirectory(PathBuf);

impl DataDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// `<project root>/Data`, the conventional location next to the sources.
    pub fn for_project(project_root: impl AsRef<Path>) -> Self {
        Self(project_root.as_ref().join("Data"))
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

/// Settings shared by every context opened for one run.
///
/// Built once and passed by reference; nothing reads the environment after
/// construction.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub data_dir: DataDirectory,
    /// How long `migrate` waits for the migration file lock.
    pub lock_acquire_ms: u64,
    /// Upper bound for one migrator run.
    pub migrate_body_timeout_ms: u64,
    pub busy_timeout_ms: u32,
}

impl LifecycleConfig {
    pub fn new(data_dir: DataDirectory) -> Self {
        Self {
            data_dir,
            lock_acquire_ms: DEFAULT_LOCK_ACQUIRE_MS,
            migrate_body_timeout_ms: DEFAULT_MIGRATE_BODY_TIMEOUT_MS,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }

    pub fn from_env() -> Result<Self, DbInfraError> {
        let data_dir = DataDirectory::new(must_var(DATA_DIR_ENV)?);
        Self::from_env_with_data_dir(data_dir)
    }

    /// Like [`LifecycleConfig::from_env`] but with the data directory supplied
    /// by the caller (e.g. a CLI flag).
    pub fn from_env_with_data_dir(data_dir: DataDirectory) -> Result<Self, DbInfraError> {
        Ok(Self {
            data_dir,
            lock_acquire_ms: parse_var(LOCK_TIMEOUT_ENV)?.unwrap_or(DEFAULT_LOCK_ACQUIRE_MS),
            migrate_body_timeout_ms: parse_var(MIGRATE_TIMEOUT_ENV)?
                .unwrap_or(DEFAULT_MIGRATE_BODY_TIMEOUT_MS),
            busy_timeout_ms: parse_var(BUSY_TIMEOUT_ENV)?.unwrap_or(DEFAULT_BUSY_TIMEOUT_MS),
        })
    }

    pub fn db_settings(&self) -> DbSettings {
        DbSettings::Sqlite {
            busy_timeout_ms: self.busy_timeout_ms,
        }
    }
}

/// Per-connection session settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbSettings {
    Sqlite { busy_timeout_ms: u32 },
}

/// Ordered session-level statements applied on every new connection.
pub fn build_session_statements(settings: &DbSettings) -> Vec<String> {
    match settings {
        DbSettings::Sqlite { busy_timeout_ms } => vec![
            "PRAGMA foreign_keys = ON;".to_string(),
            format!("PRAGMA busy_timeout = {};", busy_timeout_ms),
        ],
    }
}

/// Lock file guarding migrations of `db_path` (`<db>.migrate.lock`).
pub fn sqlite_lock_path(db_path: &Path) -> PathBuf {
    sidecar_path(db_path, ".migrate.lock")
}

/// `<db><suffix>`, e.g. `SQLite-1.db-wal`.
pub fn sidecar_path(db_path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(db_path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Files SQLite may leave next to a store. The migration lock file is not
/// listed; it may only be removed by whoever holds the lock.
pub fn sqlite_sidecar_paths(db_path: &Path) -> Vec<PathBuf> {
    ["-journal", "-wal", "-shm"]
        .iter()
        .map(|suffix| sidecar_path(db_path, suffix))
        .collect()
}

fn must_var(name: &str) -> Result<String, DbInfraError> {
    env::var(name).map_err(|_| {
        DbInfraError::config(format!("Required environment variable '{name}' is not set"))
    })
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>, DbInfraError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            DbInfraError::config(format!(
                "Environment variable '{name}' has an invalid value: '{raw}'"
            ))
        }),
        Err(_) => Ok(None),
    }
}
