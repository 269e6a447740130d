use std::path::PathBuf;

use sea_orm::DbErr;
use thiserror::Error;

use crate::config::descriptor::ProviderKind;

#[derive(Debug, Error)]
pub enum DbInfraError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid connection descriptor: {message}")]
    Descriptor { message: String },

    #[error("Provider {provider} is not supported by this context factory")]
    UnsupportedProvider { provider: ProviderKind },

    /// Raised by the database layer itself; the source is kept unchanged.
    #[error("{operation} failed: {source}")]
    Provision {
        operation: &'static str,
        #[source]
        source: DbErr,
    },

    #[error("failed to open {}: {source}", path.display())]
    Connect {
        path: PathBuf,
        #[source]
        source: sqlx::Error,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Lock error: {message}")]
    Lock { message: String },
}

impl DbInfraError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn descriptor(message: impl Into<String>) -> Self {
        Self::Descriptor {
            message: message.into(),
        }
    }

    pub fn provision(operation: &'static str, source: DbErr) -> Self {
        Self::Provision { operation, source }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn lock(message: impl Into<String>) -> Self {
        Self::Lock {
            message: message.into(),
        }
    }

    /// True when SQLite reported lock contention on the store itself.
    pub fn is_sqlite_busy(&self) -> bool {
        let message = self.to_string();
        message.contains("database is locked") || message.contains("SQLITE_BUSY")
    }
}
