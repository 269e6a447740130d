//! Database lifecycle verification.
//!
//! Builds connection descriptors for file-backed stores, resolves the
//! `|DataDirectory|` placeholder, opens SeaORM-backed contexts and checks
//! that create / migrate / delete leave the expected artifacts on disk.

pub mod config;
pub mod entities;
pub mod error;
pub mod infra;
pub mod target;
pub mod verify;

pub use config::db::{DataDirectory, LifecycleConfig};
pub use config::descriptor::{
    build_connection_string, ConnectionDescriptor, PathStyle, ProviderKind, DATA_DIRECTORY_TOKEN,
};
pub use error::DbInfraError;
pub use infra::db::{ContextFactory, DatabaseContext, DefaultContextFactory, SqliteContext};
pub use target::DatabaseTarget;
pub use verify::{LifecycleOutcome, LifecycleVerifier, Provisioning, VerifyError};
