use std::path::{Path, PathBuf};

use crate::config::db::DataDirectory;
use crate::config::descriptor::{build_connection_string, PathStyle, ProviderKind};
use crate::error::DbInfraError;

/// One store under test: how to reach it and where its file must appear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseTarget {
    provider: ProviderKind,
    style: PathStyle,
    file_name: String,
    connection_string: String,
    artifact_path: PathBuf,
}

impl DatabaseTarget {
    pub fn new(
        provider: ProviderKind,
        style: PathStyle,
        file_name: &str,
        data_dir: &DataDirectory,
    ) -> Result<Self, DbInfraError> {
        let bare = Path::new(file_name);
        if bare.file_name().and_then(|n| n.to_str()) != Some(file_name) {
            return Err(DbInfraError::descriptor(format!(
                "target file name must be a bare file name, got '{file_name}'"
            )));
        }
        if bare.extension().and_then(|e| e.to_str()) != Some(provider.extension()) {
            return Err(DbInfraError::descriptor(format!(
                "{provider} targets need a .{} file, got '{file_name}'",
                provider.extension()
            )));
        }

        Ok(Self {
            provider,
            style,
            file_name: file_name.to_string(),
            connection_string: build_connection_string(provider, style, data_dir, file_name),
            artifact_path: data_dir.path().join(file_name),
        })
    }

    /// Target for the n-th scenario of `provider` (`SQLite-<n>.db`, `LocalDB-<n>.mdf`).
    pub fn numbered(
        provider: ProviderKind,
        style: PathStyle,
        index: u32,
        data_dir: &DataDirectory,
    ) -> Result<Self, DbInfraError> {
        Self::new(provider, style, &provider.scenario_file_name(index), data_dir)
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    pub fn style(&self) -> PathStyle {
        self.style
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }
}
