use db_lifecycle::{DataDirectory, LifecycleConfig};
use tempfile::TempDir;

/// A throwaway data directory plus the config pointing at it.
/// The directory is removed when this value is dropped.
pub struct TestDataDir {
    dir: TempDir,
    config: LifecycleConfig,
}

impl TestDataDir {
    pub fn new() -> Self {
        let dir = tempfile::Builder::new()
            .prefix("lifecycle-data-")
            .tempdir()
            .expect("should create temp data dir");
        let mut config = LifecycleConfig::new(DataDirectory::new(dir.path()));
        // Keep lock waits short so contention tests fail fast.
        config.lock_acquire_ms = 1000;
        Self { dir, config }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn data_dir(&self) -> &DataDirectory {
        &self.config.data_dir
    }

    pub fn path(&self) -> &std::path::Path {
        self.dir.path()
    }

    /// Names of every file currently in the data directory, sorted.
    pub fn entries(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.dir.path())
            .expect("should list data dir")
            .map(|e| {
                e.expect("should read dir entry")
                    .file_name()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        names.sort();
        names
    }
}

impl Default for TestDataDir {
    fn default() -> Self {
        Self::new()
    }
}
