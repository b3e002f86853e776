//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::ConsoleError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Storage layout for the console
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn root(&self) -> Dir {
        Dir::new(&self.base_dir)
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        self.root().file("settings.json")
    }

    /// Get the file holding the most recently known run id
    pub fn current_run_file(&self) -> File {
        self.root().file("current_run.json")
    }

    /// Get the logs directory
    pub fn logs_dir(&self) -> Dir {
        self.root().subdir("logs")
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), ConsoleError> {
        self.root().create().await?;
        self.logs_dir().create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        let base_dir = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".persephone");

        Self::new(base_dir)
    }
}
