//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::AppError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::models::service::RunKey;

/// Storage layout for run logs
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Directory holding one log file per (service, phase)
    pub logs_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            logs_dir: logs_dir.into(),
        }
    }

    /// Get the logs directory
    pub fn logs_dir(&self) -> Dir {
        Dir::new(&self.logs_dir)
    }

    /// Get the log file of a (service, phase), named `{service}.{phase}.log`
    pub fn log_file(&self, key: &RunKey) -> File {
        self.logs_dir().file(&format!("{}.log", key))
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), AppError> {
        self.logs_dir().create().await
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::new("logs")
    }
}
