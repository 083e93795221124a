//! Settings file management

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::filesys::file::File;
use crate::logs::LogLevel;
use crate::models::service::Service;

/// Daemon settings, loaded from a YAML or JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Directory for the daemon's own rolling log files
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Emit daemon logs as JSON
    #[serde(default)]
    pub json_logs: bool,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Run log storage
    #[serde(default)]
    pub storage: StorageSettings,

    /// Process runner configuration
    #[serde(default)]
    pub runner: RunnerSettings,

    /// Live viewer configuration
    #[serde(default)]
    pub viewer: ViewerSettings,

    /// Services that can be built and deployed
    #[serde(default)]
    pub services: Vec<Service>,
}

impl Settings {
    /// Load settings from a file; `.json` files are parsed as JSON, anything
    /// else as YAML.
    pub async fn load(file: &File) -> Result<Self, AppError> {
        let settings: Settings = if file.is_json() {
            file.read_json().await?
        } else {
            file.read_yaml().await?
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from a YAML string
    pub fn from_yaml(contents: &str) -> Result<Self, AppError> {
        let settings: Settings = serde_yaml::from_str(contents)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check invariants the rest of the daemon relies on
    pub fn validate(&self) -> Result<(), AppError> {
        if self.services.is_empty() {
            return Err(AppError::ConfigError("No services configured".to_string()));
        }

        let mut seen = HashSet::new();
        for service in &self.services {
            if service.id.trim().is_empty() {
                return Err(AppError::ConfigError("Service id must not be empty".to_string()));
            }
            // The id becomes part of a log file name
            if service.id.contains(['/', '\\']) || service.id.contains("..") {
                return Err(AppError::ConfigError(format!(
                    "Service id {:?} must not contain path separators",
                    service.id
                )));
            }
            if !seen.insert(service.id.as_str()) {
                return Err(AppError::ConfigError(format!(
                    "Duplicate service id: {}",
                    service.id
                )));
            }
        }

        if self.runner.chunk_size == 0 {
            return Err(AppError::ConfigError("runner.chunk_size must be positive".to_string()));
        }
        if self.viewer.idle_timeout_secs == 0 {
            return Err(AppError::ConfigError(
                "viewer.idle_timeout_secs must be positive".to_string(),
            ));
        }
        if self.viewer.buffer_chunks == 0 {
            return Err(AppError::ConfigError(
                "viewer.buffer_chunks must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8083
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Run log storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            logs_dir: default_logs_dir(),
        }
    }
}

/// Process runner settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerSettings {
    /// Shell used as `<shell> -c <command>`
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Read size for process output, in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// How long output readers may keep draining after the process exits
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,

    /// Record a digest of the working tree after successful runs
    #[serde(default)]
    pub hash_working_tree: bool,
}

fn default_shell() -> String {
    "bash".to_string()
}

fn default_chunk_size() -> usize {
    1024
}

fn default_drain_timeout() -> u64 {
    5
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            chunk_size: default_chunk_size(),
            drain_timeout_secs: default_drain_timeout(),
            hash_working_tree: false,
        }
    }
}

/// Live viewer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerSettings {
    /// A viewer silent for this long is dropped
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Chunks queued per viewer before it is considered too slow
    #[serde(default = "default_buffer_chunks")]
    pub buffer_chunks: usize,
}

fn default_idle_timeout() -> u64 {
    60
}

fn default_buffer_chunks() -> usize {
    1024
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout(),
            buffer_chunks: default_buffer_chunks(),
        }
    }
}
