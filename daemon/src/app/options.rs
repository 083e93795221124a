//! Application configuration options

use std::time::Duration;

use crate::jobs::runner;
use crate::models::service::Service;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::streaming::hub;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Run log storage
    pub storage: StorageLayout,

    /// Server configuration
    pub server: ServerOptions,

    /// Process runner options
    pub runner: runner::Options,

    /// Live viewer options
    pub viewer: hub::Options,

    /// Record a working tree digest after successful runs
    pub hash_working_tree: bool,

    /// Services that can be built and deployed
    pub services: Vec<Service>,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            storage: StorageLayout::default(),
            server: ServerOptions::default(),
            runner: runner::Options::default(),
            viewer: hub::Options::default(),
            hash_working_tree: false,
            services: Vec::new(),
        }
    }
}

impl AppOptions {
    /// Assemble options from a validated settings file
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            storage: StorageLayout::new(settings.storage.logs_dir.clone()),
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            runner: runner::Options {
                shell: settings.runner.shell.clone(),
                chunk_size: settings.runner.chunk_size,
                drain_timeout: Duration::from_secs(settings.runner.drain_timeout_secs),
            },
            viewer: hub::Options {
                idle_timeout: Duration::from_secs(settings.viewer.idle_timeout_secs),
                buffer_chunks: settings.viewer.buffer_chunks,
            },
            hash_working_tree: settings.runner.hash_working_tree,
            services: settings.services.clone(),
        }
    }
}

/// Lifecycle options for the daemon
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8083,
        }
    }
}
