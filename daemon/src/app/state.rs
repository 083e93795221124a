//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::app::options::AppOptions;
use crate::errors::AppError;
use crate::jobs::pipeline::Pipeline;
use crate::jobs::runner::ProcessRunner;
use crate::jobs::tracker::JobTracker;
use crate::streaming::hub::BroadcastHub;
use crate::streaming::log_store::LogStore;

/// Main application state
pub struct AppState {
    /// Live output fan-out
    pub hub: Arc<BroadcastHub>,

    /// Build and deploy triggers
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    /// Initialize application state
    pub async fn init(options: &AppOptions) -> Result<Self, AppError> {
        info!("Initializing application state...");

        options.storage.setup().await?;

        let log_store = Arc::new(LogStore::new(options.storage.clone()));
        let hub = Arc::new(BroadcastHub::new(log_store.clone(), options.viewer.clone()));
        let runner = Arc::new(ProcessRunner::new(
            log_store.clone(),
            hub.clone(),
            options.runner.clone(),
        ));
        let pipeline = Arc::new(Pipeline::new(
            options.services.clone(),
            Arc::new(JobTracker::new()),
            runner,
            options.hash_working_tree,
        ));

        info!(
            services = options.services.len(),
            logs_dir = %options.storage.logs_dir.display(),
            "Application state ready"
        );

        Ok(Self { hub, pipeline })
    }
}
