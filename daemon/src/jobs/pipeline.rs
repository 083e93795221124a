//! Build and deploy triggers
//!
//! Admits a phase through the [`JobTracker`], runs it in a detached task and
//! chains a successful build into a deploy.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::errors::AppError;
use crate::jobs::runner::PhaseExecutor;
use crate::jobs::tracker::{JobTracker, RunGuard};
use crate::models::service::{Phase, RunRecord, Service, ServiceStatus};
use crate::utils::tree_digest;

/// Entry point for triggers and status queries
pub struct Pipeline {
    services: Vec<Arc<Service>>,
    by_id: HashMap<String, Arc<Service>>,
    tracker: Arc<JobTracker>,
    executor: Arc<dyn PhaseExecutor>,
    hash_working_tree: bool,
}

impl Pipeline {
    /// Create a new pipeline over a fixed set of services
    pub fn new(
        services: Vec<Service>,
        tracker: Arc<JobTracker>,
        executor: Arc<dyn PhaseExecutor>,
        hash_working_tree: bool,
    ) -> Self {
        let services: Vec<Arc<Service>> = services.into_iter().map(Arc::new).collect();
        let by_id = services
            .iter()
            .map(|service| (service.id.clone(), service.clone()))
            .collect();

        Self {
            services,
            by_id,
            tracker,
            executor,
            hash_working_tree,
        }
    }

    /// Configured services, in configuration order
    pub fn services(&self) -> &[Arc<Service>] {
        &self.services
    }

    /// Look up a service
    pub fn service(&self, service_id: &str) -> Result<Arc<Service>, AppError> {
        self.by_id
            .get(service_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("service {}", service_id)))
    }

    pub fn tracker(&self) -> &Arc<JobTracker> {
        &self.tracker
    }

    /// Start a build in the background. `Ok(false)` means a build is already
    /// running and the trigger was dropped.
    pub fn start_build(self: &Arc<Self>, service_id: &str) -> Result<bool, AppError> {
        self.start(service_id, Phase::Build)
    }

    /// Start a deploy in the background. `Ok(false)` means a deploy is
    /// already running and the trigger was dropped.
    pub fn start_deploy(self: &Arc<Self>, service_id: &str) -> Result<bool, AppError> {
        self.start(service_id, Phase::Deploy)
    }

    /// Start a phase in the background
    pub fn start(self: &Arc<Self>, service_id: &str, phase: Phase) -> Result<bool, AppError> {
        let service = self.service(service_id)?;

        let Some(guard) = self.tracker.acquire(&service.id, phase) else {
            debug!(service = %service.id, %phase, "Already running, dropping trigger");
            return Ok(false);
        };

        let pipeline = self.clone();
        tokio::spawn(async move {
            pipeline.execute(service, guard).await;
        });
        Ok(true)
    }

    async fn execute(self: Arc<Self>, service: Arc<Service>, guard: RunGuard) {
        let phase = guard.phase();
        info!(service = %service.id, %phase, "Run started");

        let outcome = self.executor.run(&service, phase).await;

        if outcome.is_success() {
            let record = RunRecord {
                finished_at: Utc::now(),
                tree_digest: self.digest(&service).await,
            };
            self.tracker.record_success(&service.id, phase, record);
            info!(service = %service.id, %phase, "Run succeeded");
        } else {
            warn!(service = %service.id, %phase, ?outcome, "Run failed");
        }

        // Idle before chaining so the status moves straight from building to
        // deploying
        drop(guard);

        if phase == Phase::Build && outcome.is_success() {
            match self.start(&service.id, Phase::Deploy) {
                Ok(true) => info!(service = %service.id, "Deploy chained after build"),
                Ok(false) => debug!(service = %service.id, "Deploy already running, chained deploy dropped"),
                Err(e) => error!(service = %service.id, "Failed to chain deploy: {}", e),
            }
        }
    }

    async fn digest(&self, service: &Service) -> Option<String> {
        if !self.hash_working_tree {
            return None;
        }

        let dir = service.working_dir.clone();
        match tokio::task::spawn_blocking(move || tree_digest(&dir)).await {
            Ok(Ok(digest)) => Some(digest),
            Ok(Err(e)) => {
                warn!(service = %service.id, "Failed to hash working tree: {}", e);
                None
            }
            Err(e) => {
                warn!(service = %service.id, "Working tree hash task failed: {}", e);
                None
            }
        }
    }

    /// Status of one service
    pub fn status(&self, service_id: &str) -> Result<ServiceStatus, AppError> {
        let service = self.service(service_id)?;
        Ok(self.status_of(&service))
    }

    /// Status of every service, in configuration order
    pub fn statuses(&self) -> Vec<ServiceStatus> {
        self.services
            .iter()
            .map(|service| self.status_of(service))
            .collect()
    }

    fn status_of(&self, service: &Service) -> ServiceStatus {
        ServiceStatus {
            id: service.id.clone(),
            name: service.display_name().to_string(),
            status: self.tracker.status(&service.id),
            last_build: self.tracker.last_success(&service.id, Phase::Build),
            last_deploy: self.tracker.last_success(&service.id, Phase::Deploy),
        }
    }
}
