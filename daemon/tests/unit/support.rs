//! Shared fixtures

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use buildcast::jobs::pipeline::Pipeline;
use buildcast::jobs::runner::{self, ProcessRunner};
use buildcast::jobs::tracker::JobTracker;
use buildcast::models::service::{JobStatus, Phase, RunKey, Service};
use buildcast::storage::layout::StorageLayout;
use buildcast::streaming::hub::{self, BroadcastHub};
use buildcast::streaming::log_store::LogStore;

/// A full runner stack rooted in a temporary directory
pub struct Stack {
    pub dir: tempfile::TempDir,
    pub log_store: Arc<LogStore>,
    pub hub: Arc<BroadcastHub>,
    pub runner: Arc<ProcessRunner>,
}

impl Stack {
    pub fn new() -> Self {
        Self::with_options(runner_options(), hub::Options::default())
    }

    pub fn with_options(runner: runner::Options, viewer: hub::Options) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let log_store = Arc::new(LogStore::new(StorageLayout::new(dir.path().join("logs"))));
        let hub = Arc::new(BroadcastHub::new(log_store.clone(), viewer));
        let runner = Arc::new(ProcessRunner::new(log_store.clone(), hub.clone(), runner));
        Self {
            dir,
            log_store,
            hub,
            runner,
        }
    }

    /// A service working in the stack's temporary directory
    pub fn service(&self, id: &str, build: &str, deploy: &str) -> Service {
        service(id, build, deploy, self.dir.path())
    }

    pub fn pipeline(&self, services: Vec<Service>) -> Arc<Pipeline> {
        Arc::new(Pipeline::new(
            services,
            Arc::new(JobTracker::new()),
            self.runner.clone(),
            false,
        ))
    }

    /// Current log content of a key
    pub async fn log(&self, id: &str, phase: Phase) -> String {
        let snapshot = self.log_store.read(&RunKey::new(id, phase)).await.unwrap();
        String::from_utf8(snapshot.data).unwrap()
    }

    pub fn log_path(&self, id: &str, phase: Phase) -> std::path::PathBuf {
        self.dir
            .path()
            .join("logs")
            .join(format!("{}.{}.log", id, phase))
    }
}

pub fn runner_options() -> runner::Options {
    runner::Options {
        shell: "sh".to_string(),
        chunk_size: 1024,
        drain_timeout: Duration::from_secs(2),
    }
}

pub fn service(id: &str, build: &str, deploy: &str, dir: &Path) -> Service {
    Service {
        id: id.to_string(),
        name: String::new(),
        build_command: build.to_string(),
        deploy_command: deploy.to_string(),
        working_dir: dir.to_path_buf(),
    }
}

/// Poll until `check` holds, panicking after five seconds
pub async fn eventually<F>(mut check: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait until a service has no phase running
pub async fn until_idle(pipeline: &Pipeline, id: &str) {
    eventually(|| pipeline.status(id).unwrap().status == JobStatus::Idle).await;
}
