//! Pipeline tests: admission, chaining and status

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use buildcast::errors::AppError;
use buildcast::jobs::pipeline::Pipeline;
use buildcast::jobs::runner::PhaseExecutor;
use buildcast::jobs::tracker::JobTracker;
use buildcast::models::outcome::RunOutcome;
use buildcast::models::service::{JobStatus, Phase, RunState, Service};

use crate::support::{eventually, service, until_idle, Stack};

/// Executor whose runs block until released and end with a fixed outcome
struct GatedExecutor {
    builds: AtomicUsize,
    deploys: AtomicUsize,
    build_gate: Semaphore,
    deploy_gate: Semaphore,
    build_outcome: RunOutcome,
}

impl GatedExecutor {
    fn new(build_outcome: RunOutcome) -> Arc<Self> {
        Arc::new(Self {
            builds: AtomicUsize::new(0),
            deploys: AtomicUsize::new(0),
            build_gate: Semaphore::new(0),
            deploy_gate: Semaphore::new(0),
            build_outcome,
        })
    }

    fn calls(&self, phase: Phase) -> usize {
        match phase {
            Phase::Build => self.builds.load(Ordering::SeqCst),
            Phase::Deploy => self.deploys.load(Ordering::SeqCst),
        }
    }

    fn release(&self, phase: Phase) {
        match phase {
            Phase::Build => self.build_gate.add_permits(1),
            Phase::Deploy => self.deploy_gate.add_permits(1),
        }
    }
}

#[async_trait]
impl PhaseExecutor for GatedExecutor {
    async fn run(&self, _service: &Service, phase: Phase) -> RunOutcome {
        match phase {
            Phase::Build => {
                self.builds.fetch_add(1, Ordering::SeqCst);
                let _permit = self.build_gate.acquire().await;
                self.build_outcome.clone()
            }
            Phase::Deploy => {
                self.deploys.fetch_add(1, Ordering::SeqCst);
                let _permit = self.deploy_gate.acquire().await;
                RunOutcome::Success
            }
        }
    }
}

fn pipeline(executor: Arc<GatedExecutor>) -> Arc<Pipeline> {
    let api = service("api", "make", "make deploy", std::path::Path::new("/tmp"));
    let web = service("web", "make", "make deploy", std::path::Path::new("/tmp"));
    Arc::new(Pipeline::new(
        vec![api, web],
        Arc::new(JobTracker::new()),
        executor,
        false,
    ))
}

#[tokio::test]
async fn test_second_build_is_dropped_while_running() {
    let executor = GatedExecutor::new(RunOutcome::NonZeroExit(Some(1)));
    let pipeline = pipeline(executor.clone());

    assert!(pipeline.start_build("api").unwrap());
    assert!(!pipeline.start_build("api").unwrap());
    assert_eq!(pipeline.status("api").unwrap().status, JobStatus::Building);

    executor.release(Phase::Build);
    until_idle(&pipeline, "api").await;
    assert_eq!(executor.calls(Phase::Build), 1);

    // Admitted again once idle
    assert!(pipeline.start_build("api").unwrap());
    executor.release(Phase::Build);
    until_idle(&pipeline, "api").await;
    assert_eq!(executor.calls(Phase::Build), 2);
}

#[tokio::test]
async fn test_services_are_independent() {
    let executor = GatedExecutor::new(RunOutcome::NonZeroExit(Some(1)));
    let pipeline = pipeline(executor.clone());

    assert!(pipeline.start_build("api").unwrap());
    assert!(pipeline.start_build("web").unwrap());
    assert!(pipeline.start_deploy("api").unwrap());

    executor.release(Phase::Build);
    executor.release(Phase::Build);
    executor.release(Phase::Deploy);
    until_idle(&pipeline, "api").await;
    until_idle(&pipeline, "web").await;
}

#[tokio::test]
async fn test_successful_build_chains_deploy() {
    let executor = GatedExecutor::new(RunOutcome::Success);
    let pipeline = pipeline(executor.clone());

    assert!(pipeline.start_build("api").unwrap());
    executor.release(Phase::Build);

    eventually(|| executor.calls(Phase::Deploy) == 1).await;
    assert_eq!(pipeline.status("api").unwrap().status, JobStatus::Deploying);
    assert!(pipeline.status("api").unwrap().last_build.is_some());

    executor.release(Phase::Deploy);
    eventually(|| pipeline.status("api").unwrap().last_deploy.is_some()).await;
    until_idle(&pipeline, "api").await;
}

#[tokio::test]
async fn test_failed_build_does_not_deploy() {
    let executor = GatedExecutor::new(RunOutcome::NonZeroExit(Some(2)));
    let pipeline = pipeline(executor.clone());

    assert!(pipeline.start_build("api").unwrap());
    executor.release(Phase::Build);
    until_idle(&pipeline, "api").await;

    assert_eq!(executor.calls(Phase::Deploy), 0);
    let status = pipeline.status("api").unwrap();
    assert!(status.last_build.is_none());
    assert!(status.last_deploy.is_none());
}

#[tokio::test]
async fn test_chained_deploy_dropped_while_deploy_running() {
    let executor = GatedExecutor::new(RunOutcome::Success);
    let pipeline = pipeline(executor.clone());

    assert!(pipeline.start_deploy("api").unwrap());
    assert!(pipeline.start_build("api").unwrap());
    // Building wins while both run
    assert_eq!(pipeline.status("api").unwrap().status, JobStatus::Building);

    executor.release(Phase::Build);
    eventually(|| {
        pipeline.tracker().state("api", Phase::Build) == RunState::Idle
            && pipeline.status("api").unwrap().last_build.is_some()
    })
    .await;
    assert_eq!(pipeline.status("api").unwrap().status, JobStatus::Deploying);

    executor.release(Phase::Deploy);
    until_idle(&pipeline, "api").await;
    assert_eq!(executor.calls(Phase::Deploy), 1);
}

#[tokio::test]
async fn test_unknown_service() {
    let executor = GatedExecutor::new(RunOutcome::Success);
    let pipeline = pipeline(executor.clone());

    assert!(matches!(pipeline.start_build("nope"), Err(AppError::NotFound(_))));
    assert!(matches!(pipeline.status("nope"), Err(AppError::NotFound(_))));
    assert_eq!(executor.calls(Phase::Build), 0);
}

#[tokio::test]
async fn test_statuses_in_config_order() {
    let executor = GatedExecutor::new(RunOutcome::Success);
    let pipeline = pipeline(executor);

    let ids: Vec<String> = pipeline.statuses().into_iter().map(|s| s.id).collect();
    assert_eq!(ids, vec!["api", "web"]);
    assert!(pipeline
        .statuses()
        .iter()
        .all(|s| s.status == JobStatus::Idle));
}

#[tokio::test]
async fn test_build_then_deploy_with_real_processes() {
    let stack = Stack::new();
    let api = stack.service("api", "echo ok && exit 0", "echo shipped");
    let pipeline = stack.pipeline(vec![api]);

    assert!(pipeline.start_build("api").unwrap());
    eventually(|| pipeline.status("api").unwrap().last_deploy.is_some()).await;
    until_idle(&pipeline, "api").await;

    assert_eq!(stack.log("api", Phase::Build).await, "ok\n");
    assert_eq!(stack.log("api", Phase::Deploy).await, "shipped\n");
}

#[tokio::test]
async fn test_failed_build_with_real_processes() {
    let stack = Stack::new();
    let api = stack.service("api", "exit 7", "echo shipped");
    let pipeline = stack.pipeline(vec![api]);

    assert!(pipeline.start_build("api").unwrap());
    eventually(|| pipeline.tracker().state("api", Phase::Build) == RunState::Idle).await;

    assert_eq!(
        stack.log("api", Phase::Build).await,
        "command failed: exit status 7\n"
    );
    assert!(!stack.log_path("api", Phase::Deploy).exists());
    assert_eq!(pipeline.status("api").unwrap().status, JobStatus::Idle);
}

#[tokio::test]
async fn test_wait_failure_does_not_deploy() {
    let executor = GatedExecutor::new(RunOutcome::WaitFailure("interrupted".to_string()));
    let pipeline = pipeline(executor.clone());

    assert!(pipeline.start_build("api").unwrap());
    executor.release(Phase::Build);
    until_idle(&pipeline, "api").await;

    assert_eq!(executor.calls(Phase::Deploy), 0);
    assert!(pipeline.status("api").unwrap().last_build.is_none());
}

#[tokio::test]
async fn test_spawn_failure_returns_to_idle() {
    let stack = Stack::new();
    let missing = stack.dir.path().join("does-not-exist");
    let api = service("api", "echo never", "echo shipped", &missing);
    let pipeline = stack.pipeline(vec![api]);

    assert!(pipeline.start_build("api").unwrap());
    eventually(|| pipeline.tracker().state("api", Phase::Build) == RunState::Idle).await;

    let log = stack.log("api", Phase::Build).await;
    assert!(log.starts_with("failed to start command"), "log: {log:?}");
    assert_eq!(pipeline.status("api").unwrap().status, JobStatus::Idle);
    assert!(pipeline.status("api").unwrap().last_build.is_none());
    assert!(!stack.log_path("api", Phase::Deploy).exists());

    // The slot is free again
    assert!(pipeline.start_build("api").unwrap());
    eventually(|| pipeline.tracker().state("api", Phase::Build) == RunState::Idle).await;
}
