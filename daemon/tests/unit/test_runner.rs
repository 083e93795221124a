//! Process runner tests

use std::time::{Duration, Instant};

use buildcast::jobs::runner::{self, PhaseExecutor};
use buildcast::models::outcome::RunOutcome;
use buildcast::models::service::Phase;
use buildcast::streaming::hub;

use crate::support::{runner_options, service, Stack};

#[tokio::test]
async fn test_run_success_logs_output() {
    let stack = Stack::new();
    let api = stack.service("api", "echo ok && exit 0", "true");

    let outcome = stack.runner.run(&api, Phase::Build).await;

    assert_eq!(outcome, RunOutcome::Success);
    assert_eq!(stack.log("api", Phase::Build).await, "ok\n");
    assert_eq!(
        std::fs::read_to_string(stack.log_path("api", Phase::Build)).unwrap(),
        "ok\n"
    );
}

#[tokio::test]
async fn test_run_captures_stderr() {
    let stack = Stack::new();
    let api = stack.service("api", "echo oops >&2", "true");

    let outcome = stack.runner.run(&api, Phase::Build).await;

    assert!(outcome.is_success());
    assert_eq!(stack.log("api", Phase::Build).await, "oops\n");
}

#[tokio::test]
async fn test_run_nonzero_exit_appends_diagnostic() {
    let stack = Stack::new();
    let api = stack.service("api", "echo partial; exit 7", "true");

    let outcome = stack.runner.run(&api, Phase::Build).await;

    assert_eq!(outcome, RunOutcome::NonZeroExit(Some(7)));
    let log = stack.log("api", Phase::Build).await;
    assert!(log.starts_with("partial\n"));
    assert!(log.ends_with("command failed: exit status 7\n"));
}

#[tokio::test]
async fn test_run_spawn_failure_is_logged() {
    let stack = Stack::new();
    let missing = stack.dir.path().join("does-not-exist");
    let api = service("api", "echo never", "true", &missing);

    let outcome = stack.runner.run(&api, Phase::Deploy).await;

    assert!(matches!(outcome, RunOutcome::SpawnFailure(_)));
    let log = stack.log("api", Phase::Deploy).await;
    assert!(log.starts_with("failed to start command"), "log: {log:?}");
}

#[tokio::test]
async fn test_new_run_truncates_previous_log() {
    let stack = Stack::new();
    let first = stack.service("api", "echo first run output", "true");
    let second = stack.service("api", "echo second", "true");

    stack.runner.run(&first, Phase::Build).await;
    stack.runner.run(&second, Phase::Build).await;

    assert_eq!(stack.log("api", Phase::Build).await, "second\n");
}

#[tokio::test]
async fn test_phases_have_separate_logs() {
    let stack = Stack::new();
    let api = stack.service("api", "echo building", "echo deploying");

    stack.runner.run(&api, Phase::Build).await;
    stack.runner.run(&api, Phase::Deploy).await;

    assert_eq!(stack.log("api", Phase::Build).await, "building\n");
    assert_eq!(stack.log("api", Phase::Deploy).await, "deploying\n");
}

#[tokio::test]
async fn test_output_larger_than_chunk_is_complete() {
    let stack = Stack::with_options(
        runner::Options {
            chunk_size: 16,
            ..runner_options()
        },
        hub::Options::default(),
    );
    let api = stack.service("api", "i=0; while [ $i -lt 100 ]; do echo line $i; i=$((i+1)); done", "true");

    stack.runner.run(&api, Phase::Build).await;

    let expected: String = (0..100).map(|i| format!("line {}\n", i)).collect();
    assert_eq!(stack.log("api", Phase::Build).await, expected);
}

#[tokio::test]
async fn test_background_child_does_not_block_completion() {
    let stack = Stack::with_options(
        runner::Options {
            drain_timeout: Duration::from_millis(200),
            ..runner_options()
        },
        hub::Options::default(),
    );
    let api = stack.service("api", "sleep 30 & echo started", "true");

    let started = Instant::now();
    let outcome = stack.runner.run(&api, Phase::Build).await;

    assert!(outcome.is_success());
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(stack.log("api", Phase::Build).await.starts_with("started\n"));
}

#[tokio::test]
async fn test_run_killed_by_signal() {
    let stack = Stack::new();
    let api = stack.service("api", "echo going; kill -9 $$", "true");

    let outcome = stack.runner.run(&api, Phase::Build).await;

    assert_eq!(outcome, RunOutcome::NonZeroExit(None));
    assert_eq!(
        stack.log("api", Phase::Build).await,
        "going\ncommand terminated by signal\n"
    );
}
