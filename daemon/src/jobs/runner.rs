//! Shell process runner
//!
//! Runs one phase command of one service, tees its stdout and stderr into the
//! run log and the broadcast hub, and reports how the process ended.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::models::outcome::RunOutcome;
use crate::models::service::{Phase, RunKey, Service};
use crate::streaming::hub::{BroadcastHub, LogChunk};
use crate::streaming::log_store::{LogSink, LogStore};

/// Executes a single phase of a service to completion
#[async_trait]
pub trait PhaseExecutor: Send + Sync {
    async fn run(&self, service: &Service, phase: Phase) -> RunOutcome;
}

/// Runner options
#[derive(Debug, Clone)]
pub struct Options {
    /// Shell invoked as `<shell> -c <command>`
    pub shell: String,

    /// Read size for process output
    pub chunk_size: usize,

    /// How long readers may keep draining output after the process exited
    pub drain_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            shell: "bash".to_string(),
            chunk_size: 1024,
            drain_timeout: Duration::from_secs(5),
        }
    }
}

/// Runs phase commands as child processes
pub struct ProcessRunner {
    log_store: Arc<LogStore>,
    hub: Arc<BroadcastHub>,
    options: Options,
}

impl ProcessRunner {
    /// Create a new process runner
    pub fn new(log_store: Arc<LogStore>, hub: Arc<BroadcastHub>, options: Options) -> Self {
        Self {
            log_store,
            hub,
            options,
        }
    }

    async fn drain(&self, key: &RunKey, readers: Vec<JoinHandle<()>>) {
        let deadline = tokio::time::Instant::now() + self.options.drain_timeout;
        for mut reader in readers {
            if tokio::time::timeout_at(deadline, &mut reader).await.is_err() {
                warn!(
                    key = %key,
                    "Output still open {:?} after exit (background process?), closing it",
                    self.options.drain_timeout
                );
                reader.abort();
            }
        }
    }
}

#[async_trait]
impl PhaseExecutor for ProcessRunner {
    async fn run(&self, service: &Service, phase: Phase) -> RunOutcome {
        let key = RunKey::new(&service.id, phase);

        let sink = match self.log_store.open(&key).await {
            Ok(sink) => sink,
            Err(e) => {
                let outcome = RunOutcome::SpawnFailure(e.to_string());
                if let Some(diagnostic) = outcome.diagnostic() {
                    self.hub.publish(
                        &key,
                        LogChunk {
                            position: None,
                            data: Bytes::from(diagnostic),
                        },
                    );
                }
                return outcome;
            }
        };
        let tee = Arc::new(Tee {
            key: key.clone(),
            sink,
            hub: self.hub.clone(),
        });

        let command = service.command(phase);
        info!(key = %key, dir = %service.working_dir.display(), "Running: {}", command);

        let spawned = Command::new(&self.options.shell)
            .arg("-c")
            .arg(command)
            .current_dir(&service.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                warn!(key = %key, "Failed to start command: {}", e);
                let outcome = RunOutcome::SpawnFailure(e.to_string());
                tee.emit_diagnostic(&outcome).await;
                return outcome;
            }
        };

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(pump(stdout, tee.clone(), self.options.chunk_size)));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(pump(stderr, tee.clone(), self.options.chunk_size)));
        }

        let outcome = match child.wait().await {
            Ok(status) if status.success() => RunOutcome::Success,
            Ok(status) => RunOutcome::NonZeroExit(status.code()),
            Err(e) => RunOutcome::WaitFailure(e.to_string()),
        };

        self.drain(&key, readers).await;
        tee.emit_diagnostic(&outcome).await;

        debug!(key = %key, ?outcome, "Process finished");
        outcome
    }
}

/// Copies process output into the run log, then to live viewers
struct Tee {
    key: RunKey,
    sink: LogSink,
    hub: Arc<BroadcastHub>,
}

impl Tee {
    async fn emit(&self, data: &[u8]) {
        let written = self.sink.write(data).await;
        let position = written.is_persisted().then(|| written.position());
        self.hub.publish(
            &self.key,
            LogChunk {
                position,
                data: Bytes::copy_from_slice(data),
            },
        );
        // Release the log only after publishing so live order matches log order
        drop(written);
    }

    async fn emit_diagnostic(&self, outcome: &RunOutcome) {
        if let Some(diagnostic) = outcome.diagnostic() {
            self.emit(diagnostic.as_bytes()).await;
        }
    }
}

async fn pump<R>(mut reader: R, tee: Arc<Tee>, chunk_size: usize)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; chunk_size];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => tee.emit(&buf[..n]).await,
            Err(e) => {
                debug!(key = %tee.key, "Output read failed: {}", e);
                break;
            }
        }
    }
}
