//! Run outcome models

/// Terminal result of a single phase run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Process exited with status 0
    Success,

    /// Process exited unsuccessfully; `None` when killed by a signal
    NonZeroExit(Option<i32>),

    /// Waiting on the child failed
    WaitFailure(String),

    /// The command could not be launched
    SpawnFailure(String),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success)
    }

    /// Diagnostic line written to the run's log, if the outcome warrants one
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            RunOutcome::Success => None,
            RunOutcome::NonZeroExit(Some(code)) => {
                Some(format!("command failed: exit status {}\n", code))
            }
            RunOutcome::NonZeroExit(None) => Some("command terminated by signal\n".to_string()),
            RunOutcome::WaitFailure(reason) => {
                Some(format!("failed to wait for command: {}\n", reason))
            }
            RunOutcome::SpawnFailure(reason) => {
                Some(format!("failed to start command: {}\n", reason))
            }
        }
    }
}
