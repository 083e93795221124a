//! Service models

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A service definition, loaded once from the config file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Service {
    /// Unique service ID
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Shell command run for the build phase
    #[serde(alias = "buildScript")]
    pub build_command: String,

    /// Shell command run for the deploy phase
    #[serde(alias = "deployScript")]
    pub deploy_command: String,

    /// Working directory for both phases
    #[serde(alias = "path")]
    pub working_dir: PathBuf,
}

impl Service {
    /// Get the shell command for a phase
    pub fn command(&self, phase: Phase) -> &str {
        match phase {
            Phase::Build => &self.build_command,
            Phase::Deploy => &self.deploy_command,
        }
    }

    /// Display name, falling back to the ID
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// The two independent run types of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Build,
    Deploy,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Build => "build",
            Phase::Deploy => "deploy",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "build" => Ok(Phase::Build),
            "deploy" => Ok(Phase::Deploy),
            _ => Err(format!("Invalid phase: {}", s)),
        }
    }
}

/// Identifies one (service, phase) pair: a run slot, a log entry and a
/// broadcast channel all share this key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunKey {
    pub service_id: String,
    pub phase: Phase,
}

impl RunKey {
    pub fn new(service_id: impl Into<String>, phase: Phase) -> Self {
        Self {
            service_id: service_id.into(),
            phase,
        }
    }
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.service_id, self.phase)
    }
}

/// Run state of a single (service, phase)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Idle,
    Running,
}

/// Metadata of the last successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// When the run completed
    pub finished_at: DateTime<Utc>,

    /// SHA-256 digest of the working tree at run time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tree_digest: Option<String>,
}

/// Service status as shown to users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Idle,
    Building,
    Deploying,
}

/// Status snapshot of a service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub id: String,
    pub name: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_build: Option<RunRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_deploy: Option<RunRecord>,
}
