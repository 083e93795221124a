//! Per-(service, phase) run state with single-flight admission

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::models::service::{JobStatus, Phase, RunKey, RunRecord, RunState};

#[derive(Debug, Default)]
struct Slot {
    state: RunState,
    last_success: Option<RunRecord>,
}

/// Tracks which phases are running and when they last succeeded
#[derive(Debug, Default)]
pub struct JobTracker {
    slots: RwLock<HashMap<RunKey, Slot>>,
}

impl JobTracker {
    /// Create a new tracker with every phase idle
    pub fn new() -> Self {
        Self::default()
    }

    /// Move a phase from idle to running. Returns `false`, changing nothing,
    /// when it is already running.
    pub fn try_start(&self, service_id: &str, phase: Phase) -> bool {
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        let slot = slots.entry(RunKey::new(service_id, phase)).or_default();
        if slot.state == RunState::Running {
            return false;
        }
        slot.state = RunState::Running;
        true
    }

    /// Move a phase back to idle
    pub fn finish(&self, service_id: &str, phase: Phase) {
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = slots.get_mut(&RunKey::new(service_id, phase)) {
            slot.state = RunState::Idle;
        }
    }

    /// [`try_start`](Self::try_start), returning a guard that finishes the
    /// phase when dropped
    pub fn acquire(self: &Arc<Self>, service_id: &str, phase: Phase) -> Option<RunGuard> {
        if !self.try_start(service_id, phase) {
            return None;
        }
        Some(RunGuard {
            tracker: self.clone(),
            key: RunKey::new(service_id, phase),
        })
    }

    /// Current state of a phase
    pub fn state(&self, service_id: &str, phase: Phase) -> RunState {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        slots
            .get(&RunKey::new(service_id, phase))
            .map(|slot| slot.state)
            .unwrap_or_default()
    }

    /// Record a successful completion
    pub fn record_success(&self, service_id: &str, phase: Phase, record: RunRecord) {
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        slots
            .entry(RunKey::new(service_id, phase))
            .or_default()
            .last_success = Some(record);
    }

    /// Last successful completion of a phase
    pub fn last_success(&self, service_id: &str, phase: Phase) -> Option<RunRecord> {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        slots
            .get(&RunKey::new(service_id, phase))
            .and_then(|slot| slot.last_success.clone())
    }

    /// Combined status of a service. A running build wins over a running
    /// deploy.
    pub fn status(&self, service_id: &str) -> JobStatus {
        if self.state(service_id, Phase::Build) == RunState::Running {
            JobStatus::Building
        } else if self.state(service_id, Phase::Deploy) == RunState::Running {
            JobStatus::Deploying
        } else {
            JobStatus::Idle
        }
    }
}

/// Admission to run one phase; the phase returns to idle when this is
/// dropped, whichever way the run ended.
#[derive(Debug)]
pub struct RunGuard {
    tracker: Arc<JobTracker>,
    key: RunKey,
}

impl RunGuard {
    pub fn phase(&self) -> Phase {
        self.key.phase
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.tracker.finish(&self.key.service_id, self.key.phase);
    }
}
