//! Types for the tick scheduler.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::JobError;
use crate::lease::{LeaseError, LeaseInfo};
use crate::provider::ProviderError;

/// Errors that can occur while scheduling.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Job store error.
    #[error("job store error: {0}")]
    Store(#[from] JobError),

    /// Tick lease error.
    #[error("lease error: {0}")]
    Lease(#[from] LeaseError),

    /// Provider error.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// No pipeline template with this name.
    #[error("unknown pipeline template: {0}")]
    UnknownTemplate(String),

    /// No jobs exist for this pipeline.
    #[error("pipeline not found: {0}")]
    PipelineNotFound(String),
}

/// Stage the scheduler is currently executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    #[default]
    Idle,
    Syncing,
    Advancing,
    Dispatching,
}

/// Outcome of one Sync pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Dispatched jobs examined.
    pub checked: u32,
    /// Jobs the provider reported as succeeded.
    pub completed: u32,
    /// Jobs the provider reported as failed.
    pub failed: u32,
    /// Jobs failed by the stall rule.
    pub reaped: u32,
    /// QUEUED jobs observed running.
    pub started: u32,
    /// Per-job errors; none of them stopped the pass.
    pub errors: Vec<String>,
}

impl SyncReport {
    /// Number of jobs moved to a terminal status.
    pub fn changed(&self) -> u32 {
        self.completed + self.failed + self.reaped
    }
}

/// Outcome of one Advance pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvanceReport {
    /// Successor steps inserted.
    pub created: u32,
    /// Pipelines whose last step completed.
    pub finalized: u32,
    pub errors: Vec<String>,
}

/// Outcome of one Dispatch pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchReport {
    /// Free provider slots at the start of the pass.
    pub available_slots: i64,
    /// Pending jobs chosen for submission.
    pub selected: u32,
    /// Jobs accepted by the provider.
    pub dispatched: u32,
    /// Jobs whose submission failed.
    pub failed: u32,
    pub errors: Vec<String>,
}

/// Summary of one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub tick_id: String,
    pub started_at: DateTime<Utc>,
    /// Another invocation held the tick lease.
    pub skipped: bool,
    /// Jobs completed or failed as reported by the provider.
    pub synced: u32,
    /// Jobs failed by the stall rule.
    pub reaped: u32,
    /// Successor steps created.
    pub advanced: u32,
    /// Pipelines completed.
    pub finalized: u32,
    pub dispatched: u32,
    pub dispatch_failed: u32,
    /// Stage-level errors. A failing stage does not stop later stages.
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl TickReport {
    pub(crate) fn new(tick_id: String, started_at: DateTime<Utc>) -> Self {
        Self {
            tick_id,
            started_at,
            skipped: false,
            synced: 0,
            reaped: 0,
            advanced: 0,
            finalized: 0,
            dispatched: 0,
            dispatch_failed: 0,
            errors: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Number of stages in a tick.
    pub const STAGES: usize = 3;

    /// Every stage failed.
    pub fn all_stages_failed(&self) -> bool {
        !self.skipped && self.errors.len() >= Self::STAGES
    }
}

/// Current status of the scheduler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerStatus {
    /// Whether the in-process timer is running.
    pub running: bool,
    pub state: CycleState,
    pub max_concurrent_jobs: u32,
    /// Jobs currently holding a provider slot.
    pub dispatched: i64,
    /// Job counts by status.
    pub jobs_by_status: BTreeMap<String, i64>,
    pub last_tick: Option<TickReport>,
    pub lease: Option<LeaseInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_report_changed() {
        let report = SyncReport {
            checked: 6,
            completed: 2,
            failed: 1,
            reaped: 1,
            started: 1,
            errors: vec![],
        };
        assert_eq!(report.changed(), 4);
    }

    #[test]
    fn test_all_stages_failed() {
        let mut report = TickReport::new("t".to_string(), Utc::now());
        assert!(!report.all_stages_failed());

        report.errors = vec!["sync".into(), "advance".into(), "dispatch".into()];
        assert!(report.all_stages_failed());

        report.skipped = true;
        assert!(!report.all_stages_failed());
    }

    #[test]
    fn test_error_display() {
        let err = SchedulerError::UnknownTemplate("protect".to_string());
        assert_eq!(err.to_string(), "unknown pipeline template: protect");

        let err = SchedulerError::from(JobError::NotFound(7));
        assert_eq!(err.to_string(), "job store error: Job not found: 7");
    }

    #[test]
    fn test_cycle_state_serialization() {
        let json = serde_json::to_string(&CycleState::Dispatching).unwrap();
        assert_eq!(json, "\"dispatching\"");
    }
}
