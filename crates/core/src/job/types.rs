//! Job and pipeline types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a single pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Created, waiting for a free provider slot.
    Pending,
    /// Submitted to the provider, execution not yet observed.
    Queued,
    /// Provider reported that execution started.
    Processing,
    /// Provider reported success.
    Completed,
    /// Provider failure, submission failure, or stall timeout.
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Queued,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    /// Statuses that occupy a provider slot.
    pub const DISPATCHED: [JobStatus; 2] = [JobStatus::Queued, JobStatus::Processing];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Queued => "QUEUED",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn is_dispatched(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Processing)
    }

    /// Whether the store may move a job from `self` to `next`.
    ///
    /// Terminal statuses have no outgoing edges.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Queued)
                | (Pending, Failed)
                | (Queued, Processing)
                | (Queued, Completed)
                | (Queued, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobStatus::Pending),
            "QUEUED" => Ok(JobStatus::Queued),
            "PROCESSING" => Ok(JobStatus::Processing),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// Dispatch priority class of a pending job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Later step of a pipeline that already started (step_order > 0).
    Continuation,
    /// First step of a new pipeline (step_order == 0).
    Entry,
}

impl Tier {
    pub fn of(step_order: u32) -> Self {
        if step_order == 0 {
            Tier::Entry
        } else {
            Tier::Continuation
        }
    }
}

/// A persisted pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Monotonically assigned identifier.
    pub id: i64,
    /// Pipeline this step belongs to.
    pub pipeline_id: String,
    /// Template the pipeline was started from.
    pub template: String,
    /// Zero-based position within the pipeline.
    pub step_order: u32,
    /// Step-type selector, opaque to the scheduler.
    pub method: String,
    /// Step parameters, opaque to the scheduler.
    pub config: serde_json::Value,
    /// Reference to the step's input artifact.
    pub input_ref: String,
    /// Reference to the step's output artifact, once completed.
    pub output_ref: Option<String>,
    /// Provider handle, set only after successful submission.
    pub external_id: Option<String>,
    pub status: JobStatus,
    /// Set only when the job failed.
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Reference point for stall detection.
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn tier(&self) -> Tier {
        Tier::of(self.step_order)
    }
}

/// Fields for inserting a new pending job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub pipeline_id: String,
    pub template: String,
    pub step_order: u32,
    pub method: String,
    pub config: serde_json::Value,
    pub input_ref: String,
    /// Also the job's first `updated_at`.
    pub created_at: DateTime<Utc>,
}

/// Changes applied together with a status transition.
///
/// `None` fields leave the stored value untouched.
#[derive(Debug, Clone)]
pub struct JobUpdate {
    pub status: JobStatus,
    pub external_id: Option<String>,
    pub output_ref: Option<String>,
    pub error_message: Option<String>,
    /// Time of the change; the store's clock when unset.
    pub at: Option<DateTime<Utc>>,
}

impl JobUpdate {
    pub fn queued(external_id: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Queued,
            external_id: Some(external_id.into()),
            output_ref: None,
            error_message: None,
            at: None,
        }
    }

    pub fn processing() -> Self {
        Self {
            status: JobStatus::Processing,
            external_id: None,
            output_ref: None,
            error_message: None,
            at: None,
        }
    }

    pub fn completed(output_ref: Option<String>) -> Self {
        Self {
            status: JobStatus::Completed,
            external_id: None,
            output_ref,
            error_message: None,
            at: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            external_id: None,
            output_ref: None,
            error_message: Some(message.into()),
            at: None,
        }
    }

    /// Stamp the change with the caller's clock.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.at = Some(now);
        self
    }
}

/// What Advance decided for a completed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdvanceOutcome {
    /// A successor step was materialized (or already existed).
    Successor { job_id: i64 },
    /// No further step is defined; the pipeline is complete.
    Final,
}

/// Record that Advance has handled a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advancement {
    pub job_id: i64,
    pub outcome: AdvanceOutcome,
    pub advanced_at: DateTime<Utc>,
}

/// Derived state of a whole pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    /// No jobs exist for this pipeline.
    Unknown,
    /// A step is pending or running.
    InFlight { step_order: u32, status: JobStatus },
    /// The newest step completed and is waiting for Advance.
    Advancing { step_order: u32 },
    /// The newest step failed; no successor will be created.
    Aborted { step_order: u32, error: Option<String> },
    /// Every step completed and no further step is defined.
    Complete { steps: u32 },
}

/// A pipeline with its ordered steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineView {
    pub pipeline_id: String,
    pub state: PipelineState,
    /// Output of the final step when complete.
    pub output_ref: Option<String>,
    pub jobs: Vec<Job>,
}

impl PipelineView {
    /// Derive the view from a pipeline's jobs (ordered by step) and the
    /// advancement record of the newest job, if any.
    pub fn derive(
        pipeline_id: impl Into<String>,
        jobs: Vec<Job>,
        newest_advancement: Option<&Advancement>,
    ) -> Self {
        let pipeline_id = pipeline_id.into();

        let state = match jobs.last() {
            None => PipelineState::Unknown,
            Some(last) => match last.status {
                JobStatus::Pending | JobStatus::Queued | JobStatus::Processing => {
                    PipelineState::InFlight {
                        step_order: last.step_order,
                        status: last.status,
                    }
                }
                JobStatus::Failed => PipelineState::Aborted {
                    step_order: last.step_order,
                    error: last.error_message.clone(),
                },
                JobStatus::Completed => match newest_advancement.map(|a| &a.outcome) {
                    Some(AdvanceOutcome::Final) => PipelineState::Complete {
                        steps: last.step_order + 1,
                    },
                    _ => PipelineState::Advancing {
                        step_order: last.step_order,
                    },
                },
            },
        };

        let output_ref = match state {
            PipelineState::Complete { .. } => jobs.last().and_then(|j| j.output_ref.clone()),
            _ => None,
        };

        Self {
            pipeline_id,
            state,
            output_ref,
            jobs,
        }
    }
}
