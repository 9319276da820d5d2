//! Job storage trait and error type.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};

use super::{AdvanceOutcome, Advancement, Job, JobStatus, JobUpdate, NewJob, Tier};

/// Error type for job store operations.
#[derive(Debug)]
pub enum JobError {
    /// Job not found.
    NotFound(i64),
    /// A job already occupies this pipeline position.
    Conflict { pipeline_id: String, step_order: u32 },
    /// The requested status change is not a legal edge.
    InvalidTransition {
        job_id: i64,
        from: JobStatus,
        to: JobStatus,
    },
    /// Database error.
    Database(String),
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobError::NotFound(id) => write!(f, "Job not found: {}", id),
            JobError::Conflict {
                pipeline_id,
                step_order,
            } => write!(
                f,
                "Pipeline {} already has a job at step {}",
                pipeline_id, step_order
            ),
            JobError::InvalidTransition { job_id, from, to } => {
                write!(f, "Cannot move job {} from {} to {}", job_id, from, to)
            }
            JobError::Database(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl std::error::Error for JobError {}

/// Durable record of every pipeline step.
///
/// All status changes go through [`JobStore::transition`], a compare-and-set
/// on the current status, so independent invocations cannot double-dispatch
/// or double-reap a job. Slot accounting is derived from persisted rows only.
pub trait JobStore: Send + Sync {
    /// Insert the entry step (step 0) of a new pipeline as PENDING.
    fn create_entry(&self, job: NewJob) -> Result<Job, JobError>;

    /// Insert a PENDING successor step.
    ///
    /// Idempotent per `(pipeline_id, step_order)`: returns `None` when a job
    /// already exists at that position.
    fn insert_successor(&self, job: NewJob) -> Result<Option<Job>, JobError>;

    /// Get a job by ID.
    fn get(&self, id: i64) -> Result<Option<Job>, JobError>;

    /// Find the job at a pipeline position.
    fn find_step(&self, pipeline_id: &str, step_order: u32) -> Result<Option<Job>, JobError>;

    /// All jobs of a pipeline ordered by step.
    fn list_by_pipeline(&self, pipeline_id: &str) -> Result<Vec<Job>, JobError>;

    /// Number of jobs holding a provider slot (QUEUED or PROCESSING).
    fn count_dispatched(&self) -> Result<i64, JobError>;

    /// PENDING jobs of one tier in FIFO order (created_at, then id).
    fn list_pending(&self, tier: Tier, limit: i64) -> Result<Vec<Job>, JobError>;

    /// QUEUED and PROCESSING jobs, optionally scoped to one pipeline.
    fn list_dispatched(&self, pipeline_id: Option<&str>) -> Result<Vec<Job>, JobError>;

    /// COMPLETED jobs that Advance has not handled yet, oldest first.
    fn list_unadvanced(&self, limit: i64) -> Result<Vec<Job>, JobError>;

    /// Atomically move a job from `expected` to `update.status`.
    ///
    /// Returns `Ok(true)` if the row still had `expected` and was updated,
    /// `Ok(false)` if another invocation changed it first.
    fn transition(&self, id: i64, expected: JobStatus, update: JobUpdate)
        -> Result<bool, JobError>;

    /// Record that Advance handled a completed job at `at`. First write wins.
    fn record_advancement(
        &self,
        job_id: i64,
        outcome: AdvanceOutcome,
        at: DateTime<Utc>,
    ) -> Result<(), JobError>;

    /// Advancement record for a job, if any.
    fn advancement(&self, job_id: i64) -> Result<Option<Advancement>, JobError>;

    /// Job counts keyed by status.
    fn count_by_status(&self) -> Result<HashMap<JobStatus, i64>, JobError>;
}
