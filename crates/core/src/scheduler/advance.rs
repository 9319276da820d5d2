//! Advance stage: materialize the next step of every completed job.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::job::{AdvanceOutcome, Job, JobError, JobStore, NewJob};
use crate::metrics;
use crate::steps::StepCatalog;

use super::types::{AdvanceReport, SchedulerError};

/// Completed jobs handled per pass.
const ADVANCE_BATCH: i64 = 500;

/// Create PENDING successors for completed jobs that have not been
/// advanced yet, or mark their pipeline complete when no step follows.
///
/// Successors follow the template stored on the completed job. Never
/// dispatches. Safe to repeat: successor insertion is idempotent per
/// pipeline position and each job is advanced at most once.
pub fn advance_jobs(
    store: &dyn JobStore,
    catalog: &dyn StepCatalog,
    now: DateTime<Utc>,
) -> Result<AdvanceReport, SchedulerError> {
    let jobs = store.list_unadvanced(ADVANCE_BATCH)?;
    let mut report = AdvanceReport::default();

    for job in jobs {
        match advance_one(store, catalog, &job, now) {
            Ok(Advanced::Created) => report.created += 1,
            Ok(Advanced::Existing) => {}
            Ok(Advanced::Final) => report.finalized += 1,
            Err(e) => {
                warn!(job_id = job.id, error = %e, "Failed to advance job");
                report.errors.push(format!("job {}: {}", job.id, e));
            }
        }
    }

    Ok(report)
}

enum Advanced {
    Created,
    /// The successor was inserted by an earlier, interrupted pass.
    Existing,
    Final,
}

fn advance_one(
    store: &dyn JobStore,
    catalog: &dyn StepCatalog,
    job: &Job,
    now: DateTime<Utc>,
) -> Result<Advanced, SchedulerError> {
    let (outcome, advanced) = match catalog.next_step(&job.template, job.step_order) {
        Some(step) => {
            let next_order = job.step_order + 1;
            let successor = NewJob {
                pipeline_id: job.pipeline_id.clone(),
                template: job.template.clone(),
                step_order: next_order,
                method: step.method,
                config: step.config,
                // A step without output hands its own input forward.
                input_ref: job
                    .output_ref
                    .clone()
                    .unwrap_or_else(|| job.input_ref.clone()),
                created_at: now,
            };

            let (successor_id, advanced) = match store.insert_successor(successor)? {
                Some(created) => {
                    info!(
                        pipeline_id = %job.pipeline_id,
                        job_id = created.id,
                        step_order = next_order,
                        method = %created.method,
                        "Created successor step"
                    );
                    metrics::SUCCESSORS_CREATED.inc();
                    (created.id, Advanced::Created)
                }
                None => {
                    debug!(
                        pipeline_id = %job.pipeline_id,
                        step_order = next_order,
                        "Successor already exists"
                    );
                    let existing = store
                        .find_step(&job.pipeline_id, next_order)?
                        .ok_or(JobError::Conflict {
                            pipeline_id: job.pipeline_id.clone(),
                            step_order: next_order,
                        })?;
                    (existing.id, Advanced::Existing)
                }
            };

            (
                AdvanceOutcome::Successor {
                    job_id: successor_id,
                },
                advanced,
            )
        }
        None => {
            info!(
                pipeline_id = %job.pipeline_id,
                template = %job.template,
                steps = job.step_order + 1,
                "Pipeline complete"
            );
            metrics::PIPELINES_COMPLETED.inc();
            (AdvanceOutcome::Final, Advanced::Final)
        }
    };

    store.record_advancement(job.id, outcome, now)?;
    Ok(advanced)
}
