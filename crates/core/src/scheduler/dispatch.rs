//! Dispatch stage: fill free provider slots with pending jobs.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::job::{Job, JobStatus, JobStore, JobUpdate, Tier};
use crate::metrics;
use crate::provider::{ProviderError, ProviderGateway, SubmitRequest};

use super::config::SchedulerConfig;
use super::types::{DispatchReport, SchedulerError};

/// Pick the jobs to submit this pass.
///
/// Continuations (later steps of started pipelines) first, then entry
/// steps for whatever slots remain, FIFO within each tier.
fn select(store: &dyn JobStore, slots: i64) -> Result<Vec<Job>, SchedulerError> {
    let mut selected = store.list_pending(Tier::Continuation, slots)?;

    let remaining = slots - selected.len() as i64;
    if remaining > 0 {
        selected.extend(store.list_pending(Tier::Entry, remaining)?);
    }

    Ok(selected)
}

async fn submit(
    provider: &dyn ProviderGateway,
    job: &Job,
    config: &SchedulerConfig,
) -> Result<String, ProviderError> {
    let request = SubmitRequest {
        job_id: job.id,
        pipeline_id: job.pipeline_id.clone(),
        step_order: job.step_order,
        method: job.method.clone(),
        config: job.config.clone(),
        input_ref: job.input_ref.clone(),
    };

    tokio::time::timeout(config.provider_call_timeout(), provider.submit(&request))
        .await
        .unwrap_or(Err(ProviderError::Timeout))
}

/// Submit pending jobs while keeping dispatched jobs at or below
/// `max_concurrent_jobs`.
///
/// Slots are derived from persisted QUEUED and PROCESSING rows. Slots
/// freed by a failed submission are not refilled in the same pass.
/// Transitions are stamped with `now`.
pub async fn dispatch_jobs(
    store: &dyn JobStore,
    provider: &dyn ProviderGateway,
    config: &SchedulerConfig,
    now: DateTime<Utc>,
) -> Result<DispatchReport, SchedulerError> {
    let in_flight = store.count_dispatched()?;
    let slots = config.max_concurrent_jobs as i64 - in_flight;

    let mut report = DispatchReport {
        available_slots: slots.max(0),
        ..Default::default()
    };

    if slots <= 0 {
        debug!(in_flight, "No free provider slots");
        return Ok(report);
    }

    let selected = select(store, slots)?;
    report.selected = selected.len() as u32;

    for job in selected {
        match submit(provider, &job, config).await {
            Ok(external_id) => {
                let update = JobUpdate::queued(&external_id).at(now);
                match store.transition(job.id, JobStatus::Pending, update) {
                    Ok(true) => {
                        info!(
                            job_id = job.id,
                            pipeline_id = %job.pipeline_id,
                            step_order = job.step_order,
                            external_id = %external_id,
                            "Job dispatched"
                        );
                        metrics::JOBS_DISPATCHED.inc();
                        report.dispatched += 1;
                    }
                    Ok(false) => {
                        // The provider runs a job this row no longer tracks.
                        error!(
                            job_id = job.id,
                            external_id = %external_id,
                            "Job left PENDING during submission; provider job is orphaned"
                        );
                        report
                            .errors
                            .push(format!("job {}: changed during submission", job.id));
                    }
                    Err(e) => {
                        error!(job_id = job.id, external_id = %external_id, error = %e, "Failed to record dispatch");
                        report.errors.push(format!("job {}: {}", job.id, e));
                    }
                }
            }
            Err(e) => {
                warn!(
                    job_id = job.id,
                    pipeline_id = %job.pipeline_id,
                    error = %e,
                    "Job submission failed"
                );
                metrics::DISPATCH_FAILURES.inc();
                let message = format!("Submission failed: {}", e);
                match store.transition(job.id, JobStatus::Pending, JobUpdate::failed(message).at(now)) {
                    Ok(true) => report.failed += 1,
                    Ok(false) => {}
                    Err(store_err) => {
                        report.errors.push(format!("job {}: {}", job.id, store_err));
                    }
                }
            }
        }
    }

    Ok(report)
}
