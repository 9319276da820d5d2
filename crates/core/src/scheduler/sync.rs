//! Sync stage: reconcile dispatched jobs with the provider.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::job::{Job, JobStatus, JobStore, JobUpdate};
use crate::metrics;
use crate::provider::{ProviderError, ProviderGateway, ProviderJobStatus};

use super::config::SchedulerConfig;
use super::types::{SchedulerError, SyncReport};

/// Error message recorded on jobs failed by the stall rule.
pub const TIMEOUT_MESSAGE: &str = "Timeout Limit Exceeded";

/// Provider polls in flight at once.
const POLL_CONCURRENCY: usize = 8;

/// What a poll told us about a job.
enum Observation {
    /// The job was never given a provider handle.
    NoHandle,
    Reported(ProviderJobStatus),
    Unreachable(ProviderError),
}

async fn observe(
    provider: &dyn ProviderGateway,
    job: &Job,
    call_timeout: std::time::Duration,
) -> Observation {
    let Some(external_id) = job.external_id.as_deref() else {
        return Observation::NoHandle;
    };

    match tokio::time::timeout(call_timeout, provider.status(external_id)).await {
        Ok(Ok(status)) => Observation::Reported(status),
        Ok(Err(e)) => Observation::Unreachable(e),
        Err(_) => Observation::Unreachable(ProviderError::Timeout),
    }
}

/// Whether a dispatched job has gone without change for the whole timeout.
///
/// The boundary is inclusive: exactly `timeout` after the last change counts.
pub fn is_stalled(job: &Job, timeout: chrono::Duration, now: DateTime<Utc>) -> bool {
    now - job.updated_at >= timeout
}

/// Reconcile QUEUED and PROCESSING jobs with the provider.
///
/// Polls run concurrently; status changes are applied one by one as
/// compare-and-set transitions stamped with `now`, so a job another
/// invocation already moved is left alone. Per-job errors are recorded and
/// never stop the pass.
pub async fn sync_jobs(
    store: &dyn JobStore,
    provider: &dyn ProviderGateway,
    config: &SchedulerConfig,
    pipeline_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<SyncReport, SchedulerError> {
    let jobs = store.list_dispatched(pipeline_id)?;
    let mut report = SyncReport::default();

    if jobs.is_empty() {
        return Ok(report);
    }

    let call_timeout = config.provider_call_timeout();
    let observations: Vec<(Job, Observation)> = stream::iter(jobs)
        .map(|job| async move {
            let observation = observe(provider, &job, call_timeout).await;
            (job, observation)
        })
        .buffer_unordered(POLL_CONCURRENCY)
        .collect()
        .await;

    for (job, observation) in observations {
        report.checked += 1;
        if let Err(e) = apply(store, config, &job, observation, now, &mut report) {
            warn!(job_id = job.id, error = %e, "Failed to sync job");
            report.errors.push(format!("job {}: {}", job.id, e));
        }
    }

    debug!(
        checked = report.checked,
        completed = report.completed,
        failed = report.failed,
        reaped = report.reaped,
        "Sync pass complete"
    );

    Ok(report)
}

fn apply(
    store: &dyn JobStore,
    config: &SchedulerConfig,
    job: &Job,
    observation: Observation,
    now: DateTime<Utc>,
    report: &mut SyncReport,
) -> Result<(), SchedulerError> {
    match observation {
        Observation::Reported(ProviderJobStatus::Succeeded { output_ref }) => {
            if store.transition(job.id, job.status, JobUpdate::completed(output_ref).at(now))? {
                info!(
                    job_id = job.id,
                    pipeline_id = %job.pipeline_id,
                    step_order = job.step_order,
                    "Job completed"
                );
                metrics::JOBS_FINISHED.with_label_values(&["completed"]).inc();
                report.completed += 1;
            } else {
                debug!(job_id = job.id, "Job changed concurrently, skipping");
            }
            return Ok(());
        }
        Observation::Reported(ProviderJobStatus::Failed { message }) => {
            let update = JobUpdate::failed(message.clone()).at(now);
            if store.transition(job.id, job.status, update)? {
                warn!(
                    job_id = job.id,
                    pipeline_id = %job.pipeline_id,
                    error = %message,
                    "Provider reported job failure"
                );
                metrics::JOBS_FINISHED
                    .with_label_values(&["provider_failed"])
                    .inc();
                report.failed += 1;
            }
            return Ok(());
        }
        // A stalled job is reaped below instead of being promoted.
        Observation::Reported(ProviderJobStatus::Running)
            if job.status == JobStatus::Queued && !is_stalled(job, config.job_timeout(), now) =>
        {
            if store.transition(job.id, JobStatus::Queued, JobUpdate::processing().at(now))? {
                debug!(job_id = job.id, "Job started on provider");
                report.started += 1;
            }
            return Ok(());
        }
        Observation::Unreachable(e) => {
            // Says nothing about the job; only the stall rule below applies.
            debug!(job_id = job.id, error = %e, "Provider poll failed");
            report.errors.push(format!("job {}: {}", job.id, e));
        }
        Observation::Reported(_) | Observation::NoHandle => {}
    }

    if is_stalled(job, config.job_timeout(), now)
        && store.transition(job.id, job.status, JobUpdate::failed(TIMEOUT_MESSAGE).at(now))?
    {
        warn!(
            job_id = job.id,
            pipeline_id = %job.pipeline_id,
            status = %job.status,
            last_update = %job.updated_at,
            "Job exceeded timeout, marking failed"
        );
        metrics::JOBS_FINISHED.with_label_values(&["timeout"]).inc();
        report.reaped += 1;
    }

    Ok(())
}
