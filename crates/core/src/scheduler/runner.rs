//! Cycle orchestrator implementation.
//!
//! One tick runs three stages in a fixed order:
//! - Sync: reconcile dispatched jobs with the provider, reap stalled ones
//! - Advance: create successors for completed jobs
//! - Dispatch: fill free provider slots with pending jobs
//!
//! Ticks are serialized across processes by a persisted lease.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::job::{JobStore, NewJob, PipelineView};
use crate::lease::TickLock;
use crate::metrics;
use crate::provider::ProviderGateway;
use crate::steps::StepCatalog;

use super::advance::advance_jobs;
use super::config::SchedulerConfig;
use super::dispatch::dispatch_jobs;
use super::sync::sync_jobs;
use super::types::{CycleState, SchedulerError, SchedulerStatus, SyncReport, TickReport};

/// Name of the lease guarding ticks and scoped syncs.
pub const TICK_LEASE: &str = "scheduler_tick";

/// Everything a tick needs; cloned into the timer task.
#[derive(Clone)]
struct TickContext {
    config: SchedulerConfig,
    store: Arc<dyn JobStore>,
    lock: Arc<dyn TickLock>,
    provider: Arc<dyn ProviderGateway>,
    catalog: Arc<dyn StepCatalog>,
    instance_id: String,
    state: Arc<RwLock<CycleState>>,
    last_report: Arc<RwLock<Option<TickReport>>>,
}

impl TickContext {
    /// Holder name unique to one invocation, so two ticks of the same
    /// process never share a lease.
    fn holder(&self, invocation: &str) -> String {
        format!("{}:{}", self.instance_id, invocation)
    }

    async fn set_state(&self, state: CycleState) {
        *self.state.write().await = state;
    }

    async fn run_tick(&self, now: DateTime<Utc>) -> TickReport {
        let started = Instant::now();
        let tick_id = Uuid::new_v4().to_string();
        let holder = self.holder(&tick_id);
        let mut report = TickReport::new(tick_id.clone(), now);

        match self
            .lock
            .try_acquire(TICK_LEASE, &holder, self.config.lease_ttl(), now)
        {
            Ok(true) => {}
            Ok(false) => {
                debug!(tick_id = %tick_id, "Another tick holds the lease, skipping");
                report.skipped = true;
                metrics::TICKS_TOTAL.with_label_values(&["skipped"]).inc();
                return report;
            }
            Err(e) => {
                error!(tick_id = %tick_id, error = %e, "Failed to acquire tick lease");
                report.skipped = true;
                report.errors.push(format!("lease: {}", e));
                metrics::TICKS_TOTAL.with_label_values(&["skipped"]).inc();
                return report;
            }
        }

        debug!(tick_id = %tick_id, "Tick started");

        self.set_state(CycleState::Syncing).await;
        match sync_jobs(
            self.store.as_ref(),
            self.provider.as_ref(),
            &self.config,
            None,
            now,
        )
        .await
        {
            Ok(sync) => {
                report.synced = sync.completed + sync.failed;
                report.reaped = sync.reaped;
            }
            Err(e) => {
                error!(tick_id = %tick_id, error = %e, "Sync stage failed");
                report.errors.push(format!("sync: {}", e));
            }
        }

        self.set_state(CycleState::Advancing).await;
        match advance_jobs(self.store.as_ref(), self.catalog.as_ref(), now) {
            Ok(advance) => {
                report.advanced = advance.created;
                report.finalized = advance.finalized;
            }
            Err(e) => {
                error!(tick_id = %tick_id, error = %e, "Advance stage failed");
                report.errors.push(format!("advance: {}", e));
            }
        }

        self.set_state(CycleState::Dispatching).await;
        match dispatch_jobs(
            self.store.as_ref(),
            self.provider.as_ref(),
            &self.config,
            now,
        )
        .await
        {
            Ok(dispatch) => {
                report.dispatched = dispatch.dispatched;
                report.dispatch_failed = dispatch.failed;
            }
            Err(e) => {
                error!(tick_id = %tick_id, error = %e, "Dispatch stage failed");
                report.errors.push(format!("dispatch: {}", e));
            }
        }

        self.set_state(CycleState::Idle).await;

        if let Err(e) = self.lock.release(TICK_LEASE, &holder) {
            // The lease expires on its own.
            warn!(tick_id = %tick_id, error = %e, "Failed to release tick lease");
        }

        let elapsed = started.elapsed();
        report.duration_ms = elapsed.as_millis() as u64;

        let result = if report.errors.is_empty() {
            "ok"
        } else if report.all_stages_failed() {
            "failed"
        } else {
            "partial"
        };
        metrics::TICKS_TOTAL.with_label_values(&[result]).inc();
        metrics::TICK_DURATION.observe(elapsed.as_secs_f64());

        info!(
            tick_id = %tick_id,
            synced = report.synced,
            reaped = report.reaped,
            advanced = report.advanced,
            finalized = report.finalized,
            dispatched = report.dispatched,
            dispatch_failed = report.dispatch_failed,
            errors = report.errors.len(),
            duration_ms = report.duration_ms,
            "Tick complete"
        );

        *self.last_report.write().await = Some(report.clone());
        report
    }
}

/// Drives pipelines forward one tick at a time.
pub struct CycleOrchestrator {
    ctx: TickContext,

    // Runtime state
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl CycleOrchestrator {
    /// Create a new orchestrator.
    pub fn new(
        config: SchedulerConfig,
        store: Arc<dyn JobStore>,
        lock: Arc<dyn TickLock>,
        provider: Arc<dyn ProviderGateway>,
        catalog: Arc<dyn StepCatalog>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            ctx: TickContext {
                config,
                store,
                lock,
                provider,
                catalog,
                instance_id: Uuid::new_v4().to_string(),
                state: Arc::new(RwLock::new(CycleState::Idle)),
                last_report: Arc::new(RwLock::new(None)),
            },
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.ctx.config
    }

    /// Run one tick now.
    pub async fn run_tick(&self) -> TickReport {
        self.run_tick_at(Utc::now()).await
    }

    /// Run one tick with an explicit clock reading.
    ///
    /// `now` drives the stall rule and lease expiry.
    pub async fn run_tick_at(&self, now: DateTime<Utc>) -> TickReport {
        self.ctx.run_tick(now).await
    }

    /// Sync the dispatched jobs of one pipeline.
    ///
    /// Returns `Ok(None)` when a tick currently holds the lease.
    pub async fn sync_pipeline(
        &self,
        pipeline_id: &str,
    ) -> Result<Option<SyncReport>, SchedulerError> {
        self.sync_pipeline_at(pipeline_id, Utc::now()).await
    }

    pub async fn sync_pipeline_at(
        &self,
        pipeline_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SyncReport>, SchedulerError> {
        let holder = self.ctx.holder(&format!("sync-{}", Uuid::new_v4()));
        if !self
            .ctx
            .lock
            .try_acquire(TICK_LEASE, &holder, self.ctx.config.lease_ttl(), now)?
        {
            debug!(pipeline_id, "Tick in progress, skipping scoped sync");
            return Ok(None);
        }

        let result = sync_jobs(
            self.ctx.store.as_ref(),
            self.ctx.provider.as_ref(),
            &self.ctx.config,
            Some(pipeline_id),
            now,
        )
        .await;

        if let Err(e) = self.ctx.lock.release(TICK_LEASE, &holder) {
            warn!(pipeline_id, error = %e, "Failed to release tick lease");
        }

        result.map(Some)
    }

    /// Create step 0 of a new pipeline from a template.
    pub fn start_pipeline(
        &self,
        template: &str,
        input_ref: &str,
    ) -> Result<PipelineView, SchedulerError> {
        let entry = self
            .ctx
            .catalog
            .entry_step(template)
            .ok_or_else(|| SchedulerError::UnknownTemplate(template.to_string()))?;

        let pipeline_id = Uuid::new_v4().to_string();
        let job = self.ctx.store.create_entry(NewJob {
            pipeline_id: pipeline_id.clone(),
            template: template.to_string(),
            step_order: 0,
            method: entry.method,
            config: entry.config,
            input_ref: input_ref.to_string(),
            created_at: Utc::now(),
        })?;

        info!(
            pipeline_id = %pipeline_id,
            template,
            job_id = job.id,
            "Pipeline started"
        );

        Ok(PipelineView::derive(pipeline_id, vec![job], None))
    }

    /// Current view of a pipeline.
    pub fn pipeline_view(&self, pipeline_id: &str) -> Result<PipelineView, SchedulerError> {
        let jobs = self.ctx.store.list_by_pipeline(pipeline_id)?;
        let Some(last) = jobs.last() else {
            return Err(SchedulerError::PipelineNotFound(pipeline_id.to_string()));
        };

        let advancement = self.ctx.store.advancement(last.id)?;
        Ok(PipelineView::derive(pipeline_id, jobs, advancement.as_ref()))
    }

    /// Start the in-process timer.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Scheduler already running");
            return;
        }

        info!(
            interval_ms = self.ctx.config.tick_interval_ms,
            max_concurrent_jobs = self.ctx.config.max_concurrent_jobs,
            "Starting scheduler"
        );

        self.spawn_tick_loop();
    }

    /// Stop the in-process timer. A tick in progress finishes.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Scheduler not running");
            return;
        }

        info!("Stopping scheduler");
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Get current scheduler status.
    pub async fn status(&self) -> SchedulerStatus {
        let jobs_by_status: BTreeMap<String, i64> = match self.ctx.store.count_by_status() {
            Ok(counts) => counts
                .into_iter()
                .map(|(status, count)| (status.as_str().to_string(), count))
                .collect(),
            Err(e) => {
                warn!(error = %e, "Failed to count jobs");
                BTreeMap::new()
            }
        };

        let lease = self.ctx.lock.current(TICK_LEASE).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read tick lease");
            None
        });

        SchedulerStatus {
            running: self.is_running(),
            state: *self.ctx.state.read().await,
            max_concurrent_jobs: self.ctx.config.max_concurrent_jobs,
            dispatched: self.ctx.store.count_dispatched().unwrap_or(0),
            jobs_by_status,
            last_tick: self.ctx.last_report.read().await.clone(),
            lease,
        }
    }

    /// Spawn the periodic tick task.
    fn spawn_tick_loop(&self) {
        let running = Arc::clone(&self.running);
        let ctx = self.ctx.clone();
        let interval = self.ctx.config.tick_interval();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Tick loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Tick loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        ctx.run_tick(Utc::now()).await;
                    }
                }
            }
            info!("Tick loop stopped");
        });
    }
}
