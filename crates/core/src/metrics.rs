//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Scheduler ticks (outcome, duration)
//! - Job lifecycle (dispatch, completion, failure, timeouts)
//! - Pipeline progression (successors, completed pipelines)
//! - Provider calls

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Scheduler Tick Metrics
// =============================================================================

/// Ticks total by result.
pub static TICKS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("stepline_ticks_total", "Total scheduler ticks"),
        &["result"], // "ok", "partial", "failed", "skipped"
    )
    .unwrap()
});

/// Tick duration in seconds.
pub static TICK_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "stepline_tick_duration_seconds",
            "Duration of a full sync/advance/dispatch tick",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
    )
    .unwrap()
});

// =============================================================================
// Job Metrics
// =============================================================================

/// Jobs submitted to the provider.
pub static JOBS_DISPATCHED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "stepline_jobs_dispatched_total",
        "Total jobs submitted to the provider",
    )
    .unwrap()
});

/// Submissions the provider did not accept.
pub static DISPATCH_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "stepline_dispatch_failures_total",
        "Total job submissions that failed",
    )
    .unwrap()
});

/// Jobs reaching a terminal status, by outcome.
pub static JOBS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("stepline_jobs_finished_total", "Jobs that reached a terminal status"),
        &["outcome"], // "completed", "provider_failed", "timeout"
    )
    .unwrap()
});

// =============================================================================
// Pipeline Metrics
// =============================================================================

/// Successor steps created by Advance.
pub static SUCCESSORS_CREATED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "stepline_successors_created_total",
        "Total successor steps created",
    )
    .unwrap()
});

/// Pipelines whose final step completed.
pub static PIPELINES_COMPLETED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "stepline_pipelines_completed_total",
        "Total pipelines completed",
    )
    .unwrap()
});

// =============================================================================
// Provider Metrics
// =============================================================================

/// Provider call duration.
pub static PROVIDER_CALL_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "stepline_provider_call_duration_seconds",
            "Duration of provider calls",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["operation"],
    )
    .unwrap()
});

/// Provider calls total.
pub static PROVIDER_CALLS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("stepline_provider_calls_total", "Total provider calls"),
        &["operation", "result"], // result: "ok", "transient_error", "error"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Ticks
        Box::new(TICKS_TOTAL.clone()),
        Box::new(TICK_DURATION.clone()),
        // Jobs
        Box::new(JOBS_DISPATCHED.clone()),
        Box::new(DISPATCH_FAILURES.clone()),
        Box::new(JOBS_FINISHED.clone()),
        // Pipelines
        Box::new(SUCCESSORS_CREATED.clone()),
        Box::new(PIPELINES_COMPLETED.clone()),
        // Provider
        Box::new(PROVIDER_CALL_DURATION.clone()),
        Box::new(PROVIDER_CALLS_TOTAL.clone()),
    ]
}
