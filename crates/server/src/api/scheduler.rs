//! Scheduler trigger handlers.

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use stepline_core::{SchedulerStatus, TickReport};
use tracing::{info, warn};

use super::middleware::Caller;
use crate::state::AppState;

/// Run one tick.
///
/// Responds 500 (still carrying the report) when every stage failed.
pub async fn tick(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
) -> (StatusCode, Json<TickReport>) {
    info!(caller = %caller, "Tick triggered");

    let report = state.orchestrator().run_tick().await;

    let status = if report.all_stages_failed() {
        warn!(tick_id = %report.tick_id, errors = ?report.errors, "Every tick stage failed");
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };

    (status, Json(report))
}

/// Scheduler status: timer state, job counts, last tick and lease holder.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<SchedulerStatus> {
    Json(state.orchestrator().status().await)
}
