//! Pipeline API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use stepline_core::{PipelineView, SchedulerError};
use tracing::{debug, error, warn};

use super::handlers::ErrorResponse;
use crate::state::AppState;

type ApiResult<T> = Result<T, (StatusCode, Json<ErrorResponse>)>;

/// Request body for starting a pipeline.
#[derive(Debug, Deserialize)]
pub struct CreatePipelineRequest {
    /// Template name from the `[[pipelines]]` config.
    pub template: String,
    /// Reference to the input artifact of step 0.
    pub input_ref: String,
}

fn error_response(e: SchedulerError) -> (StatusCode, Json<ErrorResponse>) {
    match e {
        SchedulerError::UnknownTemplate(_) => {
            ErrorResponse::with_status(StatusCode::BAD_REQUEST, e.to_string())
        }
        SchedulerError::PipelineNotFound(_) => {
            ErrorResponse::with_status(StatusCode::NOT_FOUND, e.to_string())
        }
        other => {
            error!(error = %other, "Pipeline request failed");
            ErrorResponse::with_status(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

/// Start a pipeline; its first step waits for the next tick.
pub async fn create_pipeline(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreatePipelineRequest>,
) -> ApiResult<(StatusCode, Json<PipelineView>)> {
    if request.input_ref.trim().is_empty() {
        return Err(ErrorResponse::with_status(
            StatusCode::BAD_REQUEST,
            "input_ref must not be empty",
        ));
    }

    let view = state
        .orchestrator()
        .start_pipeline(&request.template, &request.input_ref)
        .map_err(error_response)?;

    Ok((StatusCode::CREATED, Json(view)))
}

/// Pipeline view, refreshed from the provider first.
///
/// The refresh is best effort: a busy lease or provider error still
/// returns the stored view.
pub async fn get_pipeline(
    State(state): State<Arc<AppState>>,
    Path(pipeline_id): Path<String>,
) -> ApiResult<Json<PipelineView>> {
    match state.orchestrator().sync_pipeline(&pipeline_id).await {
        Ok(Some(report)) if report.changed() > 0 => {
            debug!(pipeline_id = %pipeline_id, changed = report.changed(), "Refreshed pipeline");
        }
        Ok(_) => {}
        Err(e) => {
            warn!(pipeline_id = %pipeline_id, error = %e, "Pipeline refresh failed");
        }
    }

    let view = state
        .orchestrator()
        .pipeline_view(&pipeline_id)
        .map_err(error_response)?;

    Ok(Json(view))
}
