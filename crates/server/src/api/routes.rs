use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::middleware::{auth_middleware, metrics_middleware};
use super::{handlers, pipelines, scheduler};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Trigger routes require the shared secret
    let scheduler_routes = Router::new()
        .route("/scheduler/tick", post(scheduler::tick))
        .route("/scheduler/status", get(scheduler::status))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Pipelines
        .route("/pipelines", post(pipelines::create_pipeline))
        .route("/pipelines/{id}", get(pipelines::get_pipeline))
        .merge(scheduler_routes);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
