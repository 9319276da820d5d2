//! Authentication and metrics middleware for API routes.

use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{request::Parts, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;
use stepline_core::{AuthError, AuthRequest, Identity};
use tracing::debug;

use crate::metrics::{
    normalize_path, AUTH_FAILURES_TOTAL, HTTP_REQUESTS_IN_FLIGHT, HTTP_REQUESTS_TOTAL,
    HTTP_REQUEST_DURATION,
};
use crate::state::AppState;

/// Metrics middleware that tracks HTTP request duration and counts.
///
/// This middleware records:
/// - Request duration (histogram)
/// - Request count (counter)
/// - Requests in flight (gauge)
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());

    HTTP_REQUESTS_IN_FLIGHT.inc();

    let response = next.run(request).await;

    HTTP_REQUESTS_IN_FLIGHT.dec();

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    HTTP_REQUEST_DURATION
        .with_label_values(&[&method, &path, &status])
        .observe(duration);
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();

    response
}

/// Authentication middleware for the scheduler trigger routes.
///
/// Rejects with 401 when the configured authenticator does not accept the
/// request. The accepted [`Identity`] is stored in the request extensions.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let authenticator = state.authenticator();

    if authenticator.method_name() == "none" {
        request.extensions_mut().insert(Identity::anonymous());
        return Ok(next.run(request).await);
    }

    let headers: HashMap<String, String> = request
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect();

    // Only present when served with connect info
    let source_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

    let auth_request = AuthRequest { headers, source_ip };

    match authenticator.authenticate(&auth_request).await {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            Ok(next.run(request).await)
        }
        Err(AuthError::NotAuthenticated) => {
            debug!(%source_ip, "Trigger without credentials");
            AUTH_FAILURES_TOTAL
                .with_label_values(&["not_authenticated"])
                .inc();
            Err(StatusCode::UNAUTHORIZED)
        }
        Err(AuthError::InvalidCredentials(_)) => {
            debug!(%source_ip, "Trigger with wrong credentials");
            AUTH_FAILURES_TOTAL
                .with_label_values(&["invalid_credentials"])
                .inc();
            Err(StatusCode::UNAUTHORIZED)
        }
        Err(_) => {
            AUTH_FAILURES_TOTAL
                .with_label_values(&["internal_error"])
                .inc();
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Extractor for the authenticated caller name.
///
/// Falls back to "anonymous" on routes without the auth middleware.
#[derive(Debug, Clone)]
pub struct Caller(pub String);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let caller = parts
            .extensions
            .get::<Identity>()
            .map(|id| id.caller.clone())
            .unwrap_or_else(|| "anonymous".to_string());
        std::future::ready(Ok(Caller(caller)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{header, Request},
        middleware,
        routing::get,
        Router,
    };
    use http_body_util::BodyExt;
    use stepline_core::{
        create_authenticator,
        config::{AuthConfig, AuthMethod},
        load_config_from_str,
        testing::{fixtures, MockProvider},
        CycleOrchestrator, SqliteJobStore, SqliteTickLock,
    };
    use tower::ServiceExt;

    const SECRET_CONFIG: &str = r#"
[auth]
method = "shared_secret"
secret = "cron-secret"

[provider]
url = "http://localhost:9000"
"#;

    async fn caller_handler(Caller(caller): Caller) -> String {
        caller
    }

    fn create_test_state(auth: AuthConfig) -> Arc<AppState> {
        let mut config = load_config_from_str(SECRET_CONFIG).unwrap();
        config.auth = auth;

        let authenticator = Arc::from(create_authenticator(&config.auth).unwrap());
        let store = Arc::new(SqliteJobStore::in_memory().unwrap());
        let orchestrator = Arc::new(CycleOrchestrator::new(
            config.scheduler.clone(),
            store.clone(),
            Arc::new(SqliteTickLock::in_memory().unwrap()),
            Arc::new(MockProvider::new()),
            Arc::new(fixtures::protect_catalog()),
        ));

        Arc::new(AppState::new(config, authenticator, orchestrator, store))
    }

    fn shared_secret() -> AuthConfig {
        AuthConfig {
            method: AuthMethod::SharedSecret,
            secret: Some("cron-secret".to_string()),
            header: "x-cron-secret".to_string(),
        }
    }

    fn app(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/test", get(caller_handler))
            .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
            .with_state(state)
    }

    async fn send(app: Router, header: Option<(&str, &str)>) -> (StatusCode, String) {
        let mut builder = Request::builder().uri("/test");
        if let Some((name, value)) = header {
            builder = builder.header(name, value);
        }
        let response = app
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_none_auth_allows_all() {
        let state = create_test_state(AuthConfig {
            method: AuthMethod::None,
            secret: None,
            header: "x-cron-secret".to_string(),
        });

        let (status, caller) = send(app(state), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(caller, "anonymous");
    }

    #[tokio::test]
    async fn test_secret_header_accepted() {
        let state = create_test_state(shared_secret());

        let (status, caller) = send(app(state), Some(("x-cron-secret", "cron-secret"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(caller, "anonymous");
    }

    #[tokio::test]
    async fn test_bearer_token_accepted() {
        let state = create_test_state(shared_secret());

        let (status, _) = send(
            app(state),
            Some((header::AUTHORIZATION.as_str(), "Bearer cron-secret")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_wrong_secret_rejected() {
        let state = create_test_state(shared_secret());

        let (status, _) = send(app(state), Some(("x-cron-secret", "guess"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_missing_secret_rejected() {
        let state = create_test_state(shared_secret());

        let (status, _) = send(app(state), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
