//! Common test utilities for in-process API testing with mocks.
//!
//! This module provides a test fixture that builds the router with a mock
//! provider and a temporary database, so requests can be driven without a
//! network listener or a real provider.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use stepline_core::{
    create_authenticator, load_config_from_str, testing::MockProvider, CycleOrchestrator,
    SqliteJobStore, SqliteTickLock, StaticStepCatalog,
};
use stepline_server::state::AppState;

/// Re-export fixtures for test convenience
pub use stepline_core::testing::fixtures;

/// Secret accepted by fixtures built with [`TestConfig::with_secret`].
pub const TEST_SECRET: &str = "test-cron-secret";

/// Test fixture with an in-process router.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_pipeline_creation() {
///     let fixture = TestFixture::new();
///
///     let response = fixture.post("/api/v1/pipelines", json!({
///         "template": "protect",
///         "input_ref": "img://1"
///     })).await;
///
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock provider - script job statuses and submission errors
    pub provider: Arc<MockProvider>,
    /// Store behind the router, for direct assertions
    pub store: Arc<SqliteJobStore>,
    /// Lease table behind the router
    pub lock: Arc<SqliteTickLock>,
    /// Temporary directory holding the test database
    pub temp_dir: TempDir,
}

/// Options for building a fixture.
#[derive(Debug, Default)]
pub struct TestConfig {
    /// Require this shared secret on the scheduler routes.
    pub secret: Option<String>,
    /// Provider slot cap (default 3).
    pub max_concurrent_jobs: Option<u32>,
}

impl TestConfig {
    pub fn with_secret() -> Self {
        Self {
            secret: Some(TEST_SECRET.to_string()),
            ..Default::default()
        }
    }
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub text: String,
}

impl TestFixture {
    /// Create a new test fixture without trigger authentication.
    pub fn new() -> Self {
        Self::with_config(TestConfig::default())
    }

    /// Create a test fixture with custom configuration.
    pub fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let auth = match &test_config.secret {
            Some(secret) => format!("method = \"shared_secret\"\nsecret = \"{}\"", secret),
            None => "method = \"none\"".to_string(),
        };
        let toml = format!(
            r#"
[auth]
{auth}

[server]
host = "127.0.0.1"
port = 8080

[database]
path = "{db}"

[scheduler]
max_concurrent_jobs = {cap}
provider_call_timeout_secs = 5

[provider]
url = "http://provider.invalid"

[[pipelines]]
name = "protect"
steps = [
    {{ method = "cloak", config = {{ intensity = "high" }} }},
    {{ method = "watermark" }},
    {{ method = "verify" }},
]

[[pipelines]]
name = "quick"
steps = [{{ method = "cloak" }}]
"#,
            auth = auth,
            db = db_path.display(),
            cap = test_config.max_concurrent_jobs.unwrap_or(3),
        );
        let config = load_config_from_str(&toml).expect("Failed to parse test config");

        let store = Arc::new(SqliteJobStore::new(&db_path).expect("Failed to create job store"));
        let lock = Arc::new(SqliteTickLock::new(&db_path).expect("Failed to create tick lock"));
        let provider = Arc::new(MockProvider::new());

        let orchestrator = Arc::new(CycleOrchestrator::new(
            config.scheduler.clone(),
            store.clone(),
            lock.clone(),
            provider.clone(),
            Arc::new(StaticStepCatalog::new(config.pipelines.clone())),
        ));

        let authenticator = Arc::from(
            create_authenticator(&config.auth).expect("Failed to create authenticator"),
        );

        let state = Arc::new(AppState::new(
            config,
            authenticator,
            orchestrator,
            store.clone(),
        ));

        let router = stepline_server::api::create_router(state);

        Self {
            router,
            provider,
            store,
            lock,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None, &[]).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body), &[]).await
    }

    /// Send a request with extra headers.
    pub async fn request_with_headers(
        &self,
        method: &str,
        path: &str,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        self.request(method, path, None, headers).await
    }

    /// Trigger a tick the way the external cron does.
    pub async fn tick(&self) -> TestResponse {
        self.request("POST", "/api/v1/scheduler/tick", None, &[("x-cron-secret", TEST_SECRET)])
            .await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let request = match body {
            Some(json) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(serde_json::to_string(&json).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).into_owned();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body, text }
    }
}
