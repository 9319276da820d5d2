//! Scheduler trigger API tests.

mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use serde_json::json;

use common::{TestConfig, TestFixture, TEST_SECRET};
use stepline_core::{JobStatus, JobStore, TickLock};

#[tokio::test]
async fn test_tick_requires_secret() {
    let fixture = TestFixture::with_config(TestConfig::with_secret());

    let response = fixture.post("/api/v1/scheduler/tick", json!({})).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = fixture
        .request_with_headers("POST", "/api/v1/scheduler/tick", &[("x-cron-secret", "nope")])
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_tick_accepts_bearer_secret() {
    let fixture = TestFixture::with_config(TestConfig::with_secret());
    let bearer = format!("Bearer {}", TEST_SECRET);

    let response = fixture
        .request_with_headers(
            "POST",
            "/api/v1/scheduler/tick",
            &[("authorization", bearer.as_str())],
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["skipped"], false);
}

#[tokio::test]
async fn test_public_routes_skip_auth() {
    let fixture = TestFixture::with_config(TestConfig::with_secret());

    assert_eq!(fixture.get("/api/v1/health").await.status, StatusCode::OK);
    assert_eq!(fixture.get("/api/v1/config").await.status, StatusCode::OK);
    assert_eq!(fixture.get("/metrics").await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_tick_dispatches_pending_pipeline() {
    let fixture = TestFixture::with_config(TestConfig::with_secret());
    let created = fixture
        .post(
            "/api/v1/pipelines",
            json!({ "template": "protect", "input_ref": "img://1" }),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED);

    let response = fixture.tick().await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["dispatched"], 1);
    assert_eq!(response.body["errors"], json!([]));
    assert!(response.body["tick_id"].is_string());

    let submissions = fixture.provider.submissions().await;
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].request.method, "cloak");
    assert_eq!(submissions[0].request.config, json!({ "intensity": "high" }));
}

#[tokio::test]
async fn test_tick_respects_cap() {
    let fixture = TestFixture::with_config(TestConfig {
        max_concurrent_jobs: Some(2),
        ..Default::default()
    });
    for i in 0..4 {
        fixture
            .post(
                "/api/v1/pipelines",
                json!({ "template": "quick", "input_ref": format!("img://{}", i) }),
            )
            .await;
    }

    let first = fixture.tick().await;
    let second = fixture.tick().await;

    assert_eq!(first.body["dispatched"], 2);
    assert_eq!(second.body["dispatched"], 0);
    assert_eq!(fixture.store.count_dispatched().unwrap(), 2);
}

#[tokio::test]
async fn test_tick_skipped_while_lease_held() {
    let fixture = TestFixture::new();
    fixture
        .lock
        .try_acquire(
            stepline_core::scheduler::TICK_LEASE,
            "other-instance",
            Duration::minutes(5),
            Utc::now(),
        )
        .unwrap();

    let response = fixture.tick().await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["skipped"], true);
}

#[tokio::test]
async fn test_tick_reports_completed_step() {
    let fixture = TestFixture::new();
    let created = fixture
        .post(
            "/api/v1/pipelines",
            json!({ "template": "protect", "input_ref": "img://1" }),
        )
        .await;
    let job_id = created.body["jobs"][0]["id"].as_i64().unwrap();

    fixture.tick().await;
    let ext = fixture.provider.submission_for(job_id).await.unwrap();
    fixture.provider.succeed(&ext, Some("cloaked://1")).await;

    let response = fixture.tick().await;

    assert_eq!(response.body["synced"], 1);
    assert_eq!(response.body["advanced"], 1);
    assert_eq!(response.body["dispatched"], 1);
    assert_eq!(
        fixture.store.get(job_id).unwrap().unwrap().status,
        JobStatus::Completed
    );
}

#[tokio::test]
async fn test_status_endpoint() {
    let fixture = TestFixture::with_config(TestConfig::with_secret());
    fixture
        .post(
            "/api/v1/pipelines",
            json!({ "template": "quick", "input_ref": "img://1" }),
        )
        .await;

    let unauthorized = fixture.get("/api/v1/scheduler/status").await;
    assert_eq!(unauthorized.status, StatusCode::UNAUTHORIZED);

    fixture.tick().await;
    let response = fixture
        .request_with_headers(
            "GET",
            "/api/v1/scheduler/status",
            &[("x-cron-secret", TEST_SECRET)],
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["running"], false);
    assert_eq!(response.body["state"], "idle");
    assert_eq!(response.body["max_concurrent_jobs"], 3);
    assert_eq!(response.body["dispatched"], 1);
    assert_eq!(response.body["jobs_by_status"]["QUEUED"], 1);
    assert_eq!(response.body["last_tick"]["dispatched"], 1);
    assert!(response.body["lease"].is_null());
}

#[tokio::test]
async fn test_metrics_reflect_jobs() {
    let fixture = TestFixture::new();
    fixture
        .post(
            "/api/v1/pipelines",
            json!({ "template": "quick", "input_ref": "img://1" }),
        )
        .await;
    fixture.tick().await;

    let response = fixture.get("/metrics").await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.text.contains("stepline_jobs_by_status"));
    assert!(response.text.contains("stepline_dispatched_jobs"));
    assert!(response.text.contains("stepline_ticks_total"));
    assert!(response.text.contains("stepline_http_requests_total"));
}
