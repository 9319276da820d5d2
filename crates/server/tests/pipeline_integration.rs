//! Pipeline API tests.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::TestFixture;

#[tokio::test]
async fn test_create_pipeline() {
    let fixture = TestFixture::new();

    let response = fixture
        .post(
            "/api/v1/pipelines",
            json!({ "template": "protect", "input_ref": "img://cat" }),
        )
        .await;

    assert_eq!(response.status, StatusCode::CREATED);
    assert!(response.body["pipeline_id"].is_string());
    assert_eq!(response.body["state"]["state"], "in_flight");
    assert_eq!(response.body["state"]["status"], "PENDING");

    let jobs = response.body["jobs"].as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["step_order"], 0);
    assert_eq!(jobs[0]["method"], "cloak");
    assert_eq!(jobs[0]["input_ref"], "img://cat");
    assert_eq!(jobs[0]["template"], "protect");
}

#[tokio::test]
async fn test_create_pipeline_unknown_template() {
    let fixture = TestFixture::new();

    let response = fixture
        .post(
            "/api/v1/pipelines",
            json!({ "template": "missing", "input_ref": "img://cat" }),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn test_create_pipeline_empty_input() {
    let fixture = TestFixture::new();

    let response = fixture
        .post(
            "/api/v1/pipelines",
            json!({ "template": "protect", "input_ref": "  " }),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_pipeline_malformed_json() {
    let fixture = TestFixture::new();

    let response = fixture.post_raw("/api/v1/pipelines", "{ not json").await;

    assert!(response.status.is_client_error());
}

#[tokio::test]
async fn test_get_unknown_pipeline() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/v1/pipelines/does-not-exist").await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_pipeline_refreshes_from_provider() {
    let fixture = TestFixture::new();
    let created = fixture
        .post(
            "/api/v1/pipelines",
            json!({ "template": "protect", "input_ref": "img://cat" }),
        )
        .await;
    let pipeline_id = created.body["pipeline_id"].as_str().unwrap().to_string();
    let job_id = created.body["jobs"][0]["id"].as_i64().unwrap();

    fixture.tick().await;
    let ext = fixture.provider.submission_for(job_id).await.unwrap();
    fixture.provider.set_running(&ext).await;

    let response = fixture
        .get(&format!("/api/v1/pipelines/{}", pipeline_id))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["state"]["status"], "PROCESSING");
    assert_eq!(response.body["jobs"][0]["external_id"], ext.as_str());

    fixture.provider.succeed(&ext, Some("cloaked://cat")).await;
    let response = fixture
        .get(&format!("/api/v1/pipelines/{}", pipeline_id))
        .await;

    // Completed but not yet advanced; the next tick creates step 1
    assert_eq!(response.body["state"]["state"], "advancing");
    assert_eq!(response.body["jobs"][0]["output_ref"], "cloaked://cat");
}

#[tokio::test]
async fn test_get_pipeline_survives_unreachable_provider() {
    let fixture = TestFixture::new();
    let created = fixture
        .post(
            "/api/v1/pipelines",
            json!({ "template": "quick", "input_ref": "img://cat" }),
        )
        .await;
    let pipeline_id = created.body["pipeline_id"].as_str().unwrap().to_string();
    fixture.tick().await;
    fixture.provider.set_unreachable(true).await;

    let response = fixture
        .get(&format!("/api/v1/pipelines/{}", pipeline_id))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["state"]["status"], "QUEUED");
}

#[tokio::test]
async fn test_single_step_pipeline_completes() {
    let fixture = TestFixture::new();
    let created = fixture
        .post(
            "/api/v1/pipelines",
            json!({ "template": "quick", "input_ref": "img://cat" }),
        )
        .await;
    let pipeline_id = created.body["pipeline_id"].as_str().unwrap().to_string();
    let job_id = created.body["jobs"][0]["id"].as_i64().unwrap();

    fixture.tick().await;
    let ext = fixture.provider.submission_for(job_id).await.unwrap();
    fixture.provider.succeed(&ext, Some("done://cat")).await;
    let tick = fixture.tick().await;
    // "protect" also starts with cloak; "quick" must still end here.
    assert_eq!(tick.body["finalized"], 1);
    assert_eq!(tick.body["advanced"], 0);

    let response = fixture
        .get(&format!("/api/v1/pipelines/{}", pipeline_id))
        .await;

    assert_eq!(response.body["state"]["state"], "complete");
    assert_eq!(response.body["state"]["steps"], 1);
    assert_eq!(response.body["output_ref"], "done://cat");
}

#[tokio::test]
async fn test_failed_submission_aborts_pipeline() {
    let fixture = TestFixture::new();
    let created = fixture
        .post(
            "/api/v1/pipelines",
            json!({ "template": "quick", "input_ref": "img://cat" }),
        )
        .await;
    let pipeline_id = created.body["pipeline_id"].as_str().unwrap().to_string();
    fixture
        .provider
        .fail_next_submit(stepline_core::ProviderError::Rejected("bad input".to_string()))
        .await;

    let tick = fixture.tick().await;
    assert_eq!(tick.body["dispatch_failed"], 1);

    let response = fixture
        .get(&format!("/api/v1/pipelines/{}", pipeline_id))
        .await;

    assert_eq!(response.body["state"]["state"], "aborted");
    assert!(response.body["state"]["error"]
        .as_str()
        .unwrap()
        .starts_with("Submission failed"));
}
