//! REST provider implementation.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::ProviderConfig;
use crate::metrics;

use super::{ExternalId, ProviderError, ProviderGateway, ProviderJobStatus, SubmitRequest};

/// Provider reached over its REST API.
pub struct HttpProvider {
    client: Client,
    config: ProviderConfig,
}

#[derive(Debug, Serialize)]
struct SubmitBody<'a> {
    method: &'a str,
    input: &'a str,
    config: &'a serde_json::Value,
    metadata: SubmitMetadata<'a>,
}

#[derive(Debug, Serialize)]
struct SubmitMetadata<'a> {
    job_id: i64,
    pipeline_id: &'a str,
    step_order: u32,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    output: serde_json::Value,
    #[serde(default)]
    error: Option<String>,
}

impl HttpProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| ProviderError::ConnectionFailed(format!("HTTP client setup: {}", e)))?;

        Ok(Self { client, config })
    }

    fn jobs_url(&self) -> String {
        format!("{}/v1/jobs", self.config.url.trim_end_matches('/'))
    }

    fn job_url(&self, external_id: &str) -> String {
        format!("{}/{}", self.jobs_url(), urlencoding::encode(external_id))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.config.api_token.is_empty() {
            request
        } else {
            request.bearer_auth(&self.config.api_token)
        }
    }

    async fn check(response: Response) -> Result<Response, ProviderError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::api(
            status.as_u16(),
            body.chars().take(200).collect::<String>(),
        ))
    }
}

fn map_request_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout
    } else if e.is_connect() {
        ProviderError::ConnectionFailed(e.to_string())
    } else {
        ProviderError::InvalidResponse(e.to_string())
    }
}

fn parse_external_id(id: serde_json::Value) -> Result<ExternalId, ProviderError> {
    match id {
        serde_json::Value::String(s) if !s.is_empty() => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(ProviderError::InvalidResponse(format!(
            "unusable job id: {}",
            other
        ))),
    }
}

/// First string found in the output field.
fn extract_output(output: serde_json::Value) -> Option<String> {
    match output {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Array(items) => items
            .into_iter()
            .find_map(|v| v.as_str().map(str::to_string)),
        _ => None,
    }
}

fn parse_status(response: StatusResponse) -> Result<ProviderJobStatus, ProviderError> {
    match response.status.to_ascii_lowercase().as_str() {
        "queued" | "starting" => Ok(ProviderJobStatus::Queued),
        "running" | "processing" => Ok(ProviderJobStatus::Running),
        "succeeded" | "completed" => Ok(ProviderJobStatus::Succeeded {
            output_ref: extract_output(response.output),
        }),
        "failed" | "canceled" | "error" => Ok(ProviderJobStatus::Failed {
            message: response
                .error
                .unwrap_or_else(|| format!("provider reported {}", response.status)),
        }),
        other => Err(ProviderError::InvalidResponse(format!(
            "unknown job status: {}",
            other
        ))),
    }
}

fn record_call(operation: &str, started: Instant, result: &Result<impl Sized, ProviderError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) if e.is_transient() => "transient_error",
        Err(_) => "error",
    };
    metrics::PROVIDER_CALL_DURATION
        .with_label_values(&[operation])
        .observe(started.elapsed().as_secs_f64());
    metrics::PROVIDER_CALLS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

#[async_trait]
impl ProviderGateway for HttpProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn submit(&self, request: &SubmitRequest) -> Result<ExternalId, ProviderError> {
        let started = Instant::now();
        let body = SubmitBody {
            method: &request.method,
            input: &request.input_ref,
            config: &request.config,
            metadata: SubmitMetadata {
                job_id: request.job_id,
                pipeline_id: &request.pipeline_id,
                step_order: request.step_order,
            },
        };

        let result: Result<ExternalId, ProviderError> = async {
            let response = self
                .authorize(self.client.post(self.jobs_url()))
                .json(&body)
                .send()
                .await
                .map_err(map_request_error)?;

            let response = match Self::check(response).await {
                Err(ProviderError::Api { status, message }) if (400..500).contains(&status) => {
                    return Err(ProviderError::Rejected(message));
                }
                other => other?,
            };

            let parsed: SubmitResponse = response.json().await.map_err(|e| {
                ProviderError::InvalidResponse(format!("Failed to parse response: {}", e))
            })?;
            parse_external_id(parsed.id)
        }
        .await;

        record_call("submit", started, &result);
        if let Ok(external_id) = &result {
            debug!(job_id = request.job_id, external_id = %external_id, "Provider accepted job");
        }
        result
    }

    async fn status(&self, external_id: &str) -> Result<ProviderJobStatus, ProviderError> {
        let started = Instant::now();

        let result: Result<ProviderJobStatus, ProviderError> = async {
            let response = self
                .authorize(self.client.get(self.job_url(external_id)))
                .send()
                .await
                .map_err(map_request_error)?;
            let response = Self::check(response).await?;

            let parsed: StatusResponse = response.json().await.map_err(|e| {
                ProviderError::InvalidResponse(format!("Failed to parse response: {}", e))
            })?;
            parse_status(parsed)
        }
        .await;

        record_call("status", started, &result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider(url: &str) -> HttpProvider {
        HttpProvider::new(ProviderConfig {
            url: url.to_string(),
            api_token: "token".to_string(),
            timeout_secs: 2,
        })
        .unwrap()
    }

    fn status(raw: serde_json::Value) -> Result<ProviderJobStatus, ProviderError> {
        parse_status(serde_json::from_value(raw).unwrap())
    }

    #[test]
    fn test_job_urls() {
        let p = provider("https://provider.example/");
        assert_eq!(p.jobs_url(), "https://provider.example/v1/jobs");
        assert_eq!(
            p.job_url("abc/def"),
            "https://provider.example/v1/jobs/abc%2Fdef"
        );
    }

    #[test]
    fn test_parse_waiting_statuses() {
        assert_eq!(
            status(json!({"status": "starting"})).unwrap(),
            ProviderJobStatus::Queued
        );
        assert_eq!(
            status(json!({"status": "processing"})).unwrap(),
            ProviderJobStatus::Running
        );
    }

    #[test]
    fn test_parse_success_output_forms() {
        assert_eq!(
            status(json!({"status": "succeeded", "output": "s3://out/1.png"})).unwrap(),
            ProviderJobStatus::Succeeded {
                output_ref: Some("s3://out/1.png".to_string())
            }
        );
        assert_eq!(
            status(json!({"status": "COMPLETED", "output": [null, "a.png", "b.png"]})).unwrap(),
            ProviderJobStatus::Succeeded {
                output_ref: Some("a.png".to_string())
            }
        );
        assert_eq!(
            status(json!({"status": "succeeded"})).unwrap(),
            ProviderJobStatus::Succeeded { output_ref: None }
        );
    }

    #[test]
    fn test_parse_failure_statuses() {
        assert_eq!(
            status(json!({"status": "failed", "error": "CUDA out of memory"})).unwrap(),
            ProviderJobStatus::Failed {
                message: "CUDA out of memory".to_string()
            }
        );
        assert_eq!(
            status(json!({"status": "canceled"})).unwrap(),
            ProviderJobStatus::Failed {
                message: "provider reported canceled".to_string()
            }
        );
    }

    #[test]
    fn test_parse_unknown_status() {
        let err = status(json!({"status": "paused"})).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[test]
    fn test_parse_external_id() {
        assert_eq!(parse_external_id(json!("pred-1")).unwrap(), "pred-1");
        assert_eq!(parse_external_id(json!(42)).unwrap(), "42");
        assert!(parse_external_id(json!("")).is_err());
        assert!(parse_external_id(json!(null)).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_transient() {
        let p = provider("http://127.0.0.1:1");
        let err = p.status("anything").await.unwrap_err();
        assert!(err.is_transient(), "unexpected error: {err:?}");
    }
}
