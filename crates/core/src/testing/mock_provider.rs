//! Mock provider for testing.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::provider::{
    ExternalId, ProviderError, ProviderGateway, ProviderJobStatus, SubmitRequest,
};

/// A recorded submission for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedSubmission {
    /// The request that was submitted.
    pub request: SubmitRequest,
    /// Handle returned to the caller.
    pub external_id: ExternalId,
    /// When the submission was made.
    pub timestamp: Instant,
}

/// Mock implementation of the ProviderGateway trait.
///
/// Provides controllable behavior for testing:
/// - Script the status reported for each external id (default: queued)
/// - Queue submission errors
/// - Simulate failing or slow status polls
/// - Track submissions and polls for assertions
///
/// # Example
///
/// ```rust,ignore
/// use stepline_core::testing::MockProvider;
///
/// let provider = MockProvider::new();
/// let id = provider.submit(&request).await?;
///
/// provider.succeed(&id, Some("s3://out/1.png")).await;
/// assert!(provider.status(&id).await?.is_finished());
/// ```
#[derive(Debug)]
pub struct MockProvider {
    /// Scripted statuses by external id.
    statuses: Arc<RwLock<HashMap<ExternalId, ProviderJobStatus>>>,
    /// Recorded submissions.
    submissions: Arc<RwLock<Vec<RecordedSubmission>>>,
    /// External ids polled, in order.
    polls: Arc<RwLock<Vec<ExternalId>>>,
    /// Errors returned by the next submissions, one each.
    submit_errors: Arc<RwLock<VecDeque<ProviderError>>>,
    /// Status polls fail with a connection error.
    unreachable: Arc<RwLock<bool>>,
    /// Delay before answering a status poll.
    status_delay: Arc<RwLock<Option<Duration>>>,
    next_id: AtomicU64,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// Create a new mock provider that accepts everything.
    pub fn new() -> Self {
        Self {
            statuses: Arc::new(RwLock::new(HashMap::new())),
            submissions: Arc::new(RwLock::new(Vec::new())),
            polls: Arc::new(RwLock::new(Vec::new())),
            submit_errors: Arc::new(RwLock::new(VecDeque::new())),
            unreachable: Arc::new(RwLock::new(false)),
            status_delay: Arc::new(RwLock::new(None)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Set the status reported for an external id.
    pub async fn set_status(&self, external_id: &str, status: ProviderJobStatus) {
        self.statuses
            .write()
            .await
            .insert(external_id.to_string(), status);
    }

    /// Report the job as running.
    pub async fn set_running(&self, external_id: &str) {
        self.set_status(external_id, ProviderJobStatus::Running)
            .await;
    }

    /// Report the job as succeeded.
    pub async fn succeed(&self, external_id: &str, output_ref: Option<&str>) {
        self.set_status(
            external_id,
            ProviderJobStatus::Succeeded {
                output_ref: output_ref.map(str::to_string),
            },
        )
        .await;
    }

    /// Report the job as failed.
    pub async fn fail(&self, external_id: &str, message: &str) {
        self.set_status(
            external_id,
            ProviderJobStatus::Failed {
                message: message.to_string(),
            },
        )
        .await;
    }

    /// Make the next submission fail with `error`.
    pub async fn fail_next_submit(&self, error: ProviderError) {
        self.submit_errors.write().await.push_back(error);
    }

    /// Make status polls fail as if the provider could not be reached.
    /// Submissions are scripted separately with [`Self::fail_next_submit`].
    pub async fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.write().await = unreachable;
    }

    /// Delay every status poll.
    pub async fn set_status_delay(&self, delay: Option<Duration>) {
        *self.status_delay.write().await = delay;
    }

    /// Get recorded submissions.
    pub async fn submissions(&self) -> Vec<RecordedSubmission> {
        self.submissions.read().await.clone()
    }

    /// Number of accepted submissions.
    pub async fn submission_count(&self) -> usize {
        self.submissions.read().await.len()
    }

    /// External id handed out for a job, if it was submitted.
    pub async fn submission_for(&self, job_id: i64) -> Option<ExternalId> {
        self.submissions
            .read()
            .await
            .iter()
            .find(|s| s.request.job_id == job_id)
            .map(|s| s.external_id.clone())
    }

    /// External ids polled so far.
    pub async fn polls(&self) -> Vec<ExternalId> {
        self.polls.read().await.clone()
    }
}

#[async_trait]
impl ProviderGateway for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn submit(&self, request: &SubmitRequest) -> Result<ExternalId, ProviderError> {
        if let Some(error) = self.submit_errors.write().await.pop_front() {
            return Err(error);
        }

        let external_id = format!("ext-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.submissions.write().await.push(RecordedSubmission {
            request: request.clone(),
            external_id: external_id.clone(),
            timestamp: Instant::now(),
        });

        Ok(external_id)
    }

    async fn status(&self, external_id: &str) -> Result<ProviderJobStatus, ProviderError> {
        self.polls.write().await.push(external_id.to_string());

        let delay = *self.status_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if *self.unreachable.read().await {
            return Err(ProviderError::ConnectionFailed(
                "mock provider unreachable".to_string(),
            ));
        }

        Ok(self
            .statuses
            .read()
            .await
            .get(external_id)
            .cloned()
            .unwrap_or(ProviderJobStatus::Queued))
    }
}
