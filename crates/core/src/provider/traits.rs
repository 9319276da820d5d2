//! Provider gateway trait.

use async_trait::async_trait;

use super::{ExternalId, ProviderError, ProviderJobStatus, SubmitRequest};

/// Client for the external execution provider.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Submit a step for execution and return the provider's handle.
    async fn submit(&self, request: &SubmitRequest) -> Result<ExternalId, ProviderError>;

    /// Poll the status of a previously submitted job.
    async fn status(&self, external_id: &str) -> Result<ProviderJobStatus, ProviderError>;
}
