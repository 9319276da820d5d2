//! Types exchanged with the provider.

use serde::{Deserialize, Serialize};

/// Provider-assigned handle for a submitted job.
pub type ExternalId = String;

/// Everything the provider needs to run one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub job_id: i64,
    pub pipeline_id: String,
    pub step_order: u32,
    pub method: String,
    pub config: serde_json::Value,
    pub input_ref: String,
}

/// Status of a job as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProviderJobStatus {
    /// Accepted but not started.
    Queued,
    /// Executing.
    Running,
    /// Finished; `output_ref` points at the result artifact.
    Succeeded { output_ref: Option<String> },
    /// Finished with an error.
    Failed { message: String },
}

impl ProviderJobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }
}
