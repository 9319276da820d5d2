//! Error types for the provider gateway.

use thiserror::Error;

/// Errors returned by a provider call.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider could not be reached.
    #[error("Provider connection failed: {0}")]
    ConnectionFailed(String),

    /// The call did not finish in time.
    #[error("Provider request timed out")]
    Timeout,

    /// The provider answered with a non-success status.
    #[error("Provider API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The provider refused the submission.
    #[error("Provider rejected the job: {0}")]
    Rejected(String),

    /// The response could not be understood.
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Whether the error says nothing about the job itself.
    ///
    /// Transient poll errors leave a job untouched; only the stall rule may
    /// fail it afterwards.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionFailed(_) | Self::Timeout => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            Self::Rejected(_) | Self::InvalidResponse(_) => false,
        }
    }
}
