//! Gateway to the external job-execution provider.
//!
//! The scheduler only ever talks to the provider through [`ProviderGateway`]:
//! submit a step, then poll it by the returned handle.

mod error;
mod http;
mod traits;
mod types;

pub use error::ProviderError;
pub use http::HttpProvider;
pub use traits::ProviderGateway;
pub use types::{ExternalId, ProviderJobStatus, SubmitRequest};
