//! Testing utilities and mock implementations.
//!
//! This module provides mocks for the provider and the step catalog, so the
//! scheduler can be driven end to end without a real provider.
//!
//! # Example
//!
//! ```rust,ignore
//! use stepline_core::testing::{fixtures, MockProvider};
//!
//! let provider = Arc::new(MockProvider::new());
//! let catalog = Arc::new(fixtures::protect_catalog());
//!
//! // Drive a tick, then script the provider's answer
//! orchestrator.run_tick().await;
//! provider.succeed("ext-1", Some("s3://out.png")).await;
//! ```

mod mock_provider;
mod mock_step_catalog;

pub use mock_provider::{MockProvider, RecordedSubmission};
pub use mock_step_catalog::MockStepCatalog;

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::Utc;

    use crate::job::NewJob;
    use crate::scheduler::SchedulerConfig;
    use crate::steps::{PipelineTemplate, StaticStepCatalog, StepDefinition};

    fn step(method: &str, config: serde_json::Value) -> StepDefinition {
        StepDefinition {
            method: method.to_string(),
            config,
        }
    }

    /// Three-step template: cloak, watermark, verify.
    pub fn protect_template() -> PipelineTemplate {
        PipelineTemplate {
            name: "protect".to_string(),
            steps: vec![
                step("cloak", serde_json::json!({ "intensity": "high" })),
                step("watermark", serde_json::Value::Null),
                step("verify", serde_json::Value::Null),
            ],
        }
    }

    /// Two-step template sharing its first step with [`protect_template`].
    pub fn quick_template() -> PipelineTemplate {
        PipelineTemplate {
            name: "quick".to_string(),
            steps: vec![
                step("cloak", serde_json::Value::Null),
                step("verify", serde_json::Value::Null),
            ],
        }
    }

    /// Single-step template.
    pub fn single_step_template(name: &str, method: &str) -> PipelineTemplate {
        PipelineTemplate {
            name: name.to_string(),
            steps: vec![step(method, serde_json::Value::Null)],
        }
    }

    /// Catalog holding [`protect_template`].
    pub fn protect_catalog() -> StaticStepCatalog {
        StaticStepCatalog::new(vec![protect_template()])
    }

    /// Entry step (step 0, method "cloak") of a "protect" pipeline.
    pub fn entry_job(pipeline_id: &str) -> NewJob {
        NewJob {
            pipeline_id: pipeline_id.to_string(),
            template: "protect".to_string(),
            step_order: 0,
            method: "cloak".to_string(),
            config: serde_json::json!({ "intensity": "high" }),
            input_ref: format!("input://{}", pipeline_id),
            created_at: Utc::now(),
        }
    }

    /// Scheduler config with the given cap and stall timeout.
    pub fn scheduler_config(max_concurrent_jobs: u32, job_timeout_minutes: u64) -> SchedulerConfig {
        SchedulerConfig {
            max_concurrent_jobs,
            job_timeout_minutes,
            provider_call_timeout_secs: 5,
            ..Default::default()
        }
    }
}
