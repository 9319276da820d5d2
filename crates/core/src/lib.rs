pub mod auth;
pub mod config;
pub mod job;
pub mod lease;
pub mod metrics;
pub mod provider;
pub mod scheduler;
pub mod steps;
pub mod testing;

pub use auth::{
    create_authenticator, AuthError, AuthRequest, Authenticator, Identity, NoneAuthenticator,
    SharedSecretAuthenticator,
};
pub use config::{
    load_config, load_config_from_str, validate_config, AuthMethod, Config, ConfigError,
    ProviderConfig, SanitizedConfig,
};
pub use job::{
    AdvanceOutcome, Advancement, Job, JobError, JobStatus, JobStore, JobUpdate, NewJob,
    PipelineState, PipelineView, SqliteJobStore, Tier,
};
pub use lease::{LeaseError, LeaseInfo, SqliteTickLock, TickLock};
pub use provider::{
    ExternalId, HttpProvider, ProviderError, ProviderGateway, ProviderJobStatus, SubmitRequest,
};
pub use scheduler::{
    AdvanceReport, CycleOrchestrator, CycleState, DispatchReport, SchedulerConfig,
    SchedulerError, SchedulerStatus, SyncReport, TickReport,
};
pub use steps::{PipelineTemplate, StaticStepCatalog, StepCatalog, StepDefinition};
