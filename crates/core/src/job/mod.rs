//! Persisted pipeline steps ("jobs") and their store.

mod sqlite_store;
mod store;
mod types;

pub(crate) use sqlite_store::{format_ts, parse_ts};
pub use sqlite_store::SqliteJobStore;
pub use store::{JobError, JobStore};
pub use types::{
    AdvanceOutcome, Advancement, Job, JobStatus, JobUpdate, NewJob, PipelineState, PipelineView,
    Tier,
};
