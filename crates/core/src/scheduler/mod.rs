//! Tick scheduler driving pipelines through the provider.
//!
//! Each tick runs Sync, Advance and Dispatch in that order:
//! - **Sync**: concurrent provider polls, sequential compare-and-set updates
//! - **Advance**: successor creation, no provider calls
//! - **Dispatch**: sequential submissions bounded by `max_concurrent_jobs`
//!
//! All state lives in the job store, so ticks may come from the in-process
//! timer or from any external trigger sharing the database.

mod advance;
mod config;
mod dispatch;
mod runner;
mod sync;
mod types;

pub use advance::advance_jobs;
pub use config::SchedulerConfig;
pub use dispatch::dispatch_jobs;
pub use runner::{CycleOrchestrator, TICK_LEASE};
pub use sync::{is_stalled, sync_jobs, TIMEOUT_MESSAGE};
pub use types::{
    AdvanceReport, CycleState, DispatchReport, SchedulerError, SchedulerStatus, SyncReport,
    TickReport,
};
