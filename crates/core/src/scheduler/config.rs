//! Scheduler configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the tick scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Run ticks from an in-process timer.
    /// When disabled, ticks only happen through the trigger endpoint.
    #[serde(default)]
    pub enabled: bool,

    /// Interval between in-process ticks (milliseconds).
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Upper bound on jobs that are QUEUED or PROCESSING at once.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: u32,

    /// A dispatched job that has not changed for this long is failed.
    #[serde(default = "default_job_timeout")]
    pub job_timeout_minutes: u64,

    /// Bound on every single provider call.
    #[serde(default = "default_provider_call_timeout")]
    pub provider_call_timeout_secs: u64,

    /// Lifetime of the tick lease; a crashed tick blocks others at most this long.
    #[serde(default = "default_lease_ttl")]
    pub lease_ttl_secs: u64,
}

fn default_tick_interval() -> u64 {
    60_000 // 1 minute
}

fn default_max_concurrent_jobs() -> u32 {
    3
}

fn default_job_timeout() -> u64 {
    15
}

fn default_provider_call_timeout() -> u64 {
    30
}

fn default_lease_ttl() -> u64 {
    300 // 5 minutes
}

impl SchedulerConfig {
    pub fn job_timeout(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.job_timeout_minutes as i64)
    }

    pub fn provider_call_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.provider_call_timeout_secs)
    }

    pub fn lease_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lease_ttl_secs as i64)
    }

    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tick_interval_ms: default_tick_interval(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            job_timeout_minutes: default_job_timeout(),
            provider_call_timeout_secs: default_provider_call_timeout(),
            lease_ttl_secs: default_lease_ttl(),
        }
    }
}
