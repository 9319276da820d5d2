//! Persisted lease used to keep scheduler ticks from overlapping.
//!
//! Ticks may be triggered by independent invocations that share nothing but
//! the database, so the "tick is running" flag lives next to the jobs and
//! carries an expiry. A crashed holder simply lets its lease run out.

mod sqlite;

pub use sqlite::SqliteTickLock;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from the lease backend.
#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("lease database error: {0}")]
    Database(String),
}

/// A held lease.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaseInfo {
    pub name: String,
    pub holder: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl LeaseInfo {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Mutual exclusion primitive with expiry.
pub trait TickLock: Send + Sync {
    /// Try to take the lease `name` for `ttl`.
    ///
    /// Succeeds when the lease is free, expired, or already held by `holder`
    /// (which extends it).
    fn try_acquire(
        &self,
        name: &str,
        holder: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, LeaseError>;

    /// Release the lease if `holder` still owns it.
    fn release(&self, name: &str, holder: &str) -> Result<(), LeaseError>;

    /// The current lease record, expired or not.
    fn current(&self, name: &str) -> Result<Option<LeaseInfo>, LeaseError>;
}
