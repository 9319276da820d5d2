//! SQLite-backed tick lease.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{LeaseError, LeaseInfo, TickLock};
use crate::job::{format_ts, parse_ts};

fn db_err(e: rusqlite::Error) -> LeaseError {
    LeaseError::Database(e.to_string())
}

/// Lease table stored in the job database.
pub struct SqliteTickLock {
    conn: Mutex<Connection>,
}

impl SqliteTickLock {
    pub fn new(path: &Path) -> Result<Self, LeaseError> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.busy_timeout(StdDuration::from_secs(5)).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, LeaseError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), LeaseError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS scheduler_leases (
                name TEXT PRIMARY KEY,
                holder TEXT NOT NULL,
                acquired_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(db_err)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, LeaseError> {
        self.conn
            .lock()
            .map_err(|_| LeaseError::Database("connection mutex poisoned".to_string()))
    }
}

impl TickLock for SqliteTickLock {
    fn try_acquire(
        &self,
        name: &str,
        holder: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, LeaseError> {
        let conn = self.conn()?;

        // Single statement: insert, or take over only if expired or ours.
        let changed = conn
            .execute(
                "INSERT INTO scheduler_leases (name, holder, acquired_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(name) DO UPDATE SET
                    holder = excluded.holder,
                    acquired_at = excluded.acquired_at,
                    expires_at = excluded.expires_at
                 WHERE scheduler_leases.expires_at <= ?3
                    OR scheduler_leases.holder = excluded.holder",
                params![name, holder, format_ts(now), format_ts(now + ttl)],
            )
            .map_err(db_err)?;

        Ok(changed == 1)
    }

    fn release(&self, name: &str, holder: &str) -> Result<(), LeaseError> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM scheduler_leases WHERE name = ? AND holder = ?",
            params![name, holder],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn current(&self, name: &str) -> Result<Option<LeaseInfo>, LeaseError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT name, holder, acquired_at, expires_at FROM scheduler_leases WHERE name = ?",
            params![name],
            |row| {
                let acquired_at: String = row.get(2)?;
                let expires_at: String = row.get(3)?;
                Ok(LeaseInfo {
                    name: row.get(0)?,
                    holder: row.get(1)?,
                    acquired_at: parse_ts(2, &acquired_at)?,
                    expires_at: parse_ts(3, &expires_at)?,
                })
            },
        )
        .optional()
        .map_err(db_err)
    }
}
