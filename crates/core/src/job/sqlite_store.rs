//! SQLite-backed job store implementation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    AdvanceOutcome, Advancement, Job, JobError, JobStatus, JobStore, JobUpdate, NewJob, Tier,
};

const JOB_COLUMNS: &str = "id, pipeline_id, template, step_order, method, config, input_ref, \
     output_ref, external_id, status, error_message, created_at, updated_at";

/// How long a writer waits for another connection's lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Format a timestamp so that text order equals time order.
pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn db_err(e: rusqlite::Error) -> JobError {
    JobError::Database(e.to_string())
}

/// SQLite-backed job store.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Open (or create) the job database at `path`.
    pub fn new(path: &Path) -> Result<Self, JobError> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, JobError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), JobError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pipeline_id TEXT NOT NULL,
                template TEXT NOT NULL,
                step_order INTEGER NOT NULL,
                method TEXT NOT NULL,
                config TEXT NOT NULL,
                input_ref TEXT NOT NULL,
                output_ref TEXT,
                external_id TEXT,
                status TEXT NOT NULL,
                error_message TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_pipeline_step
                ON jobs(pipeline_id, step_order);
            CREATE INDEX IF NOT EXISTS idx_jobs_status_created
                ON jobs(status, created_at);

            CREATE TABLE IF NOT EXISTS job_advancements (
                job_id INTEGER PRIMARY KEY REFERENCES jobs(id),
                outcome TEXT NOT NULL,
                advanced_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(db_err)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, JobError> {
        self.conn
            .lock()
            .map_err(|_| JobError::Database("connection mutex poisoned".to_string()))
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
        let config_json: String = row.get(5)?;
        let status_str: String = row.get(9)?;
        let created_at: String = row.get(11)?;
        let updated_at: String = row.get(12)?;

        let status = status_str.parse::<JobStatus>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, e.into())
        })?;

        // Config is opaque; a corrupt value should not hide the job.
        let config = serde_json::from_str(&config_json).unwrap_or(serde_json::Value::Null);

        Ok(Job {
            id: row.get(0)?,
            pipeline_id: row.get(1)?,
            template: row.get(2)?,
            step_order: row.get(3)?,
            method: row.get(4)?,
            config,
            input_ref: row.get(6)?,
            output_ref: row.get(7)?,
            external_id: row.get(8)?,
            status,
            error_message: row.get(10)?,
            created_at: parse_ts(11, &created_at)?,
            updated_at: parse_ts(12, &updated_at)?,
        })
    }

    fn query_jobs(
        conn: &Connection,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<Job>, JobError> {
        let mut stmt = conn.prepare(sql).map_err(db_err)?;
        let rows = stmt.query_map(params, Self::row_to_job).map_err(db_err)?;

        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row.map_err(db_err)?);
        }
        Ok(jobs)
    }

    fn get_with(conn: &Connection, id: i64) -> Result<Option<Job>, JobError> {
        conn.query_row(
            &format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS),
            params![id],
            Self::row_to_job,
        )
        .optional()
        .map_err(db_err)
    }

    /// Insert a pending row. Returns `None` when the pipeline position is taken.
    fn insert_pending(conn: &Connection, job: &NewJob) -> Result<Option<Job>, JobError> {
        let config_json =
            serde_json::to_string(&job.config).map_err(|e| JobError::Database(e.to_string()))?;

        let inserted = conn
            .execute(
                "INSERT INTO jobs (pipeline_id, template, step_order, method, config, input_ref, status, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(pipeline_id, step_order) DO NOTHING",
                params![
                    job.pipeline_id,
                    job.template,
                    job.step_order,
                    job.method,
                    config_json,
                    job.input_ref,
                    JobStatus::Pending.as_str(),
                    format_ts(job.created_at),
                    format_ts(job.created_at),
                ],
            )
            .map_err(db_err)?;

        if inserted == 0 {
            return Ok(None);
        }

        Ok(Some(Job {
            id: conn.last_insert_rowid(),
            pipeline_id: job.pipeline_id.clone(),
            template: job.template.clone(),
            step_order: job.step_order,
            method: job.method.clone(),
            config: job.config.clone(),
            input_ref: job.input_ref.clone(),
            output_ref: None,
            external_id: None,
            status: JobStatus::Pending,
            error_message: None,
            created_at: job.created_at,
            updated_at: job.created_at,
        }))
    }
}

impl JobStore for SqliteJobStore {
    fn create_entry(&self, job: NewJob) -> Result<Job, JobError> {
        let conn = self.conn()?;

        let job = NewJob {
            step_order: 0,
            ..job
        };

        Self::insert_pending(&conn, &job)?.ok_or(JobError::Conflict {
            pipeline_id: job.pipeline_id,
            step_order: 0,
        })
    }

    fn insert_successor(&self, job: NewJob) -> Result<Option<Job>, JobError> {
        let conn = self.conn()?;
        Self::insert_pending(&conn, &job)
    }

    fn get(&self, id: i64) -> Result<Option<Job>, JobError> {
        let conn = self.conn()?;
        Self::get_with(&conn, id)
    }

    fn find_step(&self, pipeline_id: &str, step_order: u32) -> Result<Option<Job>, JobError> {
        let conn = self.conn()?;

        conn.query_row(
            &format!(
                "SELECT {} FROM jobs WHERE pipeline_id = ? AND step_order = ?",
                JOB_COLUMNS
            ),
            params![pipeline_id, step_order],
            Self::row_to_job,
        )
        .optional()
        .map_err(db_err)
    }

    fn list_by_pipeline(&self, pipeline_id: &str) -> Result<Vec<Job>, JobError> {
        let conn = self.conn()?;

        Self::query_jobs(
            &conn,
            &format!(
                "SELECT {} FROM jobs WHERE pipeline_id = ? ORDER BY step_order ASC",
                JOB_COLUMNS
            ),
            &[&pipeline_id],
        )
    }

    fn count_dispatched(&self) -> Result<i64, JobError> {
        let conn = self.conn()?;

        conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status IN (?, ?)",
            params![JobStatus::Queued.as_str(), JobStatus::Processing.as_str()],
            |row| row.get(0),
        )
        .map_err(db_err)
    }

    fn list_pending(&self, tier: Tier, limit: i64) -> Result<Vec<Job>, JobError> {
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let conn = self.conn()?;

        let step_filter = match tier {
            Tier::Continuation => "step_order > 0",
            Tier::Entry => "step_order = 0",
        };

        Self::query_jobs(
            &conn,
            &format!(
                "SELECT {} FROM jobs WHERE status = ? AND {} ORDER BY created_at ASC, id ASC LIMIT ?",
                JOB_COLUMNS, step_filter
            ),
            &[&JobStatus::Pending.as_str(), &limit],
        )
    }

    fn list_dispatched(&self, pipeline_id: Option<&str>) -> Result<Vec<Job>, JobError> {
        let conn = self.conn()?;
        let queued = JobStatus::Queued.as_str();
        let processing = JobStatus::Processing.as_str();

        match pipeline_id {
            Some(pipeline_id) => Self::query_jobs(
                &conn,
                &format!(
                    "SELECT {} FROM jobs WHERE status IN (?, ?) AND pipeline_id = ? ORDER BY updated_at ASC, id ASC",
                    JOB_COLUMNS
                ),
                &[&queued, &processing, &pipeline_id],
            ),
            None => Self::query_jobs(
                &conn,
                &format!(
                    "SELECT {} FROM jobs WHERE status IN (?, ?) ORDER BY updated_at ASC, id ASC",
                    JOB_COLUMNS
                ),
                &[&queued, &processing],
            ),
        }
    }

    fn list_unadvanced(&self, limit: i64) -> Result<Vec<Job>, JobError> {
        let conn = self.conn()?;

        let columns = JOB_COLUMNS
            .split(", ")
            .map(|c| format!("j.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");

        Self::query_jobs(
            &conn,
            &format!(
                "SELECT {} FROM jobs j
                 LEFT JOIN job_advancements a ON a.job_id = j.id
                 WHERE j.status = ? AND a.job_id IS NULL
                 ORDER BY j.updated_at ASC, j.id ASC
                 LIMIT ?",
                columns
            ),
            &[&JobStatus::Completed.as_str(), &limit],
        )
    }

    fn transition(
        &self,
        id: i64,
        expected: JobStatus,
        update: JobUpdate,
    ) -> Result<bool, JobError> {
        if !expected.can_transition_to(update.status) {
            return Err(JobError::InvalidTransition {
                job_id: id,
                from: expected,
                to: update.status,
            });
        }

        let conn = self.conn()?;

        let changed = conn
            .execute(
                "UPDATE jobs SET
                    status = ?,
                    external_id = COALESCE(?, external_id),
                    output_ref = COALESCE(?, output_ref),
                    error_message = COALESCE(?, error_message),
                    updated_at = ?
                 WHERE id = ? AND status = ?",
                params![
                    update.status.as_str(),
                    update.external_id,
                    update.output_ref,
                    update.error_message,
                    format_ts(update.at.unwrap_or_else(Utc::now)),
                    id,
                    expected.as_str(),
                ],
            )
            .map_err(db_err)?;

        if changed == 1 {
            return Ok(true);
        }

        // Lost the race, or the job does not exist at all.
        match Self::get_with(&conn, id)? {
            Some(_) => Ok(false),
            None => Err(JobError::NotFound(id)),
        }
    }

    fn record_advancement(
        &self,
        job_id: i64,
        outcome: AdvanceOutcome,
        at: DateTime<Utc>,
    ) -> Result<(), JobError> {
        let conn = self.conn()?;

        let outcome_json =
            serde_json::to_string(&outcome).map_err(|e| JobError::Database(e.to_string()))?;

        conn.execute(
            "INSERT INTO job_advancements (job_id, outcome, advanced_at) VALUES (?, ?, ?)
             ON CONFLICT(job_id) DO NOTHING",
            params![job_id, outcome_json, format_ts(at)],
        )
        .map_err(db_err)?;

        Ok(())
    }

    fn advancement(&self, job_id: i64) -> Result<Option<Advancement>, JobError> {
        let conn = self.conn()?;

        let row = conn
            .query_row(
                "SELECT outcome, advanced_at FROM job_advancements WHERE job_id = ?",
                params![job_id],
                |row| {
                    let outcome: String = row.get(0)?;
                    let advanced_at: String = row.get(1)?;
                    Ok((outcome, parse_ts(1, &advanced_at)?))
                },
            )
            .optional()
            .map_err(db_err)?;

        match row {
            Some((outcome_json, advanced_at)) => {
                let outcome = serde_json::from_str(&outcome_json)
                    .map_err(|e| JobError::Database(e.to_string()))?;
                Ok(Some(Advancement {
                    job_id,
                    outcome,
                    advanced_at,
                }))
            }
            None => Ok(None),
        }
    }

    fn count_by_status(&self) -> Result<HashMap<JobStatus, i64>, JobError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(db_err)?;

        let mut counts: HashMap<JobStatus, i64> =
            JobStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for row in rows {
            let (status, count) = row.map_err(db_err)?;
            if let Ok(status) = status.parse::<JobStatus>() {
                counts.insert(status, count);
            }
        }

        Ok(counts)
    }
}
