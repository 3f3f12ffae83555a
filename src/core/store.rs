//! SQLite-backed job store.

use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::catalog::sanitize_domain;
use crate::error::{Error, Result};
use crate::job::{log_entry, JobRecord, JobStatus, JobStore, NewJob, COMPLETED_STEP, FAILED_STEP};
use crate::paths;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS jobs (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    server_id     TEXT NOT NULL,
    domain        TEXT NOT NULL,
    admin_email   TEXT NOT NULL,
    site_title    TEXT NOT NULL,
    php_version   TEXT,
    status        TEXT NOT NULL DEFAULT 'pending',
    current_step  TEXT,
    progress      INTEGER NOT NULL DEFAULT 0,
    log           TEXT NOT NULL DEFAULT '',
    result_url    TEXT,
    error_message TEXT,
    db_name       TEXT,
    db_user       TEXT,
    created_at    TEXT NOT NULL,
    started_at    TEXT,
    finished_at   TEXT
);
CREATE INDEX IF NOT EXISTS jobs_server_domain ON jobs (server_id, domain);
";

const COLUMNS: &str = "id, server_id, domain, admin_email, site_title, php_version, status, \
    current_step, progress, log, result_url, error_message, db_name, db_user, \
    created_at, started_at, finished_at";

// "Failed: <step in flight>", or just "Failed" when no step had started.
const FAILED_LABEL: &str =
    "CASE WHEN current_step IS NULL THEN ?2 ELSE ?2 || ': ' || current_step END";

const ACTIVE: &str = "status IN ('pending', 'running')";

pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Open (or create) the store at `~/.config/wpstack/jobs.db`.
    pub fn open_default() -> Result<Self> {
        Self::open(&paths::jobs_db()?)
    }

    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::internal_io(e.to_string(), Some(format!("create {}", parent.display())))
            })?;
        }
        let conn = Connection::open(path)?;
        // Concurrent claimers wait on the write lock instead of failing.
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::internal_unexpected("job store lock poisoned"))
    }

    /// Insert a `pending` job, refusing when the same server already has an
    /// active job for the same domain.
    pub fn create_job(&self, job: &NewJob) -> Result<i64> {
        let domain = sanitize_domain(&job.params.domain);
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let active: Option<(i64, String)> = tx
            .query_row(
                &format!(
                    "SELECT id, status FROM jobs WHERE server_id = ?1 AND domain = ?2 AND {} ORDER BY id LIMIT 1",
                    ACTIVE
                ),
                params![job.server_id, domain],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if let Some((id, status)) = active {
            return Err(Error::job_already_active(id, status));
        }

        tx.execute(
            "INSERT INTO jobs (server_id, domain, admin_email, site_title, php_version, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6)",
            params![
                job.server_id,
                domain,
                job.params.admin_email,
                job.params.site_title,
                job.params.php_version,
                Utc::now().to_rfc3339(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        tracing::info!(job_id = id, server = %job.server_id, %domain, "job created");
        Ok(id)
    }

    /// Fail a job from outside the driver (the driving process died or was
    /// killed). Terminal jobs are left untouched; returns whether a change was made.
    pub fn mark_failed_externally(&self, job_id: i64, reason: Option<&str>) -> Result<bool> {
        let message = format!("Job failed: {}", reason.unwrap_or("Unknown error"));
        let now = Utc::now();

        let changed = self.conn()?.execute(
            &format!(
                "UPDATE jobs SET status = 'failed', current_step = {}, error_message = ?3,
                    log = log || ?4, finished_at = ?5
                 WHERE id = ?1 AND {}",
                FAILED_LABEL, ACTIVE
            ),
            params![
                job_id,
                FAILED_STEP,
                message,
                log_entry(now, &message),
                now.to_rfc3339()
            ],
        )?;

        if changed == 0 {
            // Surface a missing job; an already-terminal one is a no-op.
            self.load(job_id)?;
            return Ok(false);
        }
        tracing::warn!(job_id, %message, "job marked failed externally");
        Ok(true)
    }

    fn update_active(&self, job_id: i64, sql: &str, values: &[&dyn rusqlite::ToSql]) -> Result<()> {
        let changed = self.conn()?.execute(sql, values)?;
        if changed == 0 {
            let job = self.load(job_id)?;
            tracing::warn!(job_id, status = job.status.as_str(), "ignored update to inactive job");
        }
        Ok(())
    }
}

impl JobStore for SqliteJobStore {
    fn load(&self, job_id: i64) -> Result<JobRecord> {
        let row = self
            .conn()?
            .query_row(
                &format!("SELECT {} FROM jobs WHERE id = ?1", COLUMNS),
                params![job_id],
                JobRow::from_row,
            )
            .optional()?;

        row.ok_or_else(|| Error::job_not_found(job_id))?.into_record()
    }

    fn claim(&self, job_id: i64) -> Result<bool> {
        let changed = self.conn()?.execute(
            "UPDATE jobs SET status = 'running', started_at = ?2 WHERE id = ?1 AND status = 'pending'",
            params![job_id, Utc::now().to_rfc3339()],
        )?;
        Ok(changed == 1)
    }

    fn persist_progress(&self, job_id: i64, step_label: &str, progress: u8) -> Result<()> {
        self.update_active(
            job_id,
            &format!(
                "UPDATE jobs SET current_step = ?2, progress = ?3 WHERE id = ?1 AND {}",
                ACTIVE
            ),
            params![job_id, step_label, progress],
        )
    }

    fn append_log(&self, job_id: i64, text: &str) -> Result<()> {
        self.update_active(
            job_id,
            &format!("UPDATE jobs SET log = log || ?2 WHERE id = ?1 AND {}", ACTIVE),
            params![job_id, log_entry(Utc::now(), text)],
        )
    }

    fn record_db_identity(&self, job_id: i64, db_name: &str, db_user: &str) -> Result<()> {
        self.update_active(
            job_id,
            &format!(
                "UPDATE jobs SET db_name = ?2, db_user = ?3 WHERE id = ?1 AND {}",
                ACTIVE
            ),
            params![job_id, db_name, db_user],
        )
    }

    fn persist_success(&self, job_id: i64, result_url: &str) -> Result<()> {
        self.update_active(
            job_id,
            "UPDATE jobs SET status = 'succeeded', progress = 100, current_step = ?2,
                result_url = ?3, finished_at = ?4
             WHERE id = ?1 AND status = 'running'",
            params![job_id, COMPLETED_STEP, result_url, Utc::now().to_rfc3339()],
        )
    }

    fn persist_failure(&self, job_id: i64, message: &str) -> Result<()> {
        self.update_active(
            job_id,
            &format!(
                "UPDATE jobs SET status = 'failed', current_step = {}, error_message = ?3, finished_at = ?4
                 WHERE id = ?1 AND {}",
                FAILED_LABEL, ACTIVE
            ),
            params![job_id, FAILED_STEP, message, Utc::now().to_rfc3339()],
        )
    }

    fn list(&self, status: Option<JobStatus>) -> Result<Vec<JobRecord>> {
        let conn = self.conn()?;
        let rows = match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM jobs WHERE status = ?1 ORDER BY id DESC",
                    COLUMNS
                ))?;
                let rows = stmt
                    .query_map(params![status.as_str()], JobRow::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            None => {
                let mut stmt =
                    conn.prepare(&format!("SELECT {} FROM jobs ORDER BY id DESC", COLUMNS))?;
                let rows = stmt
                    .query_map([], JobRow::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };

        rows.into_iter().map(JobRow::into_record).collect()
    }
}

struct JobRow {
    id: i64,
    server_id: String,
    domain: String,
    admin_email: String,
    site_title: String,
    php_version: Option<String>,
    status: String,
    current_step: Option<String>,
    progress: i64,
    log: String,
    result_url: Option<String>,
    error_message: Option<String>,
    db_name: Option<String>,
    db_user: Option<String>,
    created_at: String,
    started_at: Option<String>,
    finished_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            server_id: row.get(1)?,
            domain: row.get(2)?,
            admin_email: row.get(3)?,
            site_title: row.get(4)?,
            php_version: row.get(5)?,
            status: row.get(6)?,
            current_step: row.get(7)?,
            progress: row.get(8)?,
            log: row.get(9)?,
            result_url: row.get(10)?,
            error_message: row.get(11)?,
            db_name: row.get(12)?,
            db_user: row.get(13)?,
            created_at: row.get(14)?,
            started_at: row.get(15)?,
            finished_at: row.get(16)?,
        })
    }

    fn into_record(self) -> Result<JobRecord> {
        Ok(JobRecord {
            id: self.id,
            server_id: self.server_id,
            domain: self.domain,
            admin_email: self.admin_email,
            site_title: self.site_title,
            php_version: self.php_version,
            status: JobStatus::parse(&self.status)?,
            current_step: self.current_step,
            progress: self.progress.clamp(0, 100) as u8,
            log: self.log,
            result_url: self.result_url,
            error_message: self.error_message,
            db_name: self.db_name,
            db_user: self.db_user,
            created_at: parse_timestamp(&self.created_at)?,
            started_at: self.started_at.as_deref().map(parse_timestamp).transpose()?,
            finished_at: self.finished_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::internal_database(e.to_string(), Some(format!("timestamp '{}'", value))))
}
