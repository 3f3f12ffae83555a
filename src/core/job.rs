//! Job state model and the store contract the pipeline drives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::JobParameters;
use crate::error::{Error, Result};

/// `current_step` once a job has succeeded.
pub const COMPLETED_STEP: &str = "Completed";
/// `current_step` once a job has failed.
pub const FAILED_STEP: &str = "Failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            other => Err(Error::validation_invalid_argument(
                "status",
                format!("unknown job status '{}'", other),
                None,
                Some(vec![
                    "pending".to_string(),
                    "running".to_string(),
                    "succeeded".to_string(),
                    "failed".to_string(),
                ]),
            )),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }
}

/// A job ready to be inserted in `pending`.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub server_id: String,
    pub params: JobParameters,
}

/// Everything an observer can see about a job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: i64,
    pub server_id: String,
    pub domain: String,
    pub admin_email: String,
    pub site_title: String,
    pub php_version: Option<String>,
    pub status: JobStatus,
    pub current_step: Option<String>,
    pub progress: u8,
    pub log: String,
    pub result_url: Option<String>,
    pub error_message: Option<String>,
    pub db_name: Option<String>,
    pub db_user: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    pub fn parameters(&self) -> JobParameters {
        JobParameters {
            domain: self.domain.clone(),
            admin_email: self.admin_email.clone(),
            site_title: self.site_title.clone(),
            php_version: self.php_version.clone(),
        }
    }
}

/// Persistence the pipeline relies on.
///
/// `claim` must be a single compare-and-set from `pending` to `running`.
/// Terminal jobs are never modified by any method. The log only grows.
pub trait JobStore {
    fn load(&self, job_id: i64) -> Result<JobRecord>;

    /// Move `pending` to `running`. Returns false when the job was not pending.
    fn claim(&self, job_id: i64) -> Result<bool>;

    fn persist_progress(&self, job_id: i64, step_label: &str, progress: u8) -> Result<()>;

    fn append_log(&self, job_id: i64, text: &str) -> Result<()>;

    fn record_db_identity(&self, job_id: i64, db_name: &str, db_user: &str) -> Result<()>;

    fn persist_success(&self, job_id: i64, result_url: &str) -> Result<()>;

    fn persist_failure(&self, job_id: i64, message: &str) -> Result<()>;

    fn list(&self, status: Option<JobStatus>) -> Result<Vec<JobRecord>>;
}

/// One log entry: `[YYYY-mm-dd HH:MM:SS] message` followed by a newline.
pub fn log_entry(at: DateTime<Utc>, message: &str) -> String {
    format!("[{}] {}\n", at.format("%Y-%m-%d %H:%M:%S"), message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Succeeded,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(JobStatus::parse("installing").is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Pending.is_active());
    }

    #[test]
    fn log_entry_format() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 5, 7).unwrap();
        assert_eq!(log_entry(at, "Step: Installing Nginx (15%)"), "[2026-03-01 09:05:07] Step: Installing Nginx (15%)\n");
    }
}
