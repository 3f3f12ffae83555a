use clap::{Args, Subcommand};
use serde::Serialize;

use wpstack::job::{JobRecord, JobStatus, JobStore};
use wpstack::store::SqliteJobStore;
use wpstack::RunOutcome;

use super::CmdResult;

#[derive(Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutput {
    command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    job: Option<JobRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    jobs: Option<Vec<JobRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<RunOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    changed: Option<bool>,
}

#[derive(Args)]
pub struct JobArgs {
    #[command(subcommand)]
    command: JobCommand,
}

#[derive(Subcommand)]
enum JobCommand {
    /// Run a queued job to completion
    Run {
        /// Job ID
        job_id: i64,
    },
    /// Show a job's status, progress and log
    Status {
        /// Job ID
        job_id: i64,
    },
    /// List jobs, newest first
    List {
        /// Only jobs in this status (pending, running, succeeded, failed)
        #[arg(long)]
        status: Option<String>,
    },
    /// Mark a job failed after its driving process died
    Fail {
        /// Job ID
        job_id: i64,
        /// Reason recorded in the job log
        #[arg(long)]
        reason: Option<String>,
    },
}

pub fn run(args: JobArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<JobOutput> {
    let store = SqliteJobStore::open_default()?;

    match args.command {
        JobCommand::Run { job_id } => {
            let job = store.load(job_id)?;
            if job.status != JobStatus::Pending {
                return Err(wpstack::Error::job_not_pending(job_id, job.status.as_str()));
            }

            let outcome = super::run_job(&store, job_id)?;
            let exit_code = super::outcome_exit_code(&outcome);

            Ok((
                JobOutput {
                    command: "job.run".to_string(),
                    job_id: Some(job_id),
                    job: Some(store.load(job_id)?),
                    outcome: Some(outcome),
                    ..Default::default()
                },
                exit_code,
            ))
        }
        JobCommand::Status { job_id } => Ok((
            JobOutput {
                command: "job.status".to_string(),
                job_id: Some(job_id),
                job: Some(store.load(job_id)?),
                ..Default::default()
            },
            0,
        )),
        JobCommand::List { status } => {
            let status = status.as_deref().map(JobStatus::parse).transpose()?;

            Ok((
                JobOutput {
                    command: "job.list".to_string(),
                    jobs: Some(store.list(status)?),
                    ..Default::default()
                },
                0,
            ))
        }
        JobCommand::Fail { job_id, reason } => {
            let changed = store.mark_failed_externally(job_id, reason.as_deref())?;

            Ok((
                JobOutput {
                    command: "job.fail".to_string(),
                    job_id: Some(job_id),
                    job: Some(store.load(job_id)?),
                    changed: Some(changed),
                    ..Default::default()
                },
                0,
            ))
        }
    }
}
