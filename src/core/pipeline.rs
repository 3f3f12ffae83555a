//! Drives one job through the step catalog over a single remote session.

use serde::Serialize;

use crate::catalog::{JobParameters, StepCatalog};
use crate::credentials::CredentialResolver;
use crate::defaults::Defaults;
use crate::error::{Error, Result};
use crate::job::{JobStatus, JobStore};
use crate::ssh::{Connector, RemoteSession};
use crate::utils::truncate;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum RunOutcome {
    /// The job was not pending; nothing was touched.
    Skipped { job_id: i64, status: JobStatus },
    Succeeded { job_id: i64, result_url: String },
    Failed { job_id: i64, error: String },
}

/// `current_step` while the session is being opened, before step 1.
pub const CONNECTING_STEP: &str = "Connecting to server";
const CONNECTING_WEIGHT: u8 = 2;

pub struct PipelineDriver<'a, S, R, C> {
    store: &'a S,
    resolver: &'a R,
    connector: C,
    defaults: Defaults,
}

impl<'a, S, R, C> PipelineDriver<'a, S, R, C>
where
    S: JobStore,
    R: CredentialResolver,
    C: Connector + Clone,
{
    pub fn new(store: &'a S, resolver: &'a R, connector: C, defaults: Defaults) -> Self {
        Self {
            store,
            resolver,
            connector,
            defaults,
        }
    }

    /// Run `job_id` to a terminal state.
    ///
    /// Step and transport failures end in `RunOutcome::Failed` with the job
    /// persisted as failed. `Err` is returned only when the store itself
    /// cannot record the outcome.
    pub fn run(&self, job_id: i64) -> Result<RunOutcome> {
        let job = self.store.load(job_id)?;
        if job.status != JobStatus::Pending {
            tracing::info!(job_id, status = job.status.as_str(), "job is not pending, skipping");
            return Ok(RunOutcome::Skipped {
                job_id,
                status: job.status,
            });
        }

        if !self.store.claim(job_id)? {
            let status = self.store.load(job_id)?.status;
            tracing::info!(job_id, status = status.as_str(), "job claimed elsewhere, skipping");
            return Ok(RunOutcome::Skipped { job_id, status });
        }

        tracing::info!(job_id, server = %job.server_id, domain = %job.domain, "provisioning started");
        log_status!("install", "Job #{} started for {}", job_id, job.domain);

        match self.drive(job_id, &job.server_id, &job.parameters()) {
            Ok(result_url) => {
                self.note(job_id, &format!("Installation completed: {}", result_url));

                if let Err(err) = self.store.persist_success(job_id, &result_url) {
                    tracing::error!(job_id, error = %err, "could not record success");
                    return self.fail(job_id, &err);
                }

                tracing::info!(job_id, %result_url, "provisioning succeeded");
                log_status!("install", "Done: {}", result_url);
                Ok(RunOutcome::Succeeded { job_id, result_url })
            }
            Err(err) => self.fail(job_id, &err),
        }
    }

    fn drive(&self, job_id: i64, server_id: &str, params: &JobParameters) -> Result<String> {
        let catalog = StepCatalog::new(params);
        self.store
            .record_db_identity(job_id, catalog.db_name(), catalog.db_user())?;

        let target = self.resolver.resolve(server_id)?;
        let endpoint = format!("{}@{}:{}", target.user, target.host, target.port);

        self.store
            .persist_progress(job_id, CONNECTING_STEP, CONNECTING_WEIGHT)?;
        self.store.append_log(
            job_id,
            &format!("Step: {} ({}%)", CONNECTING_STEP, CONNECTING_WEIGHT),
        )?;
        log_status!("install", "Connecting to {}", endpoint);

        // Dropping the session on any early return releases the connection.
        let mut session = RemoteSession::new(self.connector.clone(), target, &self.defaults);
        session.open()?;
        self.store
            .append_log(job_id, &format!("✓ Connected to {}", endpoint))?;

        let total = catalog.steps().len();
        for step in catalog.steps() {
            self.store.persist_progress(job_id, &step.label, step.weight)?;
            self.store
                .append_log(job_id, &format!("Step: {} ({}%)", step.label, step.weight))?;

            log_status!("install", "[{}/{}] {}", step.ordinal, total, step.label);
            tracing::info!(job_id, step = step.ordinal, total, label = %step.label, "step started");

            let output = session
                .execute_or_fail(&catalog.command_for(step), Some(step.timeout))
                .map_err(|err| Error::provision_step_failed(step.ordinal, total, &step.label, err))?;

            let kept = truncate::head(output.trim(), self.defaults.limits.step_log_bytes);
            let entry = if kept.is_empty() {
                format!("✓ {}", step.label)
            } else {
                format!("✓ {}\n{}", step.label, kept)
            };
            self.store.append_log(job_id, &entry)?;
        }

        session.disconnect();
        Ok(catalog.admin_url())
    }

    /// Move the job to `failed`. Only an error from that final write escapes.
    fn fail(&self, job_id: i64, err: &Error) -> Result<RunOutcome> {
        let message =
            truncate::failure_message(&err.message, self.defaults.limits.error_message_bytes);

        tracing::error!(job_id, code = err.code.as_str(), error = %err.message, "provisioning failed");
        log_status!("install", "Failed: {}", message);

        self.note(job_id, &format!("✗ {}", message));
        self.store.persist_failure(job_id, &message)?;
        Ok(RunOutcome::Failed {
            job_id,
            error: message,
        })
    }

    /// Append to the job log where losing the entry must not block the
    /// terminal transition.
    fn note(&self, job_id: i64, text: &str) {
        if let Err(err) = self.store.append_log(job_id, text) {
            tracing::warn!(job_id, error = %err, "could not append to job log");
        }
    }
}
