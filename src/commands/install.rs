use clap::Args;
use serde::Serialize;

use wpstack::catalog::{self, JobParameters, DEFAULT_SITE_TITLE};
use wpstack::defaults::{self, Defaults};
use wpstack::job::NewJob;
use wpstack::server::ServerRegistry;
use wpstack::store::SqliteJobStore;
use wpstack::utils::validation;
use wpstack::RunOutcome;

use super::CmdResult;

#[derive(Args)]
pub struct InstallArgs {
    /// Server ID to install on
    #[arg(long)]
    server: String,
    /// Site domain (scheme and trailing slash are stripped)
    #[arg(long)]
    domain: String,
    /// Admin email, also used for certificate registration
    #[arg(long)]
    email: String,
    /// Site title
    #[arg(long)]
    title: Option<String>,
    /// PHP version (8.1, 8.2, 8.3, 8.4)
    #[arg(long)]
    php: Option<String>,
    /// Only queue the job; run it later with `wpstack job run`
    #[arg(long)]
    queue: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallOutput {
    command: String,
    job_id: i64,
    server_id: String,
    domain: String,
    queued: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<RunOutcome>,
}

/// Validate CLI input into job parameters, filling the configured default runtime.
pub(crate) fn parameters(
    domain: &str,
    email: &str,
    title: Option<String>,
    php: Option<String>,
    defaults: &Defaults,
) -> wpstack::Result<JobParameters> {
    let domain = validation::domain(&catalog::sanitize_domain(domain))?;
    let email = validation::email(email)?;

    Ok(JobParameters {
        domain,
        admin_email: email,
        site_title: title.unwrap_or_else(|| DEFAULT_SITE_TITLE.to_string()),
        php_version: php.or_else(|| Some(defaults.runtime.default_php_version.clone())),
    })
}

pub fn run(args: InstallArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<InstallOutput> {
    ServerRegistry::open_default()?.load(&args.server)?;

    let params = parameters(
        &args.domain,
        &args.email,
        args.title,
        args.php,
        &defaults::load_defaults(),
    )?;
    let domain = params.domain.clone();

    let store = SqliteJobStore::open_default()?;
    let job_id = store.create_job(&NewJob {
        server_id: args.server.clone(),
        params,
    })?;

    if args.queue {
        return Ok((
            InstallOutput {
                command: "install".to_string(),
                job_id,
                server_id: args.server,
                domain,
                queued: true,
                outcome: None,
            },
            0,
        ));
    }

    let outcome = super::run_job(&store, job_id)?;
    let exit_code = super::outcome_exit_code(&outcome);

    Ok((
        InstallOutput {
            command: "install".to_string(),
            job_id,
            server_id: args.server,
            domain,
            queued: false,
            outcome: Some(outcome),
        },
        exit_code,
    ))
}
