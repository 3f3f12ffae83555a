use wpstack::credentials::RegistryResolver;
use wpstack::defaults;
use wpstack::keychain::Keychain;
use wpstack::server::ServerRegistry;
use wpstack::ssh::OpenSshConnector;
use wpstack::store::SqliteJobStore;
use wpstack::{PipelineDriver, RunOutcome};

pub type CmdResult<T> = wpstack::Result<(T, i32)>;

pub(crate) struct GlobalArgs {}

pub mod install;
pub mod job;
pub mod plan;
pub mod server;

/// Run one job with the production resolver and OpenSSH transport.
pub(crate) fn run_job(store: &SqliteJobStore, job_id: i64) -> wpstack::Result<RunOutcome> {
    let resolver = RegistryResolver::new(ServerRegistry::open_default()?, Keychain);
    let driver = PipelineDriver::new(
        store,
        &resolver,
        OpenSshConnector::default(),
        defaults::load_defaults(),
    );
    driver.run(job_id)
}

/// Exit code for a finished run: a failed installation is a remote failure.
pub(crate) fn outcome_exit_code(outcome: &RunOutcome) -> i32 {
    match outcome {
        RunOutcome::Failed { .. } => 20,
        _ => 0,
    }
}

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run_json($args))
    };
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (wpstack::Result<serde_json::Value>, i32) {
    crate::tty::status("wpstack is working...");

    match command {
        // Commands without global context
        crate::Commands::Plan(args) => dispatch!(args, plan),

        // Commands with global context
        crate::Commands::Server(args) => dispatch!(args, global, server),
        crate::Commands::Install(args) => dispatch!(args, global, install),
        crate::Commands::Job(args) => dispatch!(args, global, job),
    }
}
