use clap::Args;
use serde::Serialize;

use wpstack::catalog::{Step, StepCatalog};
use wpstack::defaults;

use super::CmdResult;

#[derive(Args)]
pub struct PlanArgs {
    /// Site domain
    #[arg(long)]
    domain: String,
    /// Admin email
    #[arg(long)]
    email: String,
    /// Site title
    #[arg(long)]
    title: Option<String>,
    /// PHP version (8.1, 8.2, 8.3, 8.4)
    #[arg(long)]
    php: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanOutput {
    command: String,
    domain: String,
    php_version: String,
    db_name: String,
    web_root: String,
    admin_url: String,
    steps: Vec<Step>,
}

pub fn run_json(args: PlanArgs) -> CmdResult<PlanOutput> {
    let params = super::install::parameters(
        &args.domain,
        &args.email,
        args.title,
        args.php,
        &defaults::load_defaults(),
    )?;
    let catalog = StepCatalog::new(&params);

    Ok((
        PlanOutput {
            command: "plan".to_string(),
            domain: catalog.domain().to_string(),
            php_version: catalog.php_version().as_str().to_string(),
            db_name: catalog.db_name().to_string(),
            web_root: catalog.web_root().to_string(),
            admin_url: catalog.admin_url(),
            steps: catalog.steps().to_vec(),
        },
        0,
    ))
}
