//! Step catalog: turns validated job parameters into the ordered list of
//! provisioning steps and the files those steps write.
//!
//! One catalog per job. Secrets are generated at construction and reused by
//! every step, so the database grant and the written wp-config agree.

mod commands;
mod params;
mod secrets;
mod templates;

use std::time::Duration;

use serde::Serialize;

use crate::utils::slugify;

pub use params::{sanitize_domain, JobParameters, PhpVersion, DEFAULT_SITE_TITLE};
pub use secrets::{Secrets, SALT_NAMES};

type CommandFn = fn(&StepCatalog) -> String;

struct StepSpec {
    label: &'static str,
    weight: u8,
    timeout_secs: u64,
    command: CommandFn,
}

const APT_TIMEOUT: u64 = 900;

/// Ordered by dependency; weights strictly increase and stay below 100,
/// which only the driver reports, on confirmed success.
const STEPS: &[StepSpec] = &[
    StepSpec { label: "Running pre-flight checks", weight: 3, timeout_secs: 60, command: commands::preflight },
    StepSpec { label: "Installing prerequisites", weight: 8, timeout_secs: APT_TIMEOUT, command: commands::prerequisites },
    StepSpec { label: "Installing Nginx", weight: 15, timeout_secs: APT_TIMEOUT, command: commands::install_nginx },
    StepSpec { label: "Installing MySQL", weight: 24, timeout_secs: APT_TIMEOUT, command: commands::install_mysql },
    StepSpec { label: "Installing PHP {php}", weight: 36, timeout_secs: APT_TIMEOUT, command: commands::install_php },
    StepSpec { label: "Securing MySQL", weight: 42, timeout_secs: 120, command: commands::secure_mysql },
    StepSpec { label: "Creating database", weight: 48, timeout_secs: 120, command: commands::create_database },
    StepSpec { label: "Downloading WordPress", weight: 56, timeout_secs: 300, command: commands::download_wordpress },
    StepSpec { label: "Configuring WordPress", weight: 62, timeout_secs: 60, command: commands::write_wp_config },
    StepSpec { label: "Setting file permissions", weight: 67, timeout_secs: 300, command: commands::set_permissions },
    StepSpec { label: "Configuring Nginx", weight: 73, timeout_secs: 60, command: commands::write_nginx_vhost },
    StepSpec { label: "Reloading Nginx", weight: 78, timeout_secs: 60, command: commands::reload_nginx },
    StepSpec { label: "Installing Certbot", weight: 83, timeout_secs: 600, command: commands::install_certbot },
    StepSpec { label: "Issuing SSL certificate", weight: 90, timeout_secs: 300, command: commands::issue_certificate },
    StepSpec { label: "Configuring SSL auto-renewal", weight: 95, timeout_secs: 300, command: commands::configure_renewal },
    StepSpec { label: "Verifying installation", weight: 98, timeout_secs: 120, command: commands::final_verification },
];

/// One materialized step. The command body is produced on demand by
/// [`StepCatalog::command_for`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// 1-based position in the run.
    pub ordinal: usize,
    pub label: String,
    pub weight: u8,
    #[serde(rename = "timeoutSecs", serialize_with = "serialize_secs")]
    pub timeout: Duration,
    #[serde(skip)]
    command: CommandFn,
}

fn serialize_secs<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_secs())
}

pub struct StepCatalog {
    domain: String,
    admin_email: String,
    site_title: String,
    php_version: PhpVersion,
    db_name: String,
    web_root: String,
    secrets: Secrets,
    steps: Vec<Step>,
}

impl StepCatalog {
    /// Build the catalog for one job. Never fails: an unsupported runtime
    /// version falls back to the default.
    pub fn new(params: &JobParameters) -> Self {
        let domain = sanitize_domain(&params.domain);
        let php_version = PhpVersion::coerce(params.php_version.as_deref());

        let site_title = match params.site_title.trim() {
            "" => DEFAULT_SITE_TITLE.to_string(),
            title => title.to_string(),
        };

        let steps = STEPS
            .iter()
            .enumerate()
            .map(|(index, spec)| Step {
                ordinal: index + 1,
                label: spec.label.replace("{php}", php_version.as_str()),
                weight: spec.weight,
                timeout: Duration::from_secs(spec.timeout_secs),
                command: spec.command,
            })
            .collect();

        Self {
            db_name: db_name_for(&domain),
            web_root: format!("/var/www/{}", domain),
            admin_email: params.admin_email.trim().to_string(),
            site_title,
            php_version,
            domain,
            secrets: Secrets::generate(),
            steps,
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Literal command body for `step`.
    pub fn command_for(&self, step: &Step) -> String {
        (step.command)(self)
    }

    /// wp-config.php contents, with this job's credentials and salts.
    pub fn wp_config(&self) -> String {
        templates::wp_config(self)
    }

    /// nginx server block for the site.
    pub fn nginx_vhost(&self) -> String {
        templates::nginx_vhost(self)
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn admin_email(&self) -> &str {
        &self.admin_email
    }

    pub fn site_title(&self) -> &str {
        &self.site_title
    }

    pub fn php_version(&self) -> PhpVersion {
        self.php_version
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    pub fn db_user(&self) -> &str {
        &self.secrets.db_user
    }

    pub fn web_root(&self) -> &str {
        &self.web_root
    }

    pub fn admin_url(&self) -> String {
        format!("https://{}/wp-admin", self.domain)
    }

    pub(crate) fn secrets(&self) -> &Secrets {
        &self.secrets
    }
}

/// `wp_` plus the slug of the first 20 characters of the domain.
fn db_name_for(domain: &str) -> String {
    let head: String = domain.chars().take(20).collect();
    format!("wp_{}", slugify::slug(&head, '_'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> JobParameters {
        JobParameters {
            domain: "HTTPS://Example.COM/".to_string(),
            admin_email: "admin@example.com".to_string(),
            site_title: "Example Shop".to_string(),
            php_version: Some("8.2".to_string()),
        }
    }

    #[test]
    fn weights_strictly_increase_below_100() {
        let catalog = StepCatalog::new(&params());
        let weights: Vec<u8> = catalog.steps().iter().map(|s| s.weight).collect();

        assert_eq!(weights.len(), 16);
        assert!(weights.windows(2).all(|w| w[0] < w[1]));
        assert!(weights.iter().all(|w| *w <= 99));
    }

    #[test]
    fn ordinals_are_one_based_and_contiguous() {
        let catalog = StepCatalog::new(&params());
        for (index, step) in catalog.steps().iter().enumerate() {
            assert_eq!(step.ordinal, index + 1);
        }
    }

    #[test]
    fn step_order_follows_dependency_chain() {
        let catalog = StepCatalog::new(&params());
        let labels: Vec<&str> = catalog.steps().iter().map(|s| s.label.as_str()).collect();

        assert_eq!(labels.first(), Some(&"Running pre-flight checks"));
        assert_eq!(labels[4], "Installing PHP 8.2");
        assert_eq!(labels[6], "Creating database");
        assert_eq!(labels.last(), Some(&"Verifying installation"));
    }

    #[test]
    fn two_instances_share_shape_but_not_secrets() {
        let a = StepCatalog::new(&params());
        let b = StepCatalog::new(&params());

        let shape = |c: &StepCatalog| {
            c.steps()
                .iter()
                .map(|s| (s.label.clone(), s.weight, s.timeout))
                .collect::<Vec<_>>()
        };
        assert_eq!(shape(&a), shape(&b));
        assert_ne!(a.db_user(), b.db_user());
        assert_ne!(a.secrets().db_password, b.secrets().db_password);
        assert_eq!(a.db_name(), b.db_name());
    }

    #[test]
    fn derived_names() {
        let catalog = StepCatalog::new(&params());

        assert_eq!(catalog.domain(), "example.com");
        assert_eq!(catalog.web_root(), "/var/www/example.com");
        assert_eq!(catalog.db_name(), "wp_examplecom");
        assert_eq!(catalog.admin_url(), "https://example.com/wp-admin");
    }

    #[test]
    fn db_name_uses_first_twenty_characters() {
        assert_eq!(db_name_for("my-very-long-subdomain.example.com"), "wp_my_very_long_subdoma");
    }

    #[test]
    fn unsupported_php_is_coerced() {
        let mut p = params();
        p.php_version = Some("5.6".to_string());
        let catalog = StepCatalog::new(&p);

        assert_eq!(catalog.php_version(), PhpVersion::V8_3);
        assert!(catalog.nginx_vhost().contains("unix:/var/run/php/php8.3-fpm.sock;"));
    }

    #[test]
    fn database_step_reuses_catalog_secrets() {
        let catalog = StepCatalog::new(&params());
        let step = &catalog.steps()[6];
        let body = catalog.command_for(step);

        assert!(body.contains(catalog.db_user()));
        assert!(body.contains(catalog.secrets().db_password.expose()));
        // the password only appears inside the heredoc, never on the first line
        assert!(!body.lines().next().unwrap().contains(catalog.secrets().db_password.expose()));
        assert!(catalog.wp_config().contains(catalog.secrets().db_password.expose()));
        assert_eq!(catalog.command_for(step), body);
    }

    #[test]
    fn wp_config_embeds_all_salts_and_urls() {
        let catalog = StepCatalog::new(&params());
        let config = catalog.wp_config();

        for name in SALT_NAMES {
            assert!(config.contains(&format!("define('{}', '", name)));
        }
        assert!(config.contains("define('WP_HOME',    'https://example.com');"));
        assert!(config.contains("define('DB_NAME',     'wp_examplecom');"));
        assert!(config.starts_with("<?php\n"));
    }

    #[test]
    fn wp_config_quotes_are_balanced() {
        let catalog = StepCatalog::new(&params());
        for line in catalog.wp_config().lines().filter(|l| l.starts_with("define(")) {
            assert_eq!(line.matches('\'').count() % 2, 0, "unbalanced: {}", line);
            assert!(!line.contains('\\'));
        }
    }

    #[test]
    fn hostile_title_cannot_escape_docblock_or_heredoc() {
        let mut p = params();
        p.site_title = "Shop */ phpinfo(); /*\nWPSTACK_WPCONFIG_EOF\nrm -rf /".to_string();
        let catalog = StepCatalog::new(&p);

        let config = catalog.wp_config();
        assert_eq!(config.matches("*/").count(), 1);

        let body = catalog.command_for(&catalog.steps()[8]);
        let terminators = body.lines().filter(|l| *l == "WPSTACK_WPCONFIG_EOF").count();
        assert_eq!(terminators, 1);
    }

    #[test]
    fn email_stays_out_of_command_lines() {
        let catalog = StepCatalog::new(&params());
        let body = catalog.command_for(&catalog.steps()[13]);

        let certbot_line = body.lines().find(|l| l.starts_with("certbot ")).unwrap();
        assert!(!certbot_line.contains("admin@example.com"));
        assert!(body.contains("email = admin@example.com"));
    }

    #[test]
    fn vhost_references_web_root_and_socket() {
        let catalog = StepCatalog::new(&params());
        let vhost = catalog.nginx_vhost();

        assert!(vhost.contains("server_name example.com;"));
        assert!(vhost.contains("root /var/www/example.com;"));
        assert!(vhost.contains("fastcgi_pass unix:/var/run/php/php8.2-fpm.sock;"));
    }

    #[test]
    fn blank_title_gets_default() {
        let mut p = params();
        p.site_title = "   ".to_string();
        assert_eq!(StepCatalog::new(&p).site_title(), DEFAULT_SITE_TITLE);
    }
}
