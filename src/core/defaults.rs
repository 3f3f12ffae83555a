use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::paths;

/// Root configuration structure for wpstack.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WpstackConfig {
    #[serde(default)]
    pub defaults: Defaults,
}

/// All configurable defaults that can be overridden via wpstack.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default = "default_ssh")]
    pub ssh: SshConfig,

    #[serde(default = "default_limits")]
    pub limits: LimitsConfig,

    #[serde(default = "default_runtime")]
    pub runtime: RuntimeConfig,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            ssh: default_ssh(),
            limits: default_limits(),
            runtime: default_runtime(),
        }
    }
}

/// Transport policy for remote sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_exec_timeout_secs")]
    pub default_exec_timeout_secs: u64,

    /// Attempts per `execute_or_fail` call, first try included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,

    #[serde(default = "default_server_alive_interval")]
    pub server_alive_interval: u32,

    #[serde(default = "default_strict_host_key_checking")]
    pub strict_host_key_checking: String,
}

/// Output scanning windows and byte budgets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitsConfig {
    /// How many trailing lines are searched for the exit marker.
    #[serde(default = "default_marker_window_lines")]
    pub marker_window_lines: usize,

    /// Bytes of step output kept in the job log (head of output).
    #[serde(default = "default_step_log_bytes")]
    pub step_log_bytes: usize,

    /// Bytes of failing command output carried in the error (tail of output).
    #[serde(default = "default_failure_tail_bytes")]
    pub failure_tail_bytes: usize,

    /// Bytes of the error message persisted on a failed job.
    #[serde(default = "default_error_message_bytes")]
    pub error_message_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    #[serde(default = "default_php_version")]
    pub default_php_version: String,
}

impl Default for SshConfig {
    fn default() -> Self {
        default_ssh()
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        default_limits()
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        default_runtime()
    }
}

impl SshConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn default_exec_timeout(&self) -> Duration {
        Duration::from_secs(self.default_exec_timeout_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }
}

// =============================================================================
// Default value functions
// =============================================================================

fn default_ssh() -> SshConfig {
    SshConfig {
        connect_timeout_secs: default_connect_timeout_secs(),
        default_exec_timeout_secs: default_exec_timeout_secs(),
        max_attempts: default_max_attempts(),
        backoff_secs: default_backoff_secs(),
        server_alive_interval: default_server_alive_interval(),
        strict_host_key_checking: default_strict_host_key_checking(),
    }
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_exec_timeout_secs() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_secs() -> u64 {
    5
}

fn default_server_alive_interval() -> u32 {
    15
}

fn default_strict_host_key_checking() -> String {
    "accept-new".to_string()
}

fn default_limits() -> LimitsConfig {
    LimitsConfig {
        marker_window_lines: default_marker_window_lines(),
        step_log_bytes: default_step_log_bytes(),
        failure_tail_bytes: default_failure_tail_bytes(),
        error_message_bytes: default_error_message_bytes(),
    }
}

fn default_marker_window_lines() -> usize {
    5
}

fn default_step_log_bytes() -> usize {
    2000
}

fn default_failure_tail_bytes() -> usize {
    1500
}

fn default_error_message_bytes() -> usize {
    1000
}

fn default_runtime() -> RuntimeConfig {
    RuntimeConfig {
        default_php_version: default_php_version(),
    }
}

fn default_php_version() -> String {
    "8.3".to_string()
}

// =============================================================================
// Loading functions
// =============================================================================

/// Load defaults, merging file config with built-in defaults.
/// If wpstack.json is missing or invalid, silently returns built-in defaults.
pub fn load_defaults() -> Defaults {
    load_config().defaults
}

/// Load the full wpstack.json config, falling back to defaults on any error.
pub fn load_config() -> WpstackConfig {
    match load_config_from_file() {
        Ok(Some(config)) => config,
        Ok(None) => WpstackConfig::default(),
        Err(err) => {
            tracing::warn!(error = %err, "ignoring unreadable wpstack.json, using built-in defaults");
            WpstackConfig::default()
        }
    }
}

fn load_config_from_file() -> crate::Result<Option<WpstackConfig>> {
    let path = paths::wpstack_json()?;

    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(&path).map_err(|e| {
        crate::Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
    })?;

    let config: WpstackConfig = serde_json::from_str(&content)
        .map_err(|e| crate::Error::config_invalid_json(path.display().to_string(), e))?;

    Ok(Some(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_in_defaults() {
        let config: WpstackConfig =
            serde_json::from_str(r#"{"defaults":{"ssh":{"maxAttempts":5}}}"#).unwrap();

        assert_eq!(config.defaults.ssh.max_attempts, 5);
        assert_eq!(config.defaults.ssh.connect_timeout_secs, 30);
        assert_eq!(config.defaults.limits.marker_window_lines, 5);
        assert_eq!(config.defaults.runtime.default_php_version, "8.3");
    }

    #[test]
    fn empty_object_is_all_defaults() {
        let config: WpstackConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.defaults.limits.step_log_bytes, 2000);
        assert_eq!(config.defaults.limits.error_message_bytes, 1000);
        assert_eq!(config.defaults.ssh.default_exec_timeout(), Duration::from_secs(300));
    }
}
