use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigInvalidJson,
    ConfigInvalidValue,

    ValidationMissingArgument,
    ValidationInvalidArgument,
    ValidationInvalidJson,

    ServerNotFound,
    JobNotFound,
    JobNotPending,
    JobAlreadyActive,

    SshServerInvalid,
    SshIdentityFileNotFound,
    SshAuthFailed,
    SshConnectFailed,
    SshSessionLost,

    RemoteCommandFailed,
    RemoteCommandTimeout,

    ProvisionStepFailed,

    InternalIoError,
    InternalJsonError,
    InternalDatabaseError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigInvalidJson => "config.invalid_json",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::ValidationMissingArgument => "validation.missing_argument",
            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",
            ErrorCode::ValidationInvalidJson => "validation.invalid_json",

            ErrorCode::ServerNotFound => "server.not_found",
            ErrorCode::JobNotFound => "job.not_found",
            ErrorCode::JobNotPending => "job.not_pending",
            ErrorCode::JobAlreadyActive => "job.already_active",

            ErrorCode::SshServerInvalid => "ssh.server_invalid",
            ErrorCode::SshIdentityFileNotFound => "ssh.identity_file_not_found",
            ErrorCode::SshAuthFailed => "ssh.auth_failed",
            ErrorCode::SshConnectFailed => "ssh.connect_failed",
            ErrorCode::SshSessionLost => "ssh.session_lost",

            ErrorCode::RemoteCommandFailed => "remote.command_failed",
            ErrorCode::RemoteCommandTimeout => "remote.command_timeout",

            ErrorCode::ProvisionStepFailed => "provision.step_failed",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalDatabaseError => "internal.database_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    pub retryable: Option<bool>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidJsonDetails {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotFoundDetails {
    pub id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingArgumentDetails {
    pub args: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tried: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalJsonErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCommandFailedDetails {
    /// First line of the command body; heredoc payloads never appear here.
    pub command: String,
    pub exit_code: i32,
    pub output_tail: String,
    pub target: TargetDetails,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportFailureDetails {
    pub error: String,
    pub target: TargetDetails,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SshServerInvalidDetails {
    pub server_id: String,
    pub missing_fields: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SshIdentityFileNotFoundDetails {
    pub server_id: String,
    pub identity_file: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStateDetails {
    pub job_id: i64,
    pub status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepFailedDetails {
    pub ordinal: usize,
    pub total: usize,
    pub label: String,
    pub cause_code: String,
    pub cause: Value,
}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            retryable: None,
        }
    }

    /// Connectivity-class failures: the only errors the session retry loop reconnects on.
    pub fn is_transport(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::SshConnectFailed | ErrorCode::SshSessionLost | ErrorCode::RemoteCommandTimeout
        )
    }

    pub fn validation_missing_argument(args: Vec<String>) -> Self {
        Self::new(
            ErrorCode::ValidationMissingArgument,
            "Missing required argument",
            to_details(MissingArgumentDetails { args }),
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        let problem = problem.into();
        let details = to_details(InvalidArgumentDetails {
            field: field.into(),
            problem: problem.clone(),
            id,
            tried,
        });

        Self::new(
            ErrorCode::ValidationInvalidArgument,
            format!("Invalid argument: {}", problem),
            details,
        )
    }

    pub fn validation_invalid_json(err: serde_json::Error, context: Option<String>) -> Self {
        let details = serde_json::json!({
            "error": err.to_string(),
            "context": context,
        });

        Self::new(ErrorCode::ValidationInvalidJson, "Invalid JSON", details)
    }

    pub fn server_not_found(id: impl Into<String>) -> Self {
        Self::not_found(ErrorCode::ServerNotFound, "Server not found", id)
            .with_hint("Run 'wpstack server list' to see available servers")
    }

    pub fn job_not_found(id: i64) -> Self {
        Self::not_found(ErrorCode::JobNotFound, "Job not found", id.to_string())
            .with_hint("Run 'wpstack job list' to see recorded jobs")
    }

    fn not_found(code: ErrorCode, message: &str, id: impl Into<String>) -> Self {
        Self::new(code, message, to_details(NotFoundDetails { id: id.into() }))
    }

    pub fn job_not_pending(job_id: i64, status: impl Into<String>) -> Self {
        let status = status.into();
        Self::new(
            ErrorCode::JobNotPending,
            format!("Job #{} is {}, not pending", job_id, status),
            to_details(JobStateDetails { job_id, status }),
        )
    }

    pub fn job_already_active(job_id: i64, status: impl Into<String>) -> Self {
        let status = status.into();
        Self::new(
            ErrorCode::JobAlreadyActive,
            format!(
                "An installation (job #{}) is already {} for this domain on this server",
                job_id, status
            ),
            to_details(JobStateDetails { job_id, status }),
        )
        .with_hint(format!("Run 'wpstack job status {}' to follow it", job_id))
    }

    pub fn ssh_server_invalid(server_id: impl Into<String>, missing_fields: Vec<String>) -> Self {
        let details = to_details(SshServerInvalidDetails {
            server_id: server_id.into(),
            missing_fields,
        });

        Self::new(
            ErrorCode::SshServerInvalid,
            "Server is not properly configured",
            details,
        )
        .with_hint("Configure an SSH key or password with 'wpstack server set-key' or 'wpstack server set-password'")
    }

    pub fn ssh_identity_file_not_found(
        server_id: impl Into<String>,
        identity_file: impl Into<String>,
    ) -> Self {
        let details = to_details(SshIdentityFileNotFoundDetails {
            server_id: server_id.into(),
            identity_file: identity_file.into(),
        });

        Self::new(
            ErrorCode::SshIdentityFileNotFound,
            "SSH identity file not found",
            details,
        )
    }

    pub fn ssh_auth_failed(target: TargetDetails, error: impl Into<String>) -> Self {
        let message = format!(
            "SSH authentication failed for {}@{}:{}",
            target.user, target.host, target.port
        );
        let details = to_details(TransportFailureDetails {
            error: error.into(),
            target,
            attempts: None,
        });

        let mut err = Self::new(ErrorCode::SshAuthFailed, message, details);
        err.retryable = Some(false);
        err
    }

    pub fn ssh_connect_failed(target: TargetDetails, error: impl Into<String>) -> Self {
        let error = error.into();
        let message = format!(
            "SSH connection to {}:{} failed: {}",
            target.host,
            target.port,
            error.trim()
        );
        let details = to_details(TransportFailureDetails {
            error,
            target,
            attempts: None,
        });

        let mut err = Self::new(ErrorCode::SshConnectFailed, message, details);
        err.retryable = Some(true);
        err
    }

    pub fn ssh_session_lost(target: TargetDetails, error: impl Into<String>) -> Self {
        let error = error.into();
        let message = format!(
            "SSH session to {}:{} was lost: {}",
            target.host,
            target.port,
            error.trim()
        );
        let details = to_details(TransportFailureDetails {
            error,
            target,
            attempts: None,
        });

        let mut err = Self::new(ErrorCode::SshSessionLost, message, details);
        err.retryable = Some(true);
        err
    }

    pub fn remote_command_timeout(target: TargetDetails, command: &str, timeout_secs: u64) -> Self {
        let details = to_details(TransportFailureDetails {
            error: format!("no completion within {}s: {}", timeout_secs, command),
            target,
            attempts: None,
        });

        let mut err = Self::new(
            ErrorCode::RemoteCommandTimeout,
            format!("Command timed out after {}s: {}", timeout_secs, command),
            details,
        );
        err.retryable = Some(true);
        err
    }

    pub fn remote_command_failed(details: RemoteCommandFailedDetails) -> Self {
        let message = format!(
            "Command failed (exit code {}): {}\nOutput: {}",
            details.exit_code, details.command, details.output_tail
        );

        let mut err = Self::new(ErrorCode::RemoteCommandFailed, message, to_details(details));
        err.retryable = Some(false);
        err
    }

    /// Wrap a step's failure with its position so reports read "failed at step N of M".
    pub fn provision_step_failed(
        ordinal: usize,
        total: usize,
        label: impl Into<String>,
        cause: Error,
    ) -> Self {
        let label = label.into();
        let message = format!(
            "Failed at step {} of {} '{}': {}",
            ordinal, total, label, cause.message
        );
        let details = to_details(StepFailedDetails {
            ordinal,
            total,
            label,
            cause_code: cause.code.as_str().to_string(),
            cause: cause.details,
        });

        let mut err = Self::new(ErrorCode::ProvisionStepFailed, message, details);
        err.hints = cause.hints;
        err.retryable = Some(false);
        err
    }

    /// Record how many attempts a transport error survived before surfacing.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        if let Value::Object(map) = &mut self.details {
            map.insert("attempts".to_string(), Value::from(attempts));
        }
        self.message = format!("{} (after {} attempts)", self.message, attempts);
        self
    }

    pub fn config_invalid_json(path: impl Into<String>, err: serde_json::Error) -> Self {
        let details = to_details(ConfigInvalidJsonDetails {
            path: path.into(),
            error: err.to_string(),
        });

        Self::new(
            ErrorCode::ConfigInvalidJson,
            "Invalid JSON in configuration",
            details,
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let details = to_details(ConfigInvalidValueDetails {
            key: key.into(),
            value,
            problem: problem.into(),
        });

        Self::new(
            ErrorCode::ConfigInvalidValue,
            "Invalid configuration value",
            details,
        )
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        let error = error.into();
        let message = match &context {
            Some(ctx) => format!("IO error ({}): {}", ctx, error),
            None => format!("IO error: {}", error),
        };
        let details = to_details(InternalIoErrorDetails { error, context });

        Self::new(ErrorCode::InternalIoError, message, details)
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        let details = to_details(InternalJsonErrorDetails {
            error: error.into(),
            context,
        });

        Self::new(ErrorCode::InternalJsonError, "JSON error", details)
    }

    pub fn internal_database(error: impl Into<String>, context: Option<String>) -> Self {
        let error = error.into();
        let message = match &context {
            Some(ctx) => format!("Database error ({}): {}", ctx, error),
            None => format!("Database error: {}", error),
        };
        let details = serde_json::json!({ "error": error, "context": context });

        Self::new(ErrorCode::InternalDatabaseError, message, details)
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        let error = error.into();
        Self::new(
            ErrorCode::InternalUnexpected,
            format!("Unexpected error: {}", error),
            serde_json::json!({ "error": error }),
        )
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::internal_database(err.to_string(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> TargetDetails {
        TargetDetails {
            server_id: Some("web1".to_string()),
            host: "203.0.113.7".to_string(),
            port: 22,
            user: "root".to_string(),
        }
    }

    #[test]
    fn transport_codes_are_retryable_kinds() {
        assert!(Error::ssh_connect_failed(target(), "connection refused").is_transport());
        assert!(Error::ssh_session_lost(target(), "marker missing").is_transport());
        assert!(Error::remote_command_timeout(target(), "apt-get update", 30).is_transport());
    }

    #[test]
    fn auth_and_command_failures_are_not_transport() {
        assert!(!Error::ssh_auth_failed(target(), "Permission denied").is_transport());

        let err = Error::remote_command_failed(RemoteCommandFailedDetails {
            command: "apt-get install -y nginx".to_string(),
            exit_code: 100,
            output_tail: "E: Unable to locate package".to_string(),
            target: target(),
        });
        assert!(!err.is_transport());
        assert_eq!(err.retryable, Some(false));
        assert!(err.message.contains("exit code 100"));
        assert!(err.message.contains("Unable to locate package"));
    }

    #[test]
    fn step_failure_wraps_cause_with_position() {
        let cause = Error::remote_command_failed(RemoteCommandFailedDetails {
            command: "nginx -t".to_string(),
            exit_code: 1,
            output_tail: "emerg".to_string(),
            target: target(),
        });

        let err = Error::provision_step_failed(9, 16, "Configuring WordPress", cause);

        assert_eq!(err.code, ErrorCode::ProvisionStepFailed);
        assert!(err.message.starts_with("Failed at step 9 of 16 'Configuring WordPress'"));
        assert_eq!(err.details["causeCode"], "remote.command_failed");
        assert_eq!(err.details["cause"]["exitCode"], 1);
    }

    #[test]
    fn with_attempts_annotates_details_and_message() {
        let err = Error::ssh_connect_failed(target(), "no route to host").with_attempts(3);
        assert_eq!(err.details["attempts"], 3);
        assert!(err.message.ends_with("(after 3 attempts)"));
    }
}
