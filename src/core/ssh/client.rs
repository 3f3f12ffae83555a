//! OpenSSH-backed transport.
//!
//! A ControlMaster process holds the authenticated connection; each command
//! is a short-lived `ssh -S <control> ... bash -s` that multiplexes over it and
//! receives its script on stdin, so nothing secret lands on a remote argv.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use tempfile::TempDir;

use crate::defaults::SshConfig;
use crate::error::{Error, Result, TargetDetails};
use crate::utils::{command, shell};

use super::session::{Channel, Connector};
use super::target::{PrivateKey, Secret, SshTarget};

const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// sshpass exit status for a rejected password.
const SSHPASS_BAD_PASSWORD: i32 = 5;

#[derive(Debug, Clone)]
pub struct OpenSshConnector {
    ssh_program: String,
    sshpass_program: String,
}

impl Default for OpenSshConnector {
    fn default() -> Self {
        Self {
            ssh_program: "ssh".to_string(),
            sshpass_program: "sshpass".to_string(),
        }
    }
}

pub struct OpenSshChannel {
    ssh_program: String,
    control_path: PathBuf,
    base_args: Vec<String>,
    destination: String,
    target: TargetDetails,
    closed: bool,
    // Holds the control socket and any key file; removed on drop.
    _workdir: TempDir,
}

enum Auth {
    Key(PathBuf),
    Password(Secret),
}

impl Auth {
    fn label(&self) -> &'static str {
        match self {
            Auth::Key(_) => "key",
            Auth::Password(_) => "password",
        }
    }
}

enum MasterOutcome {
    Ready,
    AuthRejected(String),
    Unreachable(String),
}

impl Connector for OpenSshConnector {
    type Channel = OpenSshChannel;

    fn connect(&self, target: &SshTarget, policy: &SshConfig) -> Result<OpenSshChannel> {
        if target.credentials.is_empty() {
            return Err(Error::ssh_auth_failed(
                target.details(),
                "no private key or password configured",
            ));
        }

        let workdir = tempfile::Builder::new()
            .prefix("wpstack-ssh-")
            .tempdir()
            .map_err(|e| Error::internal_io(e.to_string(), Some("create ssh workdir".to_string())))?;
        let control_path = workdir.path().join("ctl");
        let base_args = base_ssh_args(target, policy);

        let mut methods = Vec::new();
        match &target.credentials.key {
            Some(PrivateKey::File(path)) => {
                let expanded = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).to_string());
                if !expanded.exists() {
                    return Err(Error::ssh_identity_file_not_found(
                        target.server_id.clone().unwrap_or_else(|| target.host.clone()),
                        expanded.to_string_lossy().to_string(),
                    ));
                }
                methods.push(Auth::Key(expanded));
            }
            Some(PrivateKey::Material(material)) => {
                methods.push(Auth::Key(write_key_file(workdir.path(), material)?));
            }
            None => {}
        }
        if let Some(password) = &target.credentials.password {
            methods.push(Auth::Password(password.clone()));
        }

        let mut rejected = Vec::new();
        for auth in &methods {
            match self.start_master(target, policy, &base_args, &control_path, workdir.path(), auth)? {
                MasterOutcome::Ready => {
                    tracing::debug!(host = %target.host, auth = auth.label(), "control master up");
                    return Ok(OpenSshChannel {
                        ssh_program: self.ssh_program.clone(),
                        control_path,
                        base_args,
                        destination: target.destination(),
                        target: target.details(),
                        closed: false,
                        _workdir: workdir,
                    });
                }
                MasterOutcome::AuthRejected(reason) => {
                    tracing::debug!(host = %target.host, auth = auth.label(), %reason, "auth rejected");
                    rejected.push(format!("{}: {}", auth.label(), reason));
                }
                MasterOutcome::Unreachable(reason) => {
                    return Err(Error::ssh_connect_failed(target.details(), reason));
                }
            }
        }

        Err(Error::ssh_auth_failed(target.details(), rejected.join("; ")))
    }
}

impl OpenSshConnector {
    fn start_master(
        &self,
        target: &SshTarget,
        policy: &SshConfig,
        base_args: &[String],
        control_path: &Path,
        workdir: &Path,
        auth: &Auth,
    ) -> Result<MasterOutcome> {
        let log_path = workdir.join(format!("master-{}.log", auth.label()));
        let log = File::create(&log_path)
            .map_err(|e| Error::internal_io(e.to_string(), Some("create ssh log".to_string())))?;

        let mut cmd = match auth {
            Auth::Key(_) => Command::new(&self.ssh_program),
            Auth::Password(password) => {
                let mut cmd = Command::new(&self.sshpass_program);
                cmd.arg("-e").arg(&self.ssh_program);
                cmd.env("SSHPASS", password.expose());
                cmd
            }
        };

        cmd.args(base_args);
        match auth {
            Auth::Key(path) => {
                cmd.args(["-o", "BatchMode=yes", "-o", "IdentitiesOnly=yes"]);
                cmd.args(["-o", "PreferredAuthentications=publickey", "-o", "PasswordAuthentication=no"]);
                cmd.arg("-i").arg(path);
            }
            Auth::Password(_) => {
                cmd.args(["-o", "BatchMode=no", "-o", "PubkeyAuthentication=no"]);
                cmd.args(["-o", "PreferredAuthentications=password,keyboard-interactive"]);
                cmd.args(["-o", "NumberOfPasswordPrompts=1"]);
            }
        }
        cmd.args(["-o", "ControlMaster=yes", "-o", "ControlPersist=yes"]);
        cmd.arg("-o").arg(format!("ControlPath={}", control_path.display()));
        cmd.args(["-N", "-f"]);
        cmd.arg(target.destination());

        // A forked master inherits stderr; a pipe would never reach EOF.
        cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(log);

        let deadline = policy.connect_timeout() + Duration::from_secs(5);
        let status = command::status_with_deadline(cmd, deadline).map_err(|e| {
            let program = match auth {
                Auth::Key(_) => &self.ssh_program,
                Auth::Password(_) => &self.sshpass_program,
            };
            Error::ssh_connect_failed(target.details(), format!("failed to run {}: {}", program, e))
        })?;

        let stderr = fs::read_to_string(&log_path).unwrap_or_default();

        Ok(match status {
            None => MasterOutcome::Unreachable(format!(
                "connection not established within {}s",
                deadline.as_secs()
            )),
            Some(status) if status.success() => MasterOutcome::Ready,
            Some(status) => classify_master_failure(status.code(), &stderr, auth),
        })
    }
}

impl Channel for OpenSshChannel {
    fn run(&mut self, script: &str, timeout: Duration) -> Result<String> {
        let mut cmd = Command::new(&self.ssh_program);
        cmd.args(&self.base_args);
        cmd.args(["-o", "BatchMode=yes", "-o", "ControlMaster=no"]);
        cmd.arg("-S").arg(&self.control_path);
        cmd.arg(&self.destination);
        cmd.args(["bash", "-s"]);

        let output = command::run_with_deadline(cmd, Some(script.as_bytes()), timeout)
            .map_err(|e| Error::ssh_session_lost(self.target.clone(), e.to_string()))?;

        if output.timed_out() {
            let body = script.strip_prefix("(\n").unwrap_or(script);
            return Err(Error::remote_command_timeout(
                self.target.clone(),
                &shell::command_summary(body, 120),
                timeout.as_secs(),
            ));
        }

        // 255 is ssh's own failure status, never the remote script's.
        if output.exit_code() == 255 {
            let reason = output.stderr.trim();
            return Err(Error::ssh_session_lost(
                self.target.clone(),
                if reason.is_empty() { "ssh exited with status 255" } else { reason },
            ));
        }

        if output.stderr.trim().is_empty() {
            Ok(output.stdout)
        } else {
            Ok(format!("{}\n{}", output.stderr.trim_end(), output.stdout))
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let mut cmd = Command::new(&self.ssh_program);
        cmd.arg("-S").arg(&self.control_path);
        cmd.args(["-O", "exit"]);
        cmd.arg(&self.destination);
        cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());

        if let Err(err) = command::status_with_deadline(cmd, CLOSE_TIMEOUT) {
            tracing::debug!(host = %self.target.host, error = %err, "control master exit failed");
        }
    }
}

impl Drop for OpenSshChannel {
    fn drop(&mut self) {
        self.close();
    }
}

fn base_ssh_args(target: &SshTarget, policy: &SshConfig) -> Vec<String> {
    let mut args = Vec::new();

    if target.port != 22 {
        args.push("-p".to_string());
        args.push(target.port.to_string());
    }

    args.extend([
        "-o".to_string(),
        format!("ConnectTimeout={}", policy.connect_timeout_secs),
        "-o".to_string(),
        format!("ServerAliveInterval={}", policy.server_alive_interval),
        "-o".to_string(),
        "ServerAliveCountMax=3".to_string(),
        "-o".to_string(),
        format!("StrictHostKeyChecking={}", policy.strict_host_key_checking),
        "-o".to_string(),
        "LogLevel=ERROR".to_string(),
    ]);

    args
}

fn write_key_file(dir: &Path, material: &Secret) -> Result<PathBuf> {
    let path = dir.join("id_key");
    let mut contents = material.expose().trim().replace("\r\n", "\n");
    // OpenSSH rejects keys without a trailing newline.
    contents.push('\n');

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(&path)
        .map_err(|e| Error::internal_io(e.to_string(), Some("write private key".to_string())))?;
    file.write_all(contents.as_bytes())
        .map_err(|e| Error::internal_io(e.to_string(), Some("write private key".to_string())))?;

    Ok(path)
}

fn classify_master_failure(code: Option<i32>, stderr: &str, auth: &Auth) -> MasterOutcome {
    let reason = stderr
        .lines()
        .map(str::trim)
        .rfind(|l| !l.is_empty())
        .unwrap_or("ssh exited without output")
        .to_string();

    if matches!(auth, Auth::Password(_)) && code == Some(SSHPASS_BAD_PASSWORD) {
        return MasterOutcome::AuthRejected("password rejected".to_string());
    }

    if is_auth_rejection(stderr) {
        MasterOutcome::AuthRejected(reason)
    } else {
        MasterOutcome::Unreachable(reason)
    }
}

/// Failures that another attempt with the same credentials would repeat.
fn is_auth_rejection(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();

    let patterns = [
        "permission denied",
        "too many authentication failures",
        "no supported authentication methods",
        "host key verification failed",
        "remote host identification has changed",
        "invalid format",
        "bad permissions",
    ];

    patterns.iter().any(|p| stderr.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::Credentials;

    fn target(port: u16) -> SshTarget {
        SshTarget {
            server_id: None,
            host: "198.51.100.4".to_string(),
            port,
            user: "root".to_string(),
            credentials: Credentials::default(),
        }
    }

    #[test]
    fn base_args_carry_keepalive_and_timeouts() {
        let args = base_ssh_args(&target(22), &SshConfig::default());
        let joined = args.join(" ");

        assert!(joined.contains("ConnectTimeout=30"));
        assert!(joined.contains("ServerAliveInterval=15"));
        assert!(joined.contains("ServerAliveCountMax=3"));
        assert!(joined.contains("StrictHostKeyChecking=accept-new"));
        assert!(!args.contains(&"-p".to_string()));
    }

    #[test]
    fn base_args_include_custom_port() {
        let args = base_ssh_args(&target(2222), &SshConfig::default());
        assert_eq!(&args[0..2], &["-p".to_string(), "2222".to_string()]);
    }

    #[test]
    fn auth_and_transport_failures_are_told_apart() {
        let key = Auth::Key(PathBuf::from("/tmp/k"));

        assert!(matches!(
            classify_master_failure(Some(255), "root@host: Permission denied (publickey).", &key),
            MasterOutcome::AuthRejected(_)
        ));
        assert!(matches!(
            classify_master_failure(Some(255), "Host key verification failed.", &key),
            MasterOutcome::AuthRejected(_)
        ));
        assert!(matches!(
            classify_master_failure(
                Some(255),
                "ssh: connect to host 198.51.100.4 port 22: Connection refused",
                &key
            ),
            MasterOutcome::Unreachable(_)
        ));
    }

    #[test]
    fn sshpass_bad_password_is_auth_failure() {
        let auth = Auth::Password(Secret::new("nope"));
        assert!(matches!(
            classify_master_failure(Some(SSHPASS_BAD_PASSWORD), "", &auth),
            MasterOutcome::AuthRejected(_)
        ));
    }

    #[test]
    fn connect_without_credentials_is_auth_failure() {
        let err = OpenSshConnector::default()
            .connect(&target(22), &SshConfig::default())
            .err()
            .unwrap();
        assert_eq!(err.code, crate::error::ErrorCode::SshAuthFailed);
    }

    #[cfg(unix)]
    #[test]
    fn key_material_is_written_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = write_key_file(dir.path(), &Secret::new("-----BEGIN KEY-----\r\nabc\r\n-----END KEY-----")).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.ends_with("-----END KEY-----\n"));
        assert!(!contents.contains('\r'));
    }
}
