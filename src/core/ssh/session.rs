use std::thread;
use std::time::Duration;

use crate::defaults::{Defaults, LimitsConfig, SshConfig};
use crate::error::{Error, RemoteCommandFailedDetails, Result};
use crate::utils::{shell, truncate};

use super::marker;
use super::target::SshTarget;

/// Opens authenticated channels to a target.
///
/// Errors must be `ssh.auth_failed` when no credential authenticates and a
/// transport code (`Error::is_transport`) when the machine cannot be reached.
pub trait Connector {
    type Channel: Channel;

    fn connect(&self, target: &SshTarget, policy: &SshConfig) -> Result<Self::Channel>;
}

/// One live remote shell.
pub trait Channel {
    /// Run a script on the remote shell and return its combined output.
    ///
    /// A non-zero remote status is not an error here; only transport
    /// failures (dropped session, deadline exceeded) are.
    fn run(&mut self, script: &str, timeout: Duration) -> Result<String>;

    /// Release the channel. Must tolerate being called more than once.
    fn close(&mut self);
}

/// An authenticated, reconnectable remote shell for one target machine.
///
/// Holds at most one live channel. The channel is released on `disconnect`
/// or when the session is dropped, whichever comes first.
pub struct RemoteSession<C: Connector> {
    connector: C,
    target: SshTarget,
    policy: SshConfig,
    limits: LimitsConfig,
    channel: Option<C::Channel>,
}

impl<C: Connector> RemoteSession<C> {
    pub fn new(connector: C, target: SshTarget, defaults: &Defaults) -> Self {
        Self {
            connector,
            target,
            policy: defaults.ssh.clone(),
            limits: defaults.limits.clone(),
            channel: None,
        }
    }

    pub fn target(&self) -> &SshTarget {
        &self.target
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    /// Open a channel, replacing (and closing) any previous one.
    pub fn connect(&mut self) -> Result<()> {
        self.disconnect();
        let channel = self.connector.connect(&self.target, &self.policy)?;
        tracing::debug!(host = %self.target.host, port = self.target.port, "ssh session opened");
        self.channel = Some(channel);
        Ok(())
    }

    /// Run `command` as-is and return its raw output. No status checking.
    pub fn execute(&mut self, command: &str, timeout: Option<Duration>) -> Result<String> {
        let timeout = timeout.unwrap_or_else(|| self.policy.default_exec_timeout());
        self.run_on_channel(command, timeout)
    }

    /// Run `command` and fail unless it exits with status 0.
    ///
    /// Transport failures close the channel and retry on a fresh one after a
    /// fixed backoff, up to `maxAttempts` tries in total. Authentication
    /// failures and non-zero exit statuses are returned immediately.
    pub fn execute_or_fail(&mut self, command: &str, timeout: Option<Duration>) -> Result<String> {
        let timeout = timeout.unwrap_or_else(|| self.policy.default_exec_timeout());
        self.with_retry(|session| session.run_checked(command, timeout))
    }

    /// Open the channel now instead of on the first command.
    ///
    /// Transport failures are retried like `execute_or_fail`; a rejected
    /// login is returned immediately. No-op when already connected.
    pub fn open(&mut self) -> Result<()> {
        self.with_retry(|session| {
            if session.is_connected() {
                Ok(())
            } else {
                session.connect()
            }
        })
    }

    fn with_retry<T>(&mut self, mut op: impl FnMut(&mut Self) -> Result<T>) -> Result<T> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op(self) {
                Err(err) if err.is_transport() => {
                    self.disconnect();

                    if attempt >= max_attempts {
                        tracing::error!(
                            host = %self.target.host,
                            attempts = attempt,
                            error = %err,
                            "giving up on ssh session"
                        );
                        return Err(err.with_attempts(attempt));
                    }

                    let delay = self.policy.backoff();
                    log_status!(
                        "ssh",
                        "Connection failed (attempt {}/{}), retrying in {}s...",
                        attempt,
                        max_attempts,
                        delay.as_secs()
                    );
                    tracing::warn!(
                        host = %self.target.host,
                        attempt,
                        max_attempts,
                        error = %err,
                        "transport failure, reconnecting"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Write `content` to `remote_path` through a quoted heredoc.
    pub fn upload_content(&mut self, content: &str, remote_path: &str) -> Result<()> {
        let command = shell::heredoc(
            &format!("cat > {}", shell::quote_path(remote_path)),
            "WPSTACK_UPLOAD_EOF",
            content,
        );
        self.execute_or_fail(&command, None).map(|_| ())
    }

    /// Release the channel. Safe to call when already disconnected.
    pub fn disconnect(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
            tracing::debug!(host = %self.target.host, "ssh session closed");
        }
    }

    /// Connect, run a trivial marker command, disconnect.
    pub fn test_connectivity(connector: C, target: SshTarget, defaults: &Defaults) -> Result<bool> {
        let mut session = Self::new(connector, target, defaults);
        let result = session
            .connect()
            .and_then(|_| session.execute("echo \"CONNECTION_OK\"", None));
        session.disconnect();
        Ok(result?.contains("CONNECTION_OK"))
    }

    fn run_checked(&mut self, command: &str, timeout: Duration) -> Result<String> {
        let marker = marker::new_marker();
        let script = marker::wrap(command, &marker);
        let output = self.run_on_channel(&script, timeout)?;

        let Some((exit_code, cleaned)) =
            marker::extract(&output, &marker, self.limits.marker_window_lines.max(1))
        else {
            return Err(Error::ssh_session_lost(
                self.target.details(),
                format!(
                    "exit marker missing from output of: {}",
                    shell::command_summary(command, 120)
                ),
            ));
        };

        if exit_code != 0 {
            return Err(Error::remote_command_failed(RemoteCommandFailedDetails {
                command: shell::command_summary(command, 120),
                exit_code,
                output_tail: truncate::tail(&cleaned, self.limits.failure_tail_bytes).to_string(),
                target: self.target.details(),
            }));
        }

        Ok(cleaned)
    }

    fn run_on_channel(&mut self, script: &str, timeout: Duration) -> Result<String> {
        if self.channel.is_none() {
            self.connect()?;
        }
        let channel = self
            .channel
            .as_mut()
            .ok_or_else(|| Error::internal_unexpected("ssh channel missing after connect"))?;
        channel.run(script, timeout)
    }
}

impl<C: Connector> Drop for RemoteSession<C> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-memory transport for session and pipeline tests.

    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::{Channel, Connector};
    use crate::defaults::SshConfig;
    use crate::error::{Error, Result};
    use crate::ssh::{Credentials, Secret, SshTarget};

    pub enum Reply {
        /// Remote command ran; report this status with this output.
        Exit(i32, String),
        /// Transport dropped mid-command.
        Drop,
        /// Output arrives without any marker line.
        NoMarker(String),
    }

    #[derive(Default)]
    pub struct FakeState {
        pub connects: usize,
        pub closes: usize,
        pub scripts: Vec<String>,
        pub connect_failures: VecDeque<Error>,
        pub replies: VecDeque<Reply>,
        /// Used when `replies` runs dry.
        pub default_reply: Option<(i32, String)>,
        pub always_drop: bool,
    }

    #[derive(Clone, Default)]
    pub struct FakeConnector {
        pub state: Arc<Mutex<FakeState>>,
    }

    pub struct FakeChannel {
        state: Arc<Mutex<FakeState>>,
        closed: bool,
    }

    pub fn target() -> SshTarget {
        SshTarget {
            server_id: Some("web1".to_string()),
            host: "203.0.113.7".to_string(),
            port: 22,
            user: "root".to_string(),
            credentials: Credentials {
                key: None,
                password: Some(Secret::new("pw")),
            },
        }
    }

    impl FakeConnector {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_replies(replies: Vec<Reply>) -> Self {
            let connector = Self::new();
            connector.state.lock().unwrap().replies = replies.into();
            connector
        }

        pub fn snapshot<T>(&self, f: impl FnOnce(&FakeState) -> T) -> T {
            f(&self.state.lock().unwrap())
        }
    }

    impl Connector for FakeConnector {
        type Channel = FakeChannel;

        fn connect(&self, _target: &SshTarget, _policy: &SshConfig) -> Result<FakeChannel> {
            let mut state = self.state.lock().unwrap();
            if let Some(err) = state.connect_failures.pop_front() {
                return Err(err);
            }
            state.connects += 1;
            Ok(FakeChannel {
                state: Arc::clone(&self.state),
                closed: false,
            })
        }
    }

    /// Marker token from the trailing `echo "<marker>:$?"` line of a wrapped script.
    pub fn marker_of(script: &str) -> Option<String> {
        let line = script.lines().rev().find(|l| l.starts_with("echo \""))?;
        let inner = line.strip_prefix("echo \"")?.strip_suffix(":$?\"")?;
        Some(inner.to_string())
    }

    impl Channel for FakeChannel {
        fn run(&mut self, script: &str, _timeout: Duration) -> Result<String> {
            let mut state = self.state.lock().unwrap();
            state.scripts.push(script.to_string());

            let details = crate::error::TargetDetails {
                server_id: None,
                host: "203.0.113.7".to_string(),
                port: 22,
                user: "root".to_string(),
            };

            if state.always_drop {
                return Err(Error::ssh_session_lost(details, "connection reset by peer"));
            }

            let reply = match state.replies.pop_front() {
                Some(reply) => reply,
                None => {
                    let (code, out) = state.default_reply.clone().unwrap_or((0, String::new()));
                    Reply::Exit(code, out)
                }
            };

            match reply {
                Reply::Drop => Err(Error::ssh_session_lost(details, "connection reset by peer")),
                Reply::NoMarker(output) => Ok(output),
                Reply::Exit(code, output) => match marker_of(script) {
                    Some(marker) => Ok(format!("{}\n{}:{}\n", output, marker, code)),
                    None => Ok(output),
                },
            }
        }

        fn close(&mut self) {
            if !self.closed {
                self.closed = true;
                self.state.lock().unwrap().closes += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{target, FakeConnector, Reply};
    use super::*;
    use crate::error::ErrorCode;

    fn defaults() -> Defaults {
        let mut defaults = Defaults::default();
        defaults.ssh.backoff_secs = 0;
        defaults.ssh.max_attempts = 3;
        defaults
    }

    fn session(connector: &FakeConnector) -> RemoteSession<FakeConnector> {
        RemoteSession::new(connector.clone(), target(), &defaults())
    }

    #[test]
    fn execute_or_fail_returns_clean_output_on_zero() {
        let connector = FakeConnector::with_replies(vec![Reply::Exit(
            0,
            "Reading package lists...\nnginx is already the newest version".to_string(),
        )]);
        let mut session = session(&connector);

        let out = session.execute_or_fail("apt-get install -y nginx", None).unwrap();

        assert!(out.contains("already the newest version"));
        assert!(!out.contains("__WPSTACK_EXIT_"));
    }

    #[test]
    fn execute_or_fail_reports_exit_code_without_retry() {
        let connector = FakeConnector::with_replies(vec![Reply::Exit(
            100,
            "E: Unable to locate package php9.9-fpm".to_string(),
        )]);
        let mut session = session(&connector);

        let err = session
            .execute_or_fail("apt-get install -y php9.9-fpm", None)
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::RemoteCommandFailed);
        assert_eq!(err.details["exitCode"], 100);
        assert!(err.message.contains("Unable to locate package"));
        assert_eq!(connector.snapshot(|s| s.scripts.len()), 1);
        assert_eq!(connector.snapshot(|s| s.connects), 1);
    }

    #[test]
    fn recovers_after_two_transport_failures() {
        let connector = FakeConnector::with_replies(vec![
            Reply::Drop,
            Reply::Drop,
            Reply::Exit(0, "ok".to_string()),
        ]);
        let mut session = session(&connector);

        let out = session.execute_or_fail("systemctl restart nginx", None).unwrap();

        assert_eq!(out, "ok");
        assert_eq!(connector.snapshot(|s| s.scripts.len()), 3);
        assert_eq!(connector.snapshot(|s| s.connects), 3);
        // the two broken channels were released before reconnecting
        assert_eq!(connector.snapshot(|s| s.closes), 2);
    }

    #[test]
    fn gives_up_after_bounded_attempts() {
        let connector = FakeConnector::new();
        connector.state.lock().unwrap().always_drop = true;
        let mut session = session(&connector);

        let err = session.execute_or_fail("true", None).unwrap_err();

        assert!(err.is_transport());
        assert_eq!(err.details["attempts"], 3);
        assert_eq!(connector.snapshot(|s| s.scripts.len()), 3);
        assert!(!session.is_connected());
    }

    #[test]
    fn missing_marker_is_treated_as_transport_failure() {
        let connector = FakeConnector::with_replies(vec![
            Reply::NoMarker("partial output".to_string()),
            Reply::Exit(0, "second try".to_string()),
        ]);
        let mut session = session(&connector);

        let out = session.execute_or_fail("curl -sLO https://wordpress.org/latest.tar.gz", None).unwrap();

        assert_eq!(out, "second try");
        assert_eq!(connector.snapshot(|s| s.connects), 2);
    }

    #[test]
    fn auth_failure_is_not_retried() {
        let connector = FakeConnector::new();
        connector
            .state
            .lock()
            .unwrap()
            .connect_failures
            .push_back(Error::ssh_auth_failed(target().details(), "Permission denied"));
        let mut session = session(&connector);

        let err = session.execute_or_fail("true", None).unwrap_err();

        assert_eq!(err.code, ErrorCode::SshAuthFailed);
        assert_eq!(connector.snapshot(|s| s.scripts.len()), 0);
    }

    #[test]
    fn connect_failure_counts_as_an_attempt() {
        let connector = FakeConnector::new();
        connector
            .state
            .lock()
            .unwrap()
            .connect_failures
            .push_back(Error::ssh_connect_failed(target().details(), "connection refused"));
        let mut session = session(&connector);

        let out = session.execute_or_fail("echo hi", None).unwrap();

        assert_eq!(out, "");
        assert_eq!(connector.snapshot(|s| s.connects), 1);
    }

    #[test]
    fn open_retries_transport_and_keeps_channel() {
        let connector = FakeConnector::new();
        connector
            .state
            .lock()
            .unwrap()
            .connect_failures
            .push_back(Error::ssh_connect_failed(target().details(), "connection refused"));
        let mut session = session(&connector);

        session.open().unwrap();
        session.open().unwrap();
        session.execute_or_fail("true", None).unwrap();

        assert!(session.is_connected());
        assert_eq!(connector.snapshot(|s| s.connects), 1);
    }

    #[test]
    fn open_returns_auth_failure_at_once() {
        let connector = FakeConnector::new();
        connector
            .state
            .lock()
            .unwrap()
            .connect_failures
            .push_back(Error::ssh_auth_failed(target().details(), "Permission denied"));
        let mut session = session(&connector);

        let err = session.open().unwrap_err();

        assert_eq!(err.code, ErrorCode::SshAuthFailed);
        assert!(err.details.get("attempts").is_none());
        assert!(!session.is_connected());
    }

    #[test]
    fn zero_marker_window_still_finds_marker() {
        let mut defaults = defaults();
        defaults.limits.marker_window_lines = 0;
        let connector = FakeConnector::with_replies(vec![Reply::Exit(0, "ok".to_string())]);
        let mut session = RemoteSession::new(connector.clone(), target(), &defaults);

        assert_eq!(session.execute_or_fail("true", None).unwrap(), "ok");
        assert_eq!(connector.snapshot(|s| s.scripts.len()), 1);
    }

    #[test]
    fn reconnect_replaces_handle_and_disconnect_is_idempotent() {
        let connector = FakeConnector::new();
        let mut session = session(&connector);

        session.connect().unwrap();
        session.connect().unwrap();
        assert_eq!(connector.snapshot(|s| s.closes), 1);

        session.disconnect();
        session.disconnect();
        assert_eq!(connector.snapshot(|s| s.closes), 2);
        assert!(!session.is_connected());
    }

    #[test]
    fn drop_releases_channel() {
        let connector = FakeConnector::new();
        {
            let mut session = session(&connector);
            session.connect().unwrap();
        }
        assert_eq!(connector.snapshot(|s| s.closes), 1);
    }

    #[test]
    fn upload_content_uses_quoted_heredoc() {
        let connector = FakeConnector::new();
        let mut session = session(&connector);

        session
            .upload_content("server { listen 80; }\n", "/etc/nginx/sites-available/example.com")
            .unwrap();

        let script = connector.snapshot(|s| s.scripts[0].clone());
        assert!(script.contains("cat > '/etc/nginx/sites-available/example.com' << 'WPSTACK_UPLOAD_EOF'"));
        assert!(script.lines().any(|l| l == "WPSTACK_UPLOAD_EOF"));
    }

    #[test]
    fn test_connectivity_round_trip() {
        let connector = FakeConnector::new();
        connector.state.lock().unwrap().default_reply = Some((0, "CONNECTION_OK".to_string()));
        // raw execute sees no marker handling; the fake echoes the reply body
        assert!(RemoteSession::test_connectivity(connector.clone(), target(), &defaults()).unwrap());
        assert_eq!(connector.snapshot(|s| s.closes), 1);
    }

    #[test]
    fn failure_tail_is_bounded() {
        let mut defaults = defaults();
        defaults.limits.failure_tail_bytes = 64;
        let noisy = format!("{}\nfatal: disk full", "x".repeat(10_000));
        let connector = FakeConnector::with_replies(vec![Reply::Exit(1, noisy)]);
        let mut session = RemoteSession::new(connector.clone(), target(), &defaults);

        let err = session.execute_or_fail("tar -xzf latest.tar.gz", None).unwrap_err();

        let tail = err.details["outputTail"].as_str().unwrap();
        assert!(tail.len() <= 64);
        assert!(tail.ends_with("fatal: disk full"));
    }
}
