//! Child-process execution with a hard deadline.

use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct TimedOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed at the deadline.
    pub status: Option<ExitStatus>,
}

impl TimedOutput {
    pub fn timed_out(&self) -> bool {
        self.status.is_none()
    }

    pub fn exit_code(&self) -> i32 {
        self.status.and_then(|s| s.code()).unwrap_or(-1)
    }

    pub fn success(&self) -> bool {
        self.status.is_some_and(|s| s.success())
    }
}

/// Run `cmd`, feeding `stdin` and killing the process once `timeout` elapses.
///
/// stdin is fed and stdout/stderr are drained on their own threads, so a
/// chatty process cannot block on a full pipe while we wait on it.
pub fn run_with_deadline(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
) -> io::Result<TimedOutput> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = cmd.spawn()?;

    let stdout_reader = drain(child.stdout.take());
    let stderr_reader = drain(child.stderr.take());

    let stdin_writer = match (stdin, child.stdin.take()) {
        (Some(input), Some(mut pipe)) => {
            let input = input.to_vec();
            // A process that exits early closes its stdin; that is not our failure.
            Some(thread::spawn(move || {
                let _ = pipe.write_all(&input);
            }))
        }
        _ => None,
    };

    let status = wait_until(&mut child, Instant::now() + timeout)?;

    if let Some(writer) = stdin_writer {
        let _ = writer.join();
    }
    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();

    Ok(TimedOutput {
        stdout,
        stderr,
        status,
    })
}

/// Run `cmd` to completion with stdio as configured by the caller.
///
/// Returns `None` when the process was killed at the deadline. Use this for
/// processes that daemonize and would keep a captured pipe open forever.
pub fn status_with_deadline(mut cmd: Command, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let mut child = cmd.spawn()?;
    wait_until(&mut child, Instant::now() + timeout)
}

fn wait_until(child: &mut Child, deadline: Instant) -> io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).to_string()
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script]);
        cmd
    }

    #[test]
    fn captures_output_and_status() {
        let out = run_with_deadline(sh("echo out; echo err >&2; exit 3"), None, Duration::from_secs(5))
            .unwrap();

        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
        assert_eq!(out.exit_code(), 3);
        assert!(!out.timed_out());
    }

    #[test]
    fn feeds_stdin() {
        let out = run_with_deadline(sh("cat"), Some(b"hello\n"), Duration::from_secs(5)).unwrap();
        assert_eq!(out.stdout, "hello\n");
        assert!(out.success());
    }

    #[test]
    fn kills_at_deadline() {
        let started = Instant::now();
        let out = run_with_deadline(sh("exec sleep 5"), None, Duration::from_millis(200)).unwrap();

        assert!(out.timed_out());
        assert_eq!(out.exit_code(), -1);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn status_with_deadline_reports_exit() {
        let mut cmd = sh("exit 5");
        cmd.stdout(Stdio::null()).stderr(Stdio::null());
        let status = status_with_deadline(cmd, Duration::from_secs(5)).unwrap();
        assert_eq!(status.and_then(|s| s.code()), Some(5));
    }
}
