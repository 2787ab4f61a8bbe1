use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Faults at the external-command boundary. Controls map every variant to an
/// ERROR result; none of these propagate past the control.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("command `{0}` not found")]
    NotFound(String),
    #[error("command `{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
    #[error("failed to run `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Captured output of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool { self.exit_code == Some(0) }

    /// stdout and stderr concatenated, for commands (like `nginx -V`) that
    /// split their output across both streams.
    pub fn combined(&self) -> String {
        let mut s = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !s.is_empty() && !s.ends_with('\n') {
                s.push('\n');
            }
            s.push_str(&self.stderr);
        }
        s
    }
}

/// Executes system commands, allowing the real implementation to be swapped
/// for a scripted one in tests. Invocations are self-contained: no shell, no
/// shared handles, and every call returns within the given timeout.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[&str], timeout: Duration) -> Result<CommandOutput, ExecError>;
}

/// Real runner backed by std::process. The child is spawned with piped stdio,
/// drained on reader threads, and killed once the deadline passes.
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[&str], timeout: Duration) -> Result<CommandOutput, ExecError> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ExecError::NotFound(program.to_string())
                } else {
                    ExecError::Io { command: program.to_string(), source: e }
                }
            })?;
        wait_with_deadline(child, program, timeout)
    }
}

fn wait_with_deadline(mut child: Child, program: &str, timeout: Duration) -> Result<CommandOutput, ExecError> {
    let io_err = |source| ExecError::Io { command: program.to_string(), source };

    // Reader threads keep the pipes drained so a chatty child cannot block on
    // a full pipe buffer while we poll for exit.
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let out_handle = std::thread::spawn(move || drain(stdout));
    let err_handle = std::thread::spawn(move || drain(stderr));

    let deadline = Instant::now() + timeout;
    let exit_code = loop {
        match child.try_wait().map_err(io_err)? {
            Some(status) => break status.code(),
            None => {
                if Instant::now() >= deadline {
                    // Kill and reap; Err from kill means the child already
                    // exited between polls, so take that exit instead.
                    if child.kill().is_ok() {
                        let _ = child.wait();
                        let _ = out_handle.join();
                        let _ = err_handle.join();
                        return Err(ExecError::Timeout {
                            command: program.to_string(),
                            timeout,
                        });
                    }
                    break child.wait().map_err(io_err)?.code();
                }
                std::thread::sleep(Duration::from_millis(20));
            }
        }
    };

    let stdout = out_handle.join().unwrap_or_default();
    let stderr = err_handle.join().unwrap_or_default();
    Ok(CommandOutput { exit_code, stdout, stderr })
}

fn drain(pipe: Option<impl Read>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    String::from_utf8_lossy(&buf).into_owned()
}


#[cfg(test)]
mod tests {
    use super::mock::{MockCommandRunner, MockResponse};
    use super::*;

    #[test]
    fn real_runner_captures_output() {
        let out = SystemCommandRunner
            .run("echo", &["hello"], Duration::from_secs(5))
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn real_runner_reports_missing_command() {
        let err = SystemCommandRunner
            .run("definitely-not-a-real-binary-4afc", &[], Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, ExecError::NotFound(_)));
    }

    #[test]
    fn real_runner_kills_at_timeout() {
        let start = Instant::now();
        let err = SystemCommandRunner
            .run("sleep", &["30"], Duration::from_millis(200))
            .unwrap_err();
        assert!(matches!(err, ExecError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn real_runner_reports_nonzero_exit() {
        let out = SystemCommandRunner
            .run("sh", &["-c", "exit 3"], Duration::from_secs(5))
            .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.success());
    }

    #[test]
    fn combined_joins_both_streams() {
        let out = CommandOutput {
            exit_code: Some(0),
            stdout: "out".to_string(),
            stderr: "err".to_string(),
        };
        assert_eq!(out.combined(), "out\nerr");
    }

    #[test]
    fn mock_runner_replays_scripted_output() {
        let runner = MockCommandRunner::with_responses(vec![MockResponse::ok(
            "nginx", 0, "", "nginx version: nginx/1.26.1",
        )]);
        let out = runner.run("nginx", &["-v"], Duration::from_secs(1)).unwrap();
        assert!(out.stderr.contains("nginx"));
        assert_eq!(runner.calls(), vec!["nginx -v"]);
    }

    #[test]
    fn mock_runner_defaults_to_empty_success() {
        let runner = MockCommandRunner::new();
        let out = runner.run("systemctl", &["reload", "nginx"], Duration::from_secs(1)).unwrap();
        assert!(out.success());
    }
}
