//! Shell command execution
//!
//! Runs external programs with fully captured output. Every collaborator
//! (git, the environment tools, the notebook engine) goes through
//! [`CommandRunner`] so tests can substitute a fake.

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How long a killed program's streams may take to reach EOF. Grandchildren
/// that inherited the pipes can hold them open past the kill.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Shell execution errors
#[derive(Error, Debug)]
pub enum ShellError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// A program invocation with its working directory and environment
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShellCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub envs: Vec<(String, String)>,
    pub env_remove: Vec<String>,
    pub timeout: Option<Duration>,
}

impl ShellCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            envs: Vec::new(),
            env_remove: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        self.env_remove.push(key.into());
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a finished (or killed) program
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code; `None` when killed by a signal or by the timeout
    pub status: Option<i32>,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Output of a command that exited with `status`
    pub fn exited(status: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            status: Some(status),
            timed_out: false,
        }
    }
}

/// Narrow interface over process execution
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` to completion, capturing both streams
    async fn run(&self, command: &ShellCommand) -> Result<CommandOutput, ShellError>;
}

/// Runs commands as real child processes
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemShell;

#[async_trait]
impl CommandRunner for SystemShell {
    async fn run(&self, command: &ShellCommand) -> Result<CommandOutput, ShellError> {
        debug!("Running: {}", command);

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &command.cwd {
            cmd.current_dir(cwd);
        }
        for key in &command.env_remove {
            cmd.env_remove(key);
        }
        for (key, value) in &command.envs {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|source| ShellError::Spawn {
            program: command.program.clone(),
            source,
        })?;

        let (stdout, stdout_reader) = capture(child.stdout.take());
        let (stderr, stderr_reader) = capture(child.stderr.take());

        let waited = match command.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait()).await.ok(),
            None => Some(child.wait().await),
        };

        let result = match waited {
            Some(status) => {
                let status = status.map_err(|source| ShellError::Wait {
                    program: command.program.clone(),
                    source,
                })?;
                drain(stdout_reader, None).await;
                drain(stderr_reader, None).await;
                CommandOutput {
                    stdout: take(&stdout),
                    stderr: take(&stderr),
                    status: status.code(),
                    timed_out: false,
                }
            }
            None => {
                let limit = command.timeout.unwrap_or_default();
                debug!("Timed out after {:?}: {}", limit, command);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill {}: {}", command.program, e);
                }
                drain(stdout_reader, Some(DRAIN_GRACE)).await;
                drain(stderr_reader, Some(DRAIN_GRACE)).await;

                let mut stderr = take(&stderr);
                if !stderr.is_empty() && !stderr.ends_with('\n') {
                    stderr.push('\n');
                }
                stderr.push_str(&format!(
                    "{} timed out after {:?} and was killed\n",
                    command.program, limit
                ));
                CommandOutput {
                    stdout: take(&stdout),
                    stderr,
                    status: None,
                    timed_out: true,
                }
            }
        };

        debug!(
            "{} exited with {:?} ({} bytes stdout, {} bytes stderr)",
            command.program,
            result.status,
            result.stdout.len(),
            result.stderr.len()
        );

        Ok(result)
    }
}

type Captured = Arc<Mutex<Vec<u8>>>;

/// Copy `stream` into a shared buffer on a background task, so whatever was
/// read survives the task being aborted
fn capture<R>(stream: Option<R>) -> (Captured, Option<JoinHandle<()>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buffer = Captured::default();
    let reader = stream.map(|mut stream| {
        let sink = Arc::clone(&buffer);
        tokio::spawn(async move {
            let mut chunk = [0u8; 8192];
            loop {
                match stream.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if let Ok(mut buf) = sink.lock() {
                            buf.extend_from_slice(&chunk[..n]);
                        }
                    }
                }
            }
        })
    });
    (buffer, reader)
}

/// Wait for a reader to hit EOF, giving up after `grace` when set
async fn drain(reader: Option<JoinHandle<()>>, grace: Option<Duration>) {
    let Some(mut reader) = reader else {
        return;
    };
    match grace {
        None => {
            let _ = reader.await;
        }
        Some(grace) => {
            if tokio::time::timeout(grace, &mut reader).await.is_err() {
                reader.abort();
            }
        }
    }
}

fn take(buffer: &Captured) -> String {
    buffer
        .lock()
        .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        .unwrap_or_default()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let cmd = ShellCommand::new("git")
            .args(["diff", "--name-only"])
            .arg("master")
            .current_dir("/repo")
            .env("A", "1")
            .env_remove("PYTHONHOME");

        assert_eq!(cmd.args, vec!["diff", "--name-only", "master"]);
        assert_eq!(cmd.cwd, Some(PathBuf::from("/repo")));
        assert_eq!(cmd.to_string(), "git diff --name-only master");
        assert_eq!(cmd.env_remove, vec!["PYTHONHOME"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_shell_captures_streams() {
        let cmd = ShellCommand::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]);
        let output = SystemShell.run(&cmd).await.unwrap();

        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert_eq!(output.status, Some(3));
        assert!(!output.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_shell_timeout_kills() {
        let cmd = ShellCommand::new("sh")
            .args(["-c", "sleep 5"])
            .timeout(Some(Duration::from_millis(100)));
        let output = SystemShell.run(&cmd).await.unwrap();

        assert!(output.timed_out);
        assert_eq!(output.status, None);
        assert!(output.stderr.contains("timed out after 100ms"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_keeps_partial_output() {
        let cmd = ShellCommand::new("sh")
            .args(["-c", "echo started; echo hung >&2; sleep 5"])
            .timeout(Some(Duration::from_millis(200)));
        let output = SystemShell.run(&cmd).await.unwrap();

        assert!(output.timed_out);
        assert_eq!(output.status, None);
        assert_eq!(output.stdout, "started\n");
        assert!(output.stderr.starts_with("hung\n"));
        assert!(output.stderr.contains("sh timed out after 200ms and was killed"));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_error() {
        let cmd = ShellCommand::new("definitely-not-a-real-program-7c1e");
        let err = SystemShell.run(&cmd).await.unwrap_err();
        assert!(matches!(err, ShellError::Spawn { .. }));
    }
}
