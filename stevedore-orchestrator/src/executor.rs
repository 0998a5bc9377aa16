//! Command Executor
//!
//! Runs a command line on the local host or on a remote host through a
//! non-interactive ssh session. The transport is always an argument
//! vector: for remote execution the payload command travels as a single
//! opaque argument to ssh, so user-controlled values can never break out
//! of the transport command. The payload itself is interpreted by a shell
//! on the target host; quoting inside it is the backend adapters'
//! responsibility (see [`shell_quote`]).

use std::process::Stdio;

use async_trait::async_trait;
use stevedore_core::domain::system::ExecutionSystem;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

/// Default ceiling on each captured output stream. Generous because
/// data-store listings and transfer logs can run long.
pub const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// A payload command under construction
///
/// Holds an ordered argument vector and renders it to the single string
/// handed to the target shell. Tokens are joined with single spaces and
/// never re-quoted here; callers quote individual tokens where needed.
#[derive(Debug, Clone)]
pub struct CommandLine {
    parts: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            parts: vec![program.into()],
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.parts.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parts.extend(args.into_iter().map(Into::into));
        self
    }

    /// The payload string delivered to the target shell.
    pub fn rendered(&self) -> String {
        self.parts.join(" ")
    }
}

/// Quotes a string for safe inclusion in a shell payload.
///
/// Single-quotes the value and escapes embedded single quotes, the one
/// construct POSIX shells cannot contain inside single quotes.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Executor failure
#[derive(Debug)]
pub enum ExecutionError {
    Io(std::io::Error),
    /// Non-zero exit status, carrying captured standard error.
    CommandFailed {
        status: i32,
        stderr: String,
    },
    OutputTooLarge {
        limit: usize,
    },
}

impl std::fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionError::Io(err) => write!(f, "failed to launch command: {}", err),
            ExecutionError::CommandFailed { status, stderr } => {
                write!(f, "command exited with status {}: {}", status, stderr.trim())
            }
            ExecutionError::OutputTooLarge { limit } => {
                write!(f, "command output exceeded {} bytes", limit)
            }
        }
    }
}

impl std::error::Error for ExecutionError {}

impl From<std::io::Error> for ExecutionError {
    fn from(err: std::io::Error) -> Self {
        ExecutionError::Io(err)
    }
}

/// Command execution seam
///
/// The one place the orchestrator touches the outside world with a shell;
/// tests substitute a recording implementation.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Runs the payload on the system's host and returns captured stdout.
    async fn execute(
        &self,
        system: &ExecutionSystem,
        command: &CommandLine,
    ) -> Result<String, ExecutionError>;
}

/// Executor backed by real processes (sh locally, ssh remotely)
pub struct ProcessCommandExecutor {
    max_output_bytes: usize,
    local_hostname: String,
}

impl ProcessCommandExecutor {
    pub fn new() -> Self {
        Self {
            max_output_bytes: MAX_OUTPUT_BYTES,
            local_hostname: hostname::get()
                .map(|h| h.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "localhost".to_string()),
        }
    }

    fn is_local(&self, system: &ExecutionSystem) -> bool {
        system.hostname == "localhost"
            || system.hostname == "127.0.0.1"
            || system.hostname == self.local_hostname
    }
}

impl Default for ProcessCommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandExecutor for ProcessCommandExecutor {
    async fn execute(
        &self,
        system: &ExecutionSystem,
        command: &CommandLine,
    ) -> Result<String, ExecutionError> {
        let payload = prefix_environment(&system.environment, &command.rendered());

        let mut process = if self.is_local(system) {
            // The shell exists only to interpret the payload (environment
            // prefixes, &&); the payload never re-enters argument parsing.
            debug!("Executing local command: {}", payload);
            let mut cmd = tokio::process::Command::new("sh");
            cmd.arg("-c").arg(&payload);
            cmd
        } else {
            // The payload is one opaque argument; ssh itself never sees
            // user-controlled values as separate arguments.
            debug!(
                "Executing remote command on {}: {}",
                system.hostname, payload
            );
            let mut cmd = tokio::process::Command::new("ssh");
            cmd.arg("-o")
                .arg("BatchMode=yes")
                .arg(format!("{}@{}", system.username, system.hostname))
                .arg(&payload);
            cmd
        };

        let mut child = process
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Both pipes are drained incrementally so a runaway job is cut
        // off at the cap instead of being buffered whole first. The
        // first stream to cross the cap aborts the other read and the
        // child itself.
        let captured = tokio::try_join!(
            read_capped(child.stdout.take(), self.max_output_bytes),
            read_capped(child.stderr.take(), self.max_output_bytes),
        );
        let (stdout, stderr) = match captured {
            Ok(streams) => streams,
            Err(err) => {
                let _ = child.kill().await;
                return Err(err);
            }
        };

        let status = child.wait().await?;
        if !status.success() {
            return Err(ExecutionError::CommandFailed {
                status: status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
            });
        }

        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}

/// Drains a child pipe, failing as soon as the accumulated output would
/// exceed `limit`.
async fn read_capped<R>(pipe: Option<R>, limit: usize) -> Result<Vec<u8>, ExecutionError>
where
    R: AsyncRead + Unpin,
{
    let Some(mut pipe) = pipe else {
        return Ok(Vec::new());
    };

    let mut captured = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = pipe.read(&mut chunk).await?;
        if n == 0 {
            return Ok(captured);
        }
        if captured.len() + n > limit {
            return Err(ExecutionError::OutputTooLarge { limit });
        }
        captured.extend_from_slice(&chunk[..n]);
    }
}

/// Prepends `KEY='value'` assignments to the payload.
///
/// Keys are emitted in sorted order so rendered payloads are
/// deterministic; keys that are not valid shell identifiers are dropped.
fn prefix_environment(environment: &std::collections::HashMap<String, String>, payload: &str) -> String {
    if environment.is_empty() {
        return payload.to_string();
    }

    let mut keys: Vec<&String> = environment.keys().collect();
    keys.sort();

    let mut prefix = String::new();
    for key in keys {
        if !is_env_key_safe(key) {
            warn!("Skipping unsafe environment key {:?}", key);
            continue;
        }
        prefix.push_str(key);
        prefix.push('=');
        prefix.push_str(&shell_quote(&environment[key]));
        prefix.push(' ');
    }

    format!("{}{}", prefix, payload)
}

fn is_env_key_safe(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with(|c: char| c.is_ascii_digit())
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
