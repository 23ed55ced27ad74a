//! Command executor port.
//!
//! The git driver runs every process through an [`Executor`]. Only `git` and
//! `rm` may be executed.

use std::{
    borrow::Cow,
    path::{Path, PathBuf},
    process::Stdio,
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
#[allow(unused_imports)]
use tracing::{debug, error, info, warn};

use crate::{
    scm::redact,
    scripting::{command_line, Script},
};

pub const ALLOWED_COMMANDS: [&str; 2] = ["git", "rm"];

#[derive(thiserror::Error, Debug)]
pub enum ExecError {
    #[error("unsupported command {0:?}: only git and rm can be executed")]
    UnsupportedCommand(String),

    #[error("unable to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {output}")]
    Failed {
        command: String,
        status: String,
        output: String,
    },

    #[error("`{command}` did not finish within {timeout:?}")]
    TimedOut { command: String, timeout: Duration },
}

impl ExecError {
    /// Output captured from the failed process, if it ran at all.
    pub fn output(&self) -> Option<&str> {
        match self {
            ExecError::Failed { output, .. } => Some(output),
            _ => None,
        }
    }
}

#[async_trait]
pub trait Executor: Send + Sync {
    /// Runs `command` with `args` inside `base_dir` and returns its combined output.
    async fn execute(&self, base_dir: &Path, command: &str, args: &[&str])
        -> Result<Vec<u8>, ExecError>;
}

fn check_command(command: &str) -> Result<(), ExecError> {
    if ALLOWED_COMMANDS.contains(&command) {
        Ok(())
    } else {
        Err(ExecError::UnsupportedCommand(command.to_string()))
    }
}

/// The quoted command line, with credentials removed from URL arguments.
fn render(command: &str, args: &[&str]) -> String {
    let mut tokens = vec![Cow::Borrowed(command)];
    tokens.extend(args.iter().map(|arg| redact(arg)));
    command_line(&tokens)
}

/// Spawns real processes.
#[derive(Clone, Debug, Default)]
pub struct CommandExecutor {
    timeout: Option<Duration>,
}

impl CommandExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kills any command that runs for longer than `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

#[async_trait]
impl Executor for CommandExecutor {
    async fn execute(
        &self,
        base_dir: &Path,
        command: &str,
        args: &[&str],
    ) -> Result<Vec<u8>, ExecError> {
        check_command(command)?;
        let rendered = render(command, args);
        debug!(dir = %base_dir.display(), command = %rendered, "executing");

        let mut process = tokio::process::Command::new(command);
        process
            .args(args)
            .current_dir(base_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        let child = process.output();

        let output = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, child).await.map_err(|_| {
                ExecError::TimedOut {
                    command: rendered.clone(),
                    timeout,
                }
            })?,
            None => child.await,
        }
        .map_err(|source| ExecError::Spawn {
            command: rendered.clone(),
            source,
        })?;

        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);

        if !output.status.success() {
            return Err(ExecError::Failed {
                command: rendered,
                status: output.status.to_string(),
                output: String::from_utf8_lossy(&combined).trim().to_string(),
            });
        }
        Ok(combined)
    }
}

/// One invocation seen by a [`RecordingExecutor`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub dir: PathBuf,
    pub command: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// The command line, e.g. `git switch main`. URL credentials are left out.
    pub fn line(&self) -> String {
        let mut tokens = vec![Cow::Borrowed(self.command.as_str())];
        tokens.extend(self.args.iter().map(|arg| redact(arg)));
        tokens.join(" ")
    }
}

#[derive(Clone, Debug)]
enum Reply {
    Output(Vec<u8>),
    Fail(String),
}

/// Records invocations instead of running them and replies with canned results.
///
/// Replies are matched on the command line prefix (`git switch`, `git push origin`);
/// the longest matching prefix wins. Unmatched invocations succeed with no output.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    invocations: Mutex<Vec<Invocation>>,
    replies: Vec<(String, Reply)>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replies with `output` to every command line starting with `prefix`.
    pub fn respond(mut self, prefix: &str, output: impl Into<Vec<u8>>) -> Self {
        self.replies
            .push((prefix.to_string(), Reply::Output(output.into())));
        self
    }

    /// Fails every command line starting with `prefix` with `output`.
    pub fn fail(mut self, prefix: &str, output: &str) -> Self {
        self.replies
            .push((prefix.to_string(), Reply::Fail(output.to_string())));
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Command lines in invocation order.
    pub fn lines(&self) -> Vec<String> {
        self.invocations().iter().map(Invocation::line).collect()
    }

    /// Renders the recorded invocations as a shell script.
    pub fn script(&self) -> Script {
        self.invocations()
            .into_iter()
            .map(|invocation| {
                let mut tokens = vec![invocation.command];
                tokens.extend(invocation.args.iter().map(|arg| redact(arg).into_owned()));
                Script::in_dir(&invocation.dir.to_string_lossy(), &tokens)
            })
            .sum()
    }
}

#[async_trait]
impl Executor for RecordingExecutor {
    async fn execute(
        &self,
        base_dir: &Path,
        command: &str,
        args: &[&str],
    ) -> Result<Vec<u8>, ExecError> {
        check_command(command)?;
        let invocation = Invocation {
            dir: base_dir.to_path_buf(),
            command: command.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
        };
        let line = invocation.line();
        self.invocations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(invocation);

        let reply = self
            .replies
            .iter()
            .filter(|(prefix, _)| line.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, reply)| reply);

        match reply {
            None => Ok(Vec::new()),
            Some(Reply::Output(output)) => Ok(output.clone()),
            Some(Reply::Fail(output)) => Err(ExecError::Failed {
                command: render(command, args),
                status: "exit status: 1".to_string(),
                output: output.clone(),
            }),
        }
    }
}
