use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{AzdoError, Result};

/// Environment variables layered over the inherited environment for one invocation.
pub type EnvOverrides = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs one `az` invocation and captures its output.
///
/// `args` never include the program itself; implementations prepend whatever command
/// line they were configured with.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, args: &[String], env: &EnvOverrides) -> Result<CommandOutput>;
}

/// Production runner backed by the Azure CLI.
#[derive(Debug, Clone)]
pub struct AzCli {
    label: String,
    program: PathBuf,
    base_args: Vec<String>,
    timeout: Duration,
}

impl AzCli {
    pub fn new(command: Vec<String>, timeout: Duration) -> Result<Self> {
        let mut parts = command.into_iter();
        let label = parts
            .next()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| AzdoError::InvalidArgument("az command is empty".to_string()))?;
        // `az` is a .cmd shim on Windows, which Command::new does not resolve on its own.
        let program = which::which(&label).unwrap_or_else(|_| PathBuf::from(&label));
        Ok(Self {
            label,
            program,
            base_args: parts.collect(),
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn describe(&self, args: &[String]) -> String {
        std::iter::once(self.label.as_str())
            .chain(self.base_args.iter().map(String::as_str))
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl CommandRunner for AzCli {
    async fn run(&self, args: &[String], env: &EnvOverrides) -> Result<CommandOutput> {
        let command_line = self.describe(args);
        debug!(
            command = %command_line,
            env = ?env.keys().collect::<Vec<_>>(),
            "running external command"
        );

        let mut command = Command::new(&self.program);
        command
            .args(&self.base_args)
            .args(args)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(|source| AzdoError::Launch {
            program: self.label.clone(),
            source,
        })?;
        let mut group = ProcessGroupGuard::new(child.id());

        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| AzdoError::Launch {
                program: self.label.clone(),
                source,
            })?,
            Err(_) => {
                warn!(command = %command_line, timeout = ?self.timeout, "external command timed out");
                return Err(AzdoError::Timeout {
                    command: command_line,
                    timeout: self.timeout,
                });
            }
        };
        group.disarm();

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() {
            warn!(command = %command_line, code = ?output.status.code(), "external command failed");
            return Err(AzdoError::CommandFailed {
                command: command_line,
                code: output.status.code(),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(CommandOutput { stdout, stderr })
    }
}

/// Kills the child's whole process group unless disarmed after a normal exit.
///
/// Covers both the timeout path and the caller dropping the invocation future, so a
/// wrapper script cannot leave its interpreter running.
struct ProcessGroupGuard {
    pid: Option<u32>,
}

impl ProcessGroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self { pid }
    }

    fn disarm(&mut self) {
        self.pid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        let Some(pid) = self.pid.take() else {
            return;
        };
        #[cfg(unix)]
        {
            if let Ok(pgid) = libc::pid_t::try_from(pid) {
                // SAFETY: killpg only sends a signal; the group was created for this child.
                unsafe {
                    libc::killpg(pgid, libc::SIGKILL);
                }
            }
        }
        #[cfg(not(unix))]
        let _ = pid;
    }
}
