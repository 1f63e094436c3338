//! Tunnel process launching.
//!
//! Builds the escalated command line, runs the non-interactive privilege
//! probe and spawns the child in a fresh process group with stdout and
//! stderr merged into a single pipe.

use std::os::fd::OwnedFd;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::net::unix::pipe;
use tokio::process::{Child, Command};

use crate::config::ProcessConfig;

/// Error type for launch-time failures.
#[derive(thiserror::Error, Debug)]
pub enum LaunchError {
    /// The tunnel script does not exist.
    #[error("Tunnel script not found: {0}")]
    ScriptNotFound(PathBuf),
    /// The privilege probe ran but escalation would need interaction.
    #[error("Privilege escalation is not available non-interactively (probe exit code {code:?}); configure passwordless sudo or run as root")]
    PrivilegeDenied { code: Option<i32> },
    /// The privilege probe itself could not be run.
    #[error("Unable to run privilege check `{command}`: {source}")]
    PrivilegeCheck {
        command: String,
        source: std::io::Error,
    },
    /// The launcher binary was not found.
    #[error("Launcher not found: {0}")]
    NotFound(String),
    /// Permission denied when spawning.
    #[error("Permission denied")]
    PermissionDenied,
    /// Nothing to execute.
    #[error("Launch command is empty")]
    EmptyCommand,
    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LaunchError {
    /// Create a `LaunchError` from a spawn I/O error, classifying common cases.
    fn from_spawn(program: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(program.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            _ => Self::Io(err),
        }
    }
}

/// Builder for the tunnel command line.
#[derive(Debug, Clone, Default)]
pub struct LaunchCommand {
    script: PathBuf,
    args: Vec<String>,
    interpreter: Option<String>,
    escalation: Vec<String>,
    privilege_check: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl LaunchCommand {
    /// Create a command that runs `script` directly, without escalation.
    #[must_use]
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
            ..Default::default()
        }
    }

    /// Create a command from the `[process]` configuration section.
    #[must_use]
    pub fn from_config(config: &ProcessConfig) -> Self {
        Self {
            script: config.script_path.clone(),
            args: config.args.clone(),
            interpreter: config.interpreter.clone(),
            escalation: config.escalation.clone(),
            privilege_check: config.privilege_check.clone(),
            working_dir: None,
        }
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Run the script through an interpreter such as `bash`.
    #[must_use]
    pub fn interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = Some(interpreter.into());
        self
    }

    /// Prefix the command with an escalation command such as `sudo`.
    #[must_use]
    pub fn escalation(mut self, command: &[&str]) -> Self {
        self.escalation = command.iter().map(|s| (*s).to_string()).collect();
        self
    }

    /// Command that probes whether escalation can proceed non-interactively.
    #[must_use]
    pub fn privilege_check(mut self, command: &[&str]) -> Self {
        self.privilege_check = command.iter().map(|s| (*s).to_string()).collect();
        self
    }

    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn script(&self) -> &Path {
        &self.script
    }

    /// Build the full argument vector, program first.
    #[must_use]
    pub fn build_argv(&self) -> Vec<String> {
        let mut argv = self.escalation.clone();
        if let Some(interpreter) = &self.interpreter {
            argv.push(interpreter.clone());
        }
        argv.push(self.script.to_string_lossy().into_owned());
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// Ensure the script exists.
    ///
    /// # Errors
    ///
    /// Returns `LaunchError::ScriptNotFound` if it does not.
    pub fn validate_script(&self) -> Result<(), LaunchError> {
        if self.script.exists() {
            Ok(())
        } else {
            Err(LaunchError::ScriptNotFound(self.script.clone()))
        }
    }

    /// Run the privilege probe. An empty probe always passes.
    ///
    /// # Errors
    ///
    /// Returns `LaunchError::PrivilegeDenied` if the probe exits non-zero and
    /// `LaunchError::PrivilegeCheck` if it cannot be run at all.
    pub async fn check_privileges(&self) -> Result<(), LaunchError> {
        let Some((program, args)) = self.privilege_check.split_first() else {
            return Ok(());
        };

        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|source| LaunchError::PrivilegeCheck {
                command: self.privilege_check.join(" "),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            tracing::debug!(code = ?status.code(), "Privilege probe refused");
            Err(LaunchError::PrivilegeDenied {
                code: status.code(),
            })
        }
    }

    /// Spawn the command as leader of a new process group.
    ///
    /// Stdout and stderr share one pipe so lines keep the order the child
    /// wrote them in. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `LaunchError` if the pipe cannot be created or the process
    /// fails to spawn.
    pub fn spawn(&self) -> Result<LaunchedChild, LaunchError> {
        let argv = self.build_argv();
        let (program, rest) = argv.split_first().ok_or(LaunchError::EmptyCommand)?;

        let (reader, writer) = std::io::pipe()?;

        let mut child = {
            let mut cmd = Command::new(program);
            cmd.args(rest)
                .stdin(Stdio::null())
                .stdout(writer.try_clone()?)
                .stderr(writer)
                .process_group(0);

            if let Some(ref dir) = self.working_dir {
                cmd.current_dir(dir);
            }

            // The command holds the parent's copies of the write end; it is
            // dropped at the end of this block so EOF follows child exit.
            cmd.spawn().map_err(|e| LaunchError::from_spawn(program, e))?
        };

        let attached = child
            .id()
            .ok_or_else(|| std::io::Error::other("child exited before pid was read"))
            .and_then(|pid| {
                let pgid = i32::try_from(pid).map_err(|_| {
                    std::io::Error::new(std::io::ErrorKind::InvalidData, "pid out of range")
                })?;
                let output = pipe::Receiver::from_owned_fd(OwnedFd::from(reader))?;
                Ok((pid, pgid, output))
            });
        let (pid, pgid, output) = match attached {
            Ok(parts) => parts,
            Err(e) => {
                // Leave nothing running behind a failed launch
                let _ = child.start_kill();
                return Err(LaunchError::Io(e));
            }
        };

        tracing::info!(pid, program = %program, script = %self.script.display(), "Spawned tunnel process");

        Ok(LaunchedChild {
            child,
            pid,
            pgid,
            output,
        })
    }
}

/// A freshly spawned child and the read end of its merged output pipe.
#[derive(Debug)]
pub struct LaunchedChild {
    pub child: Child,
    pub pid: u32,
    /// Process group id; equal to `pid` since the child leads its group.
    pub pgid: i32,
    pub output: pipe::Receiver,
}
