//! Process-group signaling and exit observation.

use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::time::Duration;

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use tokio::process::Child;

use crate::events::TerminationEvent;

/// Signals used by the shutdown protocol, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupSignal {
    Interrupt,
    Terminate,
    Kill,
}

impl GroupSignal {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Kill => "SIGKILL",
        }
    }

    fn as_nix(self) -> Signal {
        match self {
            Self::Interrupt => Signal::SIGINT,
            Self::Terminate => Signal::SIGTERM,
            Self::Kill => Signal::SIGKILL,
        }
    }
}

/// Error type for signal delivery.
#[derive(thiserror::Error, Debug)]
pub enum SignalError {
    /// No process is left in the group; it exited on its own.
    #[error("No such process group")]
    NoSuchProcess,
    /// Delivery failed for another reason (e.g. EPERM).
    #[error("Failed to send {signal}: {source}")]
    Failed {
        signal: &'static str,
        source: std::io::Error,
    },
}

/// How a process exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code; `128 + signal` for signal deaths.
    pub code: i32,
    pub signal: Option<i32>,
}

impl ProcessExit {
    #[must_use]
    pub fn from_status(status: ExitStatus) -> Self {
        match (status.code(), status.signal()) {
            (Some(code), _) => Self { code, signal: None },
            (None, Some(signal)) => Self {
                code: 128 + signal,
                signal: Some(signal),
            },
            (None, None) => Self {
                code: 1,
                signal: None,
            },
        }
    }

    #[must_use]
    pub fn to_event(self) -> TerminationEvent {
        TerminationEvent::new(self.code, self.signal)
    }
}

/// A signalable process group whose leader's exit can be awaited.
///
/// Implemented for the real child; tests drive the shutdown state machine
/// with scripted implementations.
#[async_trait]
pub trait ProcessGroup: Send {
    /// Deliver `signal` to every process in the group.
    ///
    /// # Errors
    ///
    /// Returns `SignalError::NoSuchProcess` if the group is already gone.
    fn signal(&mut self, signal: GroupSignal) -> Result<(), SignalError>;

    /// Wait for the leader to exit, up to `limit` (`None` waits forever).
    ///
    /// Returns `Ok(None)` when the limit elapsed first.
    async fn wait_for_exit(
        &mut self,
        limit: Option<Duration>,
    ) -> std::io::Result<Option<ProcessExit>>;
}

/// The supervised child as a process group.
#[derive(Debug)]
pub struct ChildGroup {
    child: Child,
    pgid: i32,
}

impl ChildGroup {
    #[must_use]
    pub fn new(child: Child, pgid: i32) -> Self {
        Self { child, pgid }
    }

    #[must_use]
    pub fn pgid(&self) -> i32 {
        self.pgid
    }

    /// Wait for the leader to exit. Cancel safe.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting fails.
    pub async fn wait(&mut self) -> std::io::Result<ProcessExit> {
        self.child.wait().await.map(ProcessExit::from_status)
    }
}

#[async_trait]
impl ProcessGroup for ChildGroup {
    fn signal(&mut self, signal: GroupSignal) -> Result<(), SignalError> {
        tracing::debug!(pgid = self.pgid, signal = signal.name(), "Signaling process group");
        killpg(Pid::from_raw(self.pgid), signal.as_nix()).map_err(|errno| {
            if errno == Errno::ESRCH {
                SignalError::NoSuchProcess
            } else {
                SignalError::Failed {
                    signal: signal.name(),
                    source: std::io::Error::from(errno),
                }
            }
        })
    }

    async fn wait_for_exit(
        &mut self,
        limit: Option<Duration>,
    ) -> std::io::Result<Option<ProcessExit>> {
        match limit {
            None => self.wait().await.map(Some),
            Some(limit) => match tokio::time::timeout(limit, self.wait()).await {
                Ok(result) => result.map(Some),
                Err(_) => Ok(None),
            },
        }
    }
}
