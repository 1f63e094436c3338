//! Lifecycle and shutdown state enums.

use serde::{Deserialize, Serialize};

/// Lifecycle of the supervised child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl ProcessState {
    #[must_use]
    pub fn describe(self) -> &'static str {
        match self {
            Self::Running => "Tunnel enabled.",
            Self::Stopping => "Stopping tunnel...",
            Self::Stopped => "Tunnel stopped.",
            Self::Failed => "Tunnel failed.",
        }
    }
}

/// Stage of the escalating shutdown protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownStage {
    #[default]
    Idle,
    SignalingInterrupt,
    WaitingGraceful,
    SignalingTerm,
    WaitingTerm,
    SignalingKill,
    Terminated,
}

impl ShutdownStage {
    /// Whether no further transitions can happen.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated)
    }

    #[must_use]
    pub fn describe(self) -> &'static str {
        match self {
            Self::Idle => "Shutdown idle",
            Self::SignalingInterrupt => "Sending SIGINT (Ctrl+C) to tunnel process group...",
            Self::WaitingGraceful => "Waiting for clean shutdown...",
            Self::SignalingTerm => "Clean shutdown timeout, forcing termination...",
            Self::WaitingTerm => "Waiting for termination...",
            Self::SignalingKill => "Force killing process group...",
            Self::Terminated => "Process group terminated",
        }
    }
}
