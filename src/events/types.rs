//! Event types emitted by the supervisor core.
//!
//! Every event carries the instant it was generated, so consumers never
//! need to consult a wall clock at display time.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::supervisor::{ProcessState, ShutdownStage};

/// Where an output line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineSource {
    /// The child's merged stdout/stderr pipe.
    ProcessStream,
    /// The log file the child writes into its workspace.
    LogFile,
}

/// A single line of signal (non-noise) output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLine {
    /// Line text with trailing whitespace removed.
    pub text: String,
    /// Origin of the line.
    pub source: LineSource,
    /// When the line was read.
    pub timestamp: DateTime<Utc>,
}

impl OutputLine {
    /// Create a line stamped with the current time.
    #[must_use]
    pub fn new(text: impl Into<String>, source: LineSource) -> Self {
        Self {
            text: text.into(),
            source,
            timestamp: Utc::now(),
        }
    }
}

/// The thing whose status changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Status {
    /// Child process lifecycle change.
    Process(ProcessState),
    /// Shutdown coordinator stage change.
    Shutdown(ShutdownStage),
    /// The log tailer attached to a file.
    LogAttached(PathBuf),
    /// The log tailer lost its file and went back to discovery.
    LogDetached(PathBuf),
}

/// A status change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub status: Status,
    pub timestamp: DateTime<Utc>,
}

impl StatusEvent {
    #[must_use]
    pub fn new(status: Status) -> Self {
        Self {
            status,
            timestamp: Utc::now(),
        }
    }

    /// Human readable description of the change.
    #[must_use]
    pub fn describe(&self) -> String {
        match &self.status {
            Status::Process(state) => state.describe().to_string(),
            Status::Shutdown(stage) => stage.describe().to_string(),
            Status::LogAttached(path) => format!(
                "Started logging: {} (filtered)",
                path.file_name()
                    .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
            ),
            Status::LogDetached(path) => format!("Lost log file {}", path.display()),
        }
    }
}

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticLevel {
    /// A transient runtime error; the component keeps going.
    Error,
    /// A non-fatal condition the operator should know about.
    Warning,
}

/// A runtime problem reported by one of the active components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    /// Which activity produced the diagnostic.
    pub origin: LineSource,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Diagnostic {
    #[must_use]
    pub fn error(origin: LineSource, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            origin,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn warning(origin: LineSource, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Warning,
            origin,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Final notification for a supervisor session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminationEvent {
    /// Exit code, verbatim. Signal deaths report `128 + signal`.
    pub exit_code: i32,
    /// Terminating signal, if the child was killed by one.
    pub signal: Option<i32>,
    pub timestamp: DateTime<Utc>,
}

impl TerminationEvent {
    #[must_use]
    pub fn new(exit_code: i32, signal: Option<i32>) -> Self {
        Self {
            exit_code,
            signal,
            timestamp: Utc::now(),
        }
    }

    /// Whether the child reported success.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0 && self.signal.is_none()
    }
}

/// Everything the core reports to its consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SupervisorEvent {
    Output(OutputLine),
    Status(StatusEvent),
    Diagnostic(Diagnostic),
    Terminated(TerminationEvent),
}

impl SupervisorEvent {
    /// When the event was generated.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Output(line) => line.timestamp,
            Self::Status(status) => status.timestamp,
            Self::Diagnostic(diag) => diag.timestamp,
            Self::Terminated(term) => term.timestamp,
        }
    }

    /// Returns the output line if this is an `Output` event.
    #[must_use]
    pub fn as_output(&self) -> Option<&OutputLine> {
        match self {
            Self::Output(line) => Some(line),
            _ => None,
        }
    }

    /// Returns true if this is the final event of a session.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated(_))
    }
}

impl From<OutputLine> for SupervisorEvent {
    fn from(line: OutputLine) -> Self {
        Self::Output(line)
    }
}

impl From<StatusEvent> for SupervisorEvent {
    fn from(status: StatusEvent) -> Self {
        Self::Status(status)
    }
}

impl From<Diagnostic> for SupervisorEvent {
    fn from(diag: Diagnostic) -> Self {
        Self::Diagnostic(diag)
    }
}

impl From<TerminationEvent> for SupervisorEvent {
    fn from(term: TerminationEvent) -> Self {
        Self::Terminated(term)
    }
}
