//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::filter::{FilterError, OutputFilter};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default)]
    pub process: ProcessConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub filter: FilterConfig,
}

impl SupervisorConfig {
    /// Workspace whose `logs/` directory is tailed.
    ///
    /// Uses `log.workspace` when set, otherwise the directory containing the
    /// tunnel script.
    #[must_use]
    pub fn log_workspace(&self) -> Option<PathBuf> {
        self.log
            .workspace
            .clone()
            .or_else(|| crate::watcher::workspace_for_script(&self.process.script_path))
    }
}

/// How the tunnel script is launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    #[serde(default = "default_script_path")]
    pub script_path: PathBuf,
    /// Interpreter the script is run through. `None` executes it directly.
    #[serde(default = "default_interpreter")]
    pub interpreter: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    /// Escalation prefix. Empty to run unprivileged.
    #[serde(default = "default_escalation")]
    pub escalation: Vec<String>,
    /// Non-interactive probe run before launch. Empty to skip.
    #[serde(default = "default_privilege_check")]
    pub privilege_check: Vec<String>,
}

fn default_script_path() -> PathBuf {
    PathBuf::from("/usr/local/bin/pdanet-rwt-bin/pdanet_rwt.sh")
}

#[allow(clippy::unnecessary_wraps)]
fn default_interpreter() -> Option<String> {
    Some("bash".to_string())
}

fn default_escalation() -> Vec<String> {
    vec!["sudo".to_string()]
}

fn default_privilege_check() -> Vec<String> {
    ["sudo", "-n", "true"].into_iter().map(String::from).collect()
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            script_path: default_script_path(),
            interpreter: default_interpreter(),
            args: Vec::new(),
            escalation: default_escalation(),
            privilege_check: default_privilege_check(),
        }
    }
}

/// Shutdown protocol timing, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShutdownConfig {
    #[serde(default = "default_graceful_timeout_ms")]
    pub graceful_timeout_ms: u64,
    #[serde(default = "default_terminate_timeout_ms")]
    pub terminate_timeout_ms: u64,
    /// Outer bound on a stop request, after which cleanup continues detached.
    #[serde(default = "default_cleanup_timeout_ms")]
    pub cleanup_timeout_ms: u64,
    /// Bound on draining output after the child has exited.
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

fn default_graceful_timeout_ms() -> u64 {
    10_000
}

fn default_terminate_timeout_ms() -> u64 {
    3_000
}

fn default_cleanup_timeout_ms() -> u64 {
    15_000
}

fn default_drain_timeout_ms() -> u64 {
    2_000
}

impl ShutdownConfig {
    #[must_use]
    pub fn graceful_timeout(&self) -> Duration {
        Duration::from_millis(self.graceful_timeout_ms)
    }

    #[must_use]
    pub fn terminate_timeout(&self) -> Duration {
        Duration::from_millis(self.terminate_timeout_ms)
    }

    #[must_use]
    pub fn cleanup_timeout(&self) -> Duration {
        Duration::from_millis(self.cleanup_timeout_ms)
    }

    #[must_use]
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            graceful_timeout_ms: default_graceful_timeout_ms(),
            terminate_timeout_ms: default_terminate_timeout_ms(),
            cleanup_timeout_ms: default_cleanup_timeout_ms(),
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

/// Log tailing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Log files are named `<prefix>_*.log`.
    #[serde(default = "default_log_prefix")]
    pub prefix: String,
    /// Overrides the workspace derived from the script location.
    #[serde(default)]
    pub workspace: Option<PathBuf>,
    #[serde(default = "default_start_delay_ms")]
    pub start_delay_ms: u64,
    #[serde(default = "default_discovery_interval_ms")]
    pub discovery_interval_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_log_prefix() -> String {
    "pdanet".to_string()
}

fn default_start_delay_ms() -> u64 {
    2_000
}

fn default_discovery_interval_ms() -> u64 {
    2_000
}

fn default_poll_interval_ms() -> u64 {
    100
}

impl LogConfig {
    #[must_use]
    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }

    #[must_use]
    pub fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_interval_ms)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix: default_log_prefix(),
            workspace: None,
            start_delay_ms: default_start_delay_ms(),
            discovery_interval_ms: default_discovery_interval_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Noise suppression rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Include the built-in tunnel noise rules.
    #[serde(default = "default_true")]
    pub default_rules: bool,
    /// Extra case-insensitive regex patterns.
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl FilterConfig {
    /// Compile the configured rules.
    ///
    /// # Errors
    ///
    /// Returns `FilterError::InvalidPattern` if a pattern does not compile.
    pub fn build_filter(&self) -> Result<OutputFilter, FilterError> {
        OutputFilter::from_patterns(self.default_rules, &self.patterns)
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            default_rules: true,
            patterns: Vec::new(),
        }
    }
}
