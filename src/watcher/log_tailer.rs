//! Discovery and following of the tunnel's log file.
//!
//! The tailer runs as its own task: it waits for a log file to appear under
//! the workspace, attaches at end-of-file, and forwards newly appended lines
//! through the shared filter. Losing the file sends it back to discovery.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::LogConfig;
use crate::events::{Diagnostic, EventSink, LineSource, OutputLine, Status, StatusEvent};
use crate::filter::OutputFilter;

use super::cursor::LogCursor;
use super::discovery::find_latest_log;
use super::error::WatcherError;

/// Timing knobs for the tailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailerOptions {
    /// Delay before the first discovery attempt.
    pub start_delay: Duration,
    /// Wait between discovery attempts.
    pub discovery_interval: Duration,
    /// Wait between reads when no new content is available.
    pub poll_interval: Duration,
}

impl Default for TailerOptions {
    fn default() -> Self {
        Self {
            start_delay: Duration::from_secs(2),
            discovery_interval: Duration::from_secs(2),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl From<&LogConfig> for TailerOptions {
    fn from(config: &LogConfig) -> Self {
        Self {
            start_delay: config.start_delay(),
            discovery_interval: config.discovery_interval(),
            poll_interval: config.poll_interval(),
        }
    }
}

/// Follows the newest `<workspace>/logs/<prefix>_*.log`.
pub struct LogTailer {
    workspace: PathBuf,
    prefix: String,
    filter: Arc<OutputFilter>,
    sink: Arc<dyn EventSink>,
    options: TailerOptions,
}

impl LogTailer {
    #[must_use]
    pub fn new(
        workspace: impl Into<PathBuf>,
        prefix: impl Into<String>,
        filter: Arc<OutputFilter>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            workspace: workspace.into(),
            prefix: prefix.into(),
            filter,
            sink,
            options: TailerOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: TailerOptions) -> Self {
        self.options = options;
        self
    }

    /// Run the tailer on a background task.
    #[must_use]
    pub fn spawn(self) -> TailerHandle {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.run(cancel.clone()));
        TailerHandle { cancel, task }
    }

    /// Discover, attach and follow until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::debug!(
            workspace = %self.workspace.display(),
            prefix = %self.prefix,
            "Log tailer started"
        );

        if !pause(self.options.start_delay, &cancel).await {
            return;
        }

        while let Some(mut cursor) = self.discover(&cancel).await {
            let path = cursor.path().to_path_buf();
            tracing::info!(path = %path.display(), "Following log file");
            self.sink
                .emit(StatusEvent::new(Status::LogAttached(path.clone())).into());

            match self.follow(&mut cursor, &cancel).await {
                Ok(()) => break,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Lost log file");
                    self.sink.emit(
                        Diagnostic::error(LineSource::LogFile, format!("Log monitor error: {e}"))
                            .into(),
                    );
                    self.sink
                        .emit(StatusEvent::new(Status::LogDetached(path)).into());
                    if !pause(self.options.discovery_interval, &cancel).await {
                        break;
                    }
                }
            }
        }

        tracing::debug!("Log tailer stopped");
    }

    /// Poll for a log file until one can be attached. `None` when cancelled.
    async fn discover(&self, cancel: &CancellationToken) -> Option<LogCursor> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }

            match find_latest_log(&self.workspace, &self.prefix) {
                Some(path) => match LogCursor::attach(path).await {
                    Ok(cursor) => return Some(cursor),
                    Err(e) => {
                        tracing::debug!(error = %e, "Failed to attach to log file");
                        self.sink.emit(
                            Diagnostic::error(
                                LineSource::LogFile,
                                format!("Log monitor error: {e}"),
                            )
                            .into(),
                        );
                    }
                },
                None => tracing::trace!(workspace = %self.workspace.display(), "No log file yet"),
            }

            if !pause(self.options.discovery_interval, cancel).await {
                return None;
            }
        }
    }

    /// Forward appended lines. `Ok(())` means cancelled.
    async fn follow(
        &self,
        cursor: &mut LogCursor,
        cancel: &CancellationToken,
    ) -> Result<(), WatcherError> {
        loop {
            let lines = tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                result = cursor.read_new_lines() => result?,
            };

            if lines.is_empty() {
                if !pause(self.options.poll_interval, cancel).await {
                    return Ok(());
                }
                continue;
            }

            for line in lines {
                if self.filter.is_noise(&line) {
                    tracing::trace!(line = %line, "Suppressed log line");
                } else {
                    self.sink
                        .emit(OutputLine::new(line, LineSource::LogFile).into());
                }
            }
        }
    }
}

/// Sleep for `duration` unless cancelled first. Returns false if cancelled.
async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(duration) => true,
    }
}

/// Handle on a spawned [`LogTailer`].
#[derive(Debug)]
pub struct TailerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl TailerHandle {
    /// Ask the tailer to stop at its next check point. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop and wait up to `limit` for the task to end.
    ///
    /// Returns false if the task was still running when the limit elapsed.
    pub async fn shutdown(self, limit: Duration) -> bool {
        self.stop();
        match tokio::time::timeout(limit, self.task).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Log tailer task failed");
                true
            }
            Err(_) => false,
        }
    }
}
