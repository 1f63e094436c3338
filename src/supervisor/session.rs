//! Supervisor sessions.
//!
//! A session owns exactly one child process. Three activities run per
//! session: the output reader, the session task waiting for exit or a stop
//! request, and (started separately by the consumer) the log tailer. They
//! communicate only by emitting into the shared [`EventSink`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ShutdownConfig;
use crate::events::{
    Diagnostic, EventSink, LineSource, Status, StatusEvent, SupervisorEvent, TerminationEvent,
};
use crate::filter::OutputFilter;
use crate::process::{forward_output, ChildGroup, LaunchCommand, LaunchError, OutputStats};
use crate::supervisor::{ProcessState, ShutdownCoordinator, ShutdownOutcome, ShutdownTimeouts};

/// Default bound on draining the output pipe once the child has exited.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Default outer bound on the whole stop sequence.
pub const DEFAULT_CLEANUP_TIMEOUT: Duration = Duration::from_secs(15);

/// Error type for supervisor sessions.
#[derive(thiserror::Error, Debug)]
pub enum SupervisorError {
    /// The session task ended without reporting termination.
    #[error("Supervisor session ended without reporting termination")]
    SessionLost,
}

/// Timing knobs for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub timeouts: ShutdownTimeouts,
    pub drain_timeout: Duration,
    pub cleanup_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            timeouts: ShutdownTimeouts::default(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            cleanup_timeout: DEFAULT_CLEANUP_TIMEOUT,
        }
    }
}

impl From<&ShutdownConfig> for SessionOptions {
    fn from(config: &ShutdownConfig) -> Self {
        Self {
            timeouts: ShutdownTimeouts {
                graceful: config.graceful_timeout(),
                terminate: config.terminate_timeout(),
            },
            drain_timeout: config.drain_timeout(),
            cleanup_timeout: config.cleanup_timeout(),
        }
    }
}

/// Outcome of [`SessionHandle::shutdown`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReport {
    /// The child is gone and its output fully forwarded.
    Completed(TerminationEvent),
    /// The cleanup bound elapsed; the session is still finishing in the
    /// background and will report termination through the sink.
    Pending,
}

/// Launches supervised tunnel sessions.
pub struct Supervisor {
    filter: Arc<OutputFilter>,
    sink: Arc<dyn EventSink>,
    options: SessionOptions,
}

impl Supervisor {
    #[must_use]
    pub fn new(filter: Arc<OutputFilter>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            filter,
            sink,
            options: SessionOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Launch a new session.
    ///
    /// Nothing is spawned and no event is emitted unless the script exists
    /// and the privilege probe passes.
    ///
    /// # Errors
    ///
    /// Returns `LaunchError` if validation, the privilege probe or the spawn
    /// fails.
    pub async fn start(&self, command: &LaunchCommand) -> Result<SessionHandle, LaunchError> {
        command.validate_script()?;
        command.check_privileges().await?;
        let launched = command.spawn()?;

        self.sink.emit(StatusEvent::new(Status::Process(ProcessState::Running)).into());

        let reader = tokio::spawn(forward_output(
            launched.output,
            Arc::clone(&self.filter),
            Arc::clone(&self.sink),
        ));

        let stop = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(None);
        let session = SessionTask {
            group: ChildGroup::new(launched.child, launched.pgid),
            reader,
            stop: stop.clone(),
            coordinator: ShutdownCoordinator::new(self.options.timeouts, Arc::clone(&self.sink)),
            sink: Arc::clone(&self.sink),
            drain_timeout: self.options.drain_timeout,
            done: done_tx,
        };
        tokio::spawn(session.run());

        Ok(SessionHandle {
            pid: launched.pid,
            pgid: launched.pgid,
            stop,
            done: done_rx,
            sink: Arc::clone(&self.sink),
            cleanup_timeout: self.options.cleanup_timeout,
        })
    }
}

/// Caller's handle on a running session.
///
/// Dropping the handle does not stop the child; call [`SessionHandle::stop`]
/// or [`SessionHandle::shutdown`] first.
#[derive(Debug)]
pub struct SessionHandle {
    pid: u32,
    pgid: i32,
    stop: CancellationToken,
    done: watch::Receiver<Option<TerminationEvent>>,
    sink: Arc<dyn EventSink>,
    cleanup_timeout: Duration,
}

impl SessionHandle {
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    #[must_use]
    pub fn pgid(&self) -> i32 {
        self.pgid
    }

    /// Request the shutdown protocol. Returns immediately; repeated calls
    /// are no-ops.
    pub fn stop(&self) {
        if self.stop.is_cancelled() {
            tracing::debug!(pgid = self.pgid, "Stop already requested");
            return;
        }
        tracing::info!(pgid = self.pgid, "Stop requested");
        self.stop.cancel();
    }

    /// Whether termination has been reported.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.done.borrow().is_some()
    }

    /// The termination event, once reported.
    #[must_use]
    pub fn termination(&self) -> Option<TerminationEvent> {
        self.done.borrow().clone()
    }

    /// Wait until the session reports termination. Cancel safe.
    ///
    /// # Errors
    ///
    /// Returns `SupervisorError::SessionLost` if the session task died
    /// without reporting.
    pub async fn wait(&mut self) -> Result<TerminationEvent, SupervisorError> {
        let guard = self
            .done
            .wait_for(Option::is_some)
            .await
            .map_err(|_| SupervisorError::SessionLost)?;
        (*guard).clone().ok_or(SupervisorError::SessionLost)
    }

    /// Stop the session and wait for it, bounded by the cleanup timeout.
    ///
    /// Exceeding the bound is not fatal: a warning is emitted and
    /// `ShutdownReport::Pending` returned while cleanup continues.
    ///
    /// # Errors
    ///
    /// Returns `SupervisorError::SessionLost` if the session task died
    /// without reporting.
    pub async fn shutdown(&mut self) -> Result<ShutdownReport, SupervisorError> {
        self.stop();
        let limit = self.cleanup_timeout;
        let result = tokio::time::timeout(limit, self.wait()).await;
        match result {
            Ok(result) => result.map(ShutdownReport::Completed),
            Err(_) => {
                tracing::warn!(pgid = self.pgid, ?limit, "Cleanup bound exceeded");
                self.sink.emit(
                    Diagnostic::warning(
                        LineSource::ProcessStream,
                        "Tunnel did not stop cleanly within the cleanup timeout; cleanup continues in the background",
                    )
                    .into(),
                );
                Ok(ShutdownReport::Pending)
            }
        }
    }
}

/// State owned by the background session task.
struct SessionTask {
    group: ChildGroup,
    reader: JoinHandle<OutputStats>,
    stop: CancellationToken,
    coordinator: ShutdownCoordinator,
    sink: Arc<dyn EventSink>,
    drain_timeout: Duration,
    done: watch::Sender<Option<TerminationEvent>>,
}

impl SessionTask {
    async fn run(mut self) {
        let pgid = self.group.pgid();

        let exit = tokio::select! {
            result = self.group.wait() => {
                let exit = match result {
                    Ok(exit) => Some(exit),
                    Err(e) => {
                        tracing::warn!(pgid, error = %e, "Failed waiting for tunnel process");
                        self.sink.emit(
                            Diagnostic::error(
                                LineSource::ProcessStream,
                                format!("Unable to observe tunnel exit: {e}"),
                            )
                            .into(),
                        );
                        None
                    }
                };
                tracing::info!(pgid, ?exit, "Tunnel process exited");
                self.coordinator.observe_exit(exit);
                exit
            }
            () = self.stop.cancelled() => {
                self.sink.emit(StatusEvent::new(Status::Process(ProcessState::Stopping)).into());
                match self.coordinator.run(&mut self.group).await {
                    ShutdownOutcome::Terminated { exit, strongest } => {
                        tracing::info!(pgid, ?exit, signal = strongest.name(), "Tunnel process stopped");
                        exit
                    }
                    ShutdownOutcome::AlreadyRequested => None,
                }
            }
        };

        self.drain_output().await;

        let (state, event) = match exit {
            Some(exit) => (ProcessState::Stopped, exit.to_event()),
            None => (ProcessState::Failed, TerminationEvent::new(1, None)),
        };
        self.sink.emit(StatusEvent::new(Status::Process(state)).into());
        self.sink.emit(SupervisorEvent::Terminated(event.clone()));
        self.done.send_replace(Some(event));
    }

    /// Wait for the reader to forward everything already written.
    ///
    /// Detached descendants can keep the pipe open past the leader's exit,
    /// so the wait is bounded.
    async fn drain_output(&mut self) {
        match tokio::time::timeout(self.drain_timeout, &mut self.reader).await {
            Ok(Ok(stats)) => {
                tracing::debug!(
                    forwarded = stats.forwarded,
                    suppressed = stats.suppressed,
                    "Output drained"
                );
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Output reader task failed");
            }
            Err(_) => {
                tracing::warn!(limit = ?self.drain_timeout, "Output pipe still open after exit");
                self.sink.emit(
                    Diagnostic::warning(
                        LineSource::ProcessStream,
                        "Output stream still open after exit; a detached process may be holding it",
                    )
                    .into(),
                );
                self.reader.abort();
            }
        }
    }
}
