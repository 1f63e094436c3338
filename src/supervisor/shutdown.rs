//! Escalating shutdown of the child's process group.
//!
//! The coordinator walks `Idle -> SignalingInterrupt -> WaitingGraceful ->
//! SignalingTerm -> WaitingTerm -> SignalingKill -> Terminated`, one stage per
//! [`ShutdownCoordinator::step`]. An observed exit jumps straight to
//! `Terminated`. A stronger signal is only sent after the weaker signal's
//! wait window has elapsed.

use std::sync::Arc;
use std::time::Duration;

use crate::events::{Diagnostic, EventSink, LineSource, Status, StatusEvent};
use crate::process::{GroupSignal, ProcessExit, ProcessGroup, SignalError};
use crate::supervisor::ShutdownStage;

/// Default wait after SIGINT before escalating.
pub const DEFAULT_GRACEFUL_TIMEOUT: Duration = Duration::from_secs(10);

/// Default wait after SIGTERM before escalating.
pub const DEFAULT_TERMINATE_TIMEOUT: Duration = Duration::from_secs(3);

/// Wait windows for the two bounded stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownTimeouts {
    pub graceful: Duration,
    pub terminate: Duration,
}

impl Default for ShutdownTimeouts {
    fn default() -> Self {
        Self {
            graceful: DEFAULT_GRACEFUL_TIMEOUT,
            terminate: DEFAULT_TERMINATE_TIMEOUT,
        }
    }
}

/// Result of a call to [`ShutdownCoordinator::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Shutdown had already been requested; nothing was done.
    AlreadyRequested,
    /// The group is gone.
    Terminated {
        /// Leader exit status, if it could be observed.
        exit: Option<ProcessExit>,
        /// Strongest signal that was sent.
        strongest: GroupSignal,
    },
}

/// Drives the signal escalation protocol for one session.
pub struct ShutdownCoordinator {
    stage: ShutdownStage,
    timeouts: ShutdownTimeouts,
    sink: Arc<dyn EventSink>,
    history: Vec<ShutdownStage>,
    exit: Option<ProcessExit>,
    strongest: GroupSignal,
}

impl ShutdownCoordinator {
    #[must_use]
    pub fn new(timeouts: ShutdownTimeouts, sink: Arc<dyn EventSink>) -> Self {
        Self {
            stage: ShutdownStage::Idle,
            timeouts,
            sink,
            history: vec![ShutdownStage::Idle],
            exit: None,
            strongest: GroupSignal::Interrupt,
        }
    }

    #[must_use]
    pub fn stage(&self) -> ShutdownStage {
        self.stage
    }

    /// Every stage visited so far, starting with `Idle`.
    #[must_use]
    pub fn history(&self) -> &[ShutdownStage] {
        &self.history
    }

    /// Record a spontaneous exit seen outside the protocol.
    pub fn observe_exit(&mut self, exit: Option<ProcessExit>) {
        if self.stage.is_terminal() {
            return;
        }
        self.exit = exit;
        self.transition(ShutdownStage::Terminated);
    }

    /// Run the protocol to completion.
    ///
    /// Only the first call while `Idle` does anything; later calls return
    /// `ShutdownOutcome::AlreadyRequested`.
    pub async fn run<G>(&mut self, group: &mut G) -> ShutdownOutcome
    where
        G: ProcessGroup + ?Sized,
    {
        if self.stage != ShutdownStage::Idle {
            tracing::debug!(stage = ?self.stage, "Shutdown already requested");
            return ShutdownOutcome::AlreadyRequested;
        }

        self.transition(ShutdownStage::SignalingInterrupt);
        while !self.stage.is_terminal() {
            let next = self.step(group).await;
            self.transition(next);
        }

        ShutdownOutcome::Terminated {
            exit: self.exit,
            strongest: self.strongest,
        }
    }

    /// Perform the work of the current stage and return the next one.
    pub async fn step<G>(&mut self, group: &mut G) -> ShutdownStage
    where
        G: ProcessGroup + ?Sized,
    {
        match self.stage {
            ShutdownStage::Idle => ShutdownStage::SignalingInterrupt,
            ShutdownStage::SignalingInterrupt => {
                self.deliver(group, GroupSignal::Interrupt, ShutdownStage::WaitingGraceful)
                    .await
            }
            ShutdownStage::WaitingGraceful => {
                let limit = self.timeouts.graceful;
                self.wait(group, Some(limit), ShutdownStage::SignalingTerm).await
            }
            ShutdownStage::SignalingTerm => {
                self.deliver(group, GroupSignal::Terminate, ShutdownStage::WaitingTerm)
                    .await
            }
            ShutdownStage::WaitingTerm => {
                let limit = self.timeouts.terminate;
                self.wait(group, Some(limit), ShutdownStage::SignalingKill).await
            }
            ShutdownStage::SignalingKill => {
                // SIGKILL cannot be ignored, so the wait is unbounded.
                let next = self
                    .deliver(group, GroupSignal::Kill, ShutdownStage::Terminated)
                    .await;
                if next == ShutdownStage::Terminated && self.exit.is_none() {
                    self.wait(group, None, ShutdownStage::Terminated).await
                } else {
                    next
                }
            }
            ShutdownStage::Terminated => ShutdownStage::Terminated,
        }
    }

    async fn deliver<G>(
        &mut self,
        group: &mut G,
        signal: GroupSignal,
        next: ShutdownStage,
    ) -> ShutdownStage
    where
        G: ProcessGroup + ?Sized,
    {
        self.strongest = signal;
        match group.signal(signal) {
            Ok(()) => next,
            Err(SignalError::NoSuchProcess) => {
                tracing::debug!(signal = signal.name(), "Process group already exited");
                self.wait(group, None, ShutdownStage::Terminated).await
            }
            Err(e) => {
                tracing::warn!(signal = signal.name(), error = %e, "Failed to signal process group");
                self.sink.emit(
                    Diagnostic::warning(
                        LineSource::ProcessStream,
                        format!("Error stopping process: {e}"),
                    )
                    .into(),
                );
                next
            }
        }
    }

    async fn wait<G>(
        &mut self,
        group: &mut G,
        limit: Option<Duration>,
        on_timeout: ShutdownStage,
    ) -> ShutdownStage
    where
        G: ProcessGroup + ?Sized,
    {
        match group.wait_for_exit(limit).await {
            Ok(Some(exit)) => {
                self.exit = Some(exit);
                ShutdownStage::Terminated
            }
            Ok(None) => {
                tracing::info!(?limit, stage = ?self.stage, "Shutdown wait window elapsed");
                on_timeout
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed waiting for process exit");
                self.sink.emit(
                    Diagnostic::error(
                        LineSource::ProcessStream,
                        format!("Unable to observe process exit: {e}"),
                    )
                    .into(),
                );
                ShutdownStage::Terminated
            }
        }
    }

    fn transition(&mut self, next: ShutdownStage) {
        if next == self.stage {
            return;
        }
        tracing::debug!(from = ?self.stage, to = ?next, "Shutdown transition");
        self.stage = next;
        self.history.push(next);
        self.sink.emit(StatusEvent::new(Status::Shutdown(next)).into());
    }
}
