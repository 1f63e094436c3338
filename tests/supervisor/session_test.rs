//! End-to-end session tests against real `/bin/sh` children.

use std::sync::Arc;
use std::time::Duration;

use rwt_supervisor::events::{
    event_channel, DiagnosticLevel, LineSource, Status, SupervisorEvent, TerminationEvent,
};
use rwt_supervisor::filter::OutputFilter;
use rwt_supervisor::process::{LaunchCommand, LaunchError};
use rwt_supervisor::supervisor::{
    ProcessState, SessionOptions, ShutdownReport, ShutdownStage, ShutdownTimeouts, Supervisor,
};
use tempfile::TempDir;

use crate::{collect_until, collect_until_terminated, output_texts, write_script};

const EVENT_LIMIT: Duration = Duration::from_secs(10);

fn fast_options() -> SessionOptions {
    SessionOptions {
        timeouts: ShutdownTimeouts {
            graceful: Duration::from_millis(300),
            terminate: Duration::from_millis(300),
        },
        drain_timeout: Duration::from_secs(1),
        cleanup_timeout: Duration::from_secs(5),
    }
}

fn unprivileged(script: &std::path::Path) -> LaunchCommand {
    LaunchCommand::new(script)
        .interpreter("sh")
        .escalation(&[])
        .privilege_check(&[])
}

fn shutdown_stages(events: &[SupervisorEvent]) -> Vec<ShutdownStage> {
    events
        .iter()
        .filter_map(|event| match event {
            SupervisorEvent::Status(status) => match status.status {
                Status::Shutdown(stage) => Some(stage),
                _ => None,
            },
            _ => None,
        })
        .collect()
}

fn process_states(events: &[SupervisorEvent]) -> Vec<ProcessState> {
    events
        .iter()
        .filter_map(|event| match event {
            SupervisorEvent::Status(status) => match status.status {
                Status::Process(state) => Some(state),
                _ => None,
            },
            _ => None,
        })
        .collect()
}

fn termination(events: &[SupervisorEvent]) -> TerminationEvent {
    match events.last() {
        Some(SupervisorEvent::Terminated(term)) => term.clone(),
        other => panic!("Expected termination as last event, got {other:?}"),
    }
}

fn is_ready(event: &SupervisorEvent) -> bool {
    event.as_output().is_some_and(|line| line.text == "ready")
}

#[tokio::test]
async fn echo_then_exit_reports_output_then_termination() {
    let dir = TempDir::new().unwrap();
    let script = write_script(dir.path(), "hello.sh", "echo hello");
    let (sink, mut rx) = event_channel();
    let supervisor =
        Supervisor::new(Arc::new(OutputFilter::with_default_rules()), sink).with_options(fast_options());

    let mut handle = supervisor.start(&unprivileged(&script)).await.unwrap();
    let events = collect_until_terminated(&mut rx, EVENT_LIMIT).await;

    let output: Vec<_> = events.iter().filter_map(SupervisorEvent::as_output).collect();
    assert_eq!(output.len(), 1);
    assert_eq!(output[0].text, "hello");
    assert_eq!(output[0].source, LineSource::ProcessStream);

    let hello_at = events.iter().position(|e| e.as_output().is_some()).unwrap();
    assert!(hello_at < events.len() - 1);

    let term = termination(&events);
    assert_eq!(term.exit_code, 0);
    assert!(term.success());
    assert_eq!(
        process_states(&events),
        vec![ProcessState::Running, ProcessState::Stopped]
    );
    assert!(shutdown_stages(&events).is_empty());

    assert_eq!(handle.wait().await.unwrap(), term);
    assert!(handle.is_finished());
}

#[tokio::test]
async fn exit_code_is_reported_verbatim() {
    let dir = TempDir::new().unwrap();
    let script = write_script(dir.path(), "fail.sh", "echo failing >&2\nexit 42");
    let (sink, mut rx) = event_channel();
    let supervisor = Supervisor::new(Arc::new(OutputFilter::new()), sink);

    let _handle = supervisor.start(&unprivileged(&script)).await.unwrap();
    let events = collect_until_terminated(&mut rx, EVENT_LIMIT).await;

    // stderr shares the pipe with stdout
    assert_eq!(output_texts(&events), vec!["failing"]);
    let term = termination(&events);
    assert_eq!(term.exit_code, 42);
    assert_eq!(term.signal, None);
    assert!(!term.success());
}

#[tokio::test]
async fn noise_is_suppressed_from_process_stream() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        dir.path(),
        "noisy.sh",
        "echo '[I] 0x1a2b io timeout'\necho 'connected to peer 10.0.0.1'\necho '[E] SOCKS5 session handshake failed'",
    );
    let (sink, mut rx) = event_channel();
    let supervisor = Supervisor::new(Arc::new(OutputFilter::with_default_rules()), sink);

    let _handle = supervisor.start(&unprivileged(&script)).await.unwrap();
    let events = collect_until_terminated(&mut rx, EVENT_LIMIT).await;

    assert_eq!(output_texts(&events), vec!["connected to peer 10.0.0.1"]);
}

#[tokio::test]
async fn trailing_partial_line_is_flushed() {
    let dir = TempDir::new().unwrap();
    let script = write_script(dir.path(), "partial.sh", "echo first\nprintf 'no newline'");
    let (sink, mut rx) = event_channel();
    let supervisor = Supervisor::new(Arc::new(OutputFilter::new()), sink);

    let _handle = supervisor.start(&unprivileged(&script)).await.unwrap();
    let events = collect_until_terminated(&mut rx, EVENT_LIMIT).await;

    assert_eq!(output_texts(&events), vec!["first", "no newline"]);
}

#[tokio::test]
async fn interrupt_ignored_exits_on_terminate() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        dir.path(),
        "stubborn.sh",
        "trap '' INT\ntrap 'exit 0' TERM\necho ready\nwhile true; do sleep 0.05; done",
    );
    let (sink, mut rx) = event_channel();
    let supervisor = Supervisor::new(Arc::new(OutputFilter::new()), sink).with_options(fast_options());

    let handle = supervisor.start(&unprivileged(&script)).await.unwrap();
    collect_until(&mut rx, EVENT_LIMIT, is_ready).await;

    handle.stop();
    let events = collect_until_terminated(&mut rx, EVENT_LIMIT).await;

    let stages = shutdown_stages(&events);
    assert_eq!(stages.first(), Some(&ShutdownStage::SignalingInterrupt));
    assert_eq!(stages.last(), Some(&ShutdownStage::Terminated));
    let order = [
        ShutdownStage::SignalingInterrupt,
        ShutdownStage::WaitingGraceful,
        ShutdownStage::SignalingTerm,
        ShutdownStage::Terminated,
    ];
    let mut remaining = order.iter().peekable();
    for stage in &stages {
        if remaining.peek() == Some(&stage) {
            remaining.next();
        }
    }
    assert!(remaining.peek().is_none(), "stages out of order: {stages:?}");
    assert!(!stages.contains(&ShutdownStage::SignalingKill));

    assert_eq!(termination(&events).exit_code, 0);
    assert_eq!(
        process_states(&events),
        vec![ProcessState::Stopping, ProcessState::Stopped]
    );
}

#[tokio::test]
async fn ignoring_interrupt_and_terminate_ends_in_kill() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        dir.path(),
        "immortal.sh",
        "trap '' INT TERM\necho ready\nwhile true; do sleep 0.05; done",
    );
    let options = fast_options();
    let (sink, mut rx) = event_channel();
    let supervisor = Supervisor::new(Arc::new(OutputFilter::new()), sink).with_options(options);

    let handle = supervisor.start(&unprivileged(&script)).await.unwrap();
    collect_until(&mut rx, EVENT_LIMIT, is_ready).await;

    let started = tokio::time::Instant::now();
    handle.stop();
    let events = collect_until_terminated(&mut rx, EVENT_LIMIT).await;
    let elapsed = started.elapsed();

    assert_eq!(
        shutdown_stages(&events),
        vec![
            ShutdownStage::SignalingInterrupt,
            ShutdownStage::WaitingGraceful,
            ShutdownStage::SignalingTerm,
            ShutdownStage::WaitingTerm,
            ShutdownStage::SignalingKill,
            ShutdownStage::Terminated,
        ]
    );
    let term = termination(&events);
    assert_eq!(term.signal, Some(9));
    assert_eq!(term.exit_code, 137);

    let bound = options.timeouts.graceful + options.timeouts.terminate + options.drain_timeout;
    assert!(elapsed < bound + Duration::from_secs(2), "took {elapsed:?}");
}

#[tokio::test]
async fn cleanup_bound_exceeded_reports_pending_and_finishes_later() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        dir.path(),
        "slow.sh",
        "trap '' INT TERM\necho ready\nwhile true; do sleep 0.05; done",
    );
    let options = SessionOptions {
        timeouts: ShutdownTimeouts {
            graceful: Duration::from_millis(600),
            terminate: Duration::from_millis(300),
        },
        drain_timeout: Duration::from_secs(1),
        cleanup_timeout: Duration::from_millis(200),
    };
    let (sink, mut rx) = event_channel();
    let supervisor = Supervisor::new(Arc::new(OutputFilter::new()), sink).with_options(options);

    let mut handle = supervisor.start(&unprivileged(&script)).await.unwrap();
    collect_until(&mut rx, EVENT_LIMIT, is_ready).await;

    let report = handle.shutdown().await.unwrap();
    assert_eq!(report, ShutdownReport::Pending);
    assert!(handle.termination().is_none());

    let term = tokio::time::timeout(EVENT_LIMIT, handle.wait())
        .await
        .expect("Session never finished")
        .unwrap();
    assert_eq!(term.signal, Some(9));
    assert_eq!(term.exit_code, 137);
    assert_eq!(handle.termination(), Some(term.clone()));

    let events = collect_until_terminated(&mut rx, EVENT_LIMIT).await;
    let warning_at = events
        .iter()
        .position(|e| {
            matches!(e, SupervisorEvent::Diagnostic(d)
                if d.level == DiagnosticLevel::Warning && d.message.contains("cleanup timeout"))
        })
        .expect("No cleanup warning emitted");
    let kill_at = shutdown_stages(&events[warning_at..])
        .iter()
        .position(|s| *s == ShutdownStage::SignalingKill);
    assert!(kill_at.is_some(), "kill should follow the warning");
    assert_eq!(termination(&events), term);
}

#[tokio::test]
async fn double_stop_runs_one_sequence() {
    let dir = TempDir::new().unwrap();
    let script = write_script(dir.path(), "sleepy.sh", "echo ready\nexec sleep 30");
    let (sink, mut rx) = event_channel();
    let supervisor = Supervisor::new(Arc::new(OutputFilter::new()), sink).with_options(fast_options());

    let mut handle = supervisor.start(&unprivileged(&script)).await.unwrap();
    collect_until(&mut rx, EVENT_LIMIT, is_ready).await;

    handle.stop();
    handle.stop();
    let report = handle.shutdown().await.unwrap();
    assert!(matches!(report, ShutdownReport::Completed(_)));

    let events = collect_until_terminated(&mut rx, EVENT_LIMIT).await;
    let stages = shutdown_stages(&events);
    let interrupts = stages
        .iter()
        .filter(|s| **s == ShutdownStage::SignalingInterrupt)
        .count();
    assert_eq!(interrupts, 1);
    assert_eq!(
        stages.iter().filter(|s| **s == ShutdownStage::Terminated).count(),
        1
    );

    // SIGINT kills `sleep`
    let term = termination(&events);
    assert_eq!(term.signal, Some(2));
    assert_eq!(term.exit_code, 130);

    // Stopping a finished session is harmless
    handle.stop();
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn missing_script_fails_without_events() {
    let dir = TempDir::new().unwrap();
    let (sink, mut rx) = event_channel();
    let supervisor = Supervisor::new(Arc::new(OutputFilter::new()), sink);

    let result = supervisor
        .start(&unprivileged(&dir.path().join("absent.sh")))
        .await;

    assert!(matches!(result, Err(LaunchError::ScriptNotFound(_))));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn refused_privilege_probe_fails_without_events() {
    let dir = TempDir::new().unwrap();
    let script = write_script(dir.path(), "never.sh", "echo should not run");
    let (sink, mut rx) = event_channel();
    let supervisor = Supervisor::new(Arc::new(OutputFilter::new()), sink);

    let command = LaunchCommand::new(&script)
        .interpreter("sh")
        .privilege_check(&["false"]);
    let result = supervisor.start(&command).await;

    assert!(matches!(result, Err(LaunchError::PrivilegeDenied { .. })));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn missing_interpreter_is_not_found() {
    let dir = TempDir::new().unwrap();
    let script = write_script(dir.path(), "run.sh", "echo hi");
    let (sink, mut rx) = event_channel();
    let supervisor = Supervisor::new(Arc::new(OutputFilter::new()), sink);

    let command = LaunchCommand::new(&script).interpreter("rwt-no-such-interpreter");
    let result = supervisor.start(&command).await;

    assert!(matches!(result, Err(LaunchError::NotFound(_))));
    assert!(rx.try_recv().is_err());
}
