//! Shutdown coordinator against real process groups.

use std::time::Duration;

use rwt_supervisor::events::event_channel;
use rwt_supervisor::process::{ChildGroup, GroupSignal, LaunchCommand};
use rwt_supervisor::supervisor::{ShutdownCoordinator, ShutdownOutcome, ShutdownStage, ShutdownTimeouts};
use tempfile::TempDir;

use crate::write_script;

const TIMEOUTS: ShutdownTimeouts = ShutdownTimeouts {
    graceful: Duration::from_millis(300),
    terminate: Duration::from_millis(300),
};

fn spawn_group(dir: &TempDir, body: &str) -> ChildGroup {
    let script = write_script(dir.path(), "group.sh", body);
    let launched = LaunchCommand::new(script).interpreter("sh").spawn().unwrap();
    ChildGroup::new(launched.child, launched.pgid)
}

#[tokio::test]
async fn cooperative_group_stops_on_interrupt() {
    let dir = TempDir::new().unwrap();
    let mut group = spawn_group(&dir, "trap 'exit 0' INT\nwhile true; do sleep 0.05; done");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (sink, _rx) = event_channel();
    let mut coordinator = ShutdownCoordinator::new(TIMEOUTS, sink);
    let outcome = coordinator.run(&mut group).await;

    match outcome {
        ShutdownOutcome::Terminated { exit, strongest } => {
            assert_eq!(strongest, GroupSignal::Interrupt);
            assert_eq!(exit.map(|e| e.code), Some(0));
        }
        ShutdownOutcome::AlreadyRequested => panic!("first run must act"),
    }
    assert_eq!(
        coordinator.history(),
        [
            ShutdownStage::Idle,
            ShutdownStage::SignalingInterrupt,
            ShutdownStage::WaitingGraceful,
            ShutdownStage::Terminated,
        ]
    );

    assert_eq!(
        coordinator.run(&mut group).await,
        ShutdownOutcome::AlreadyRequested
    );
}

#[tokio::test]
async fn stubborn_group_is_killed() {
    let dir = TempDir::new().unwrap();
    let mut group = spawn_group(&dir, "trap '' INT TERM\nwhile true; do sleep 0.05; done");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (sink, _rx) = event_channel();
    let mut coordinator = ShutdownCoordinator::new(TIMEOUTS, sink);
    let outcome = coordinator.run(&mut group).await;

    match outcome {
        ShutdownOutcome::Terminated { exit, strongest } => {
            assert_eq!(strongest, GroupSignal::Kill);
            assert_eq!(exit.and_then(|e| e.signal), Some(9));
        }
        ShutdownOutcome::AlreadyRequested => panic!("first run must act"),
    }
    assert_eq!(coordinator.stage(), ShutdownStage::Terminated);
}
