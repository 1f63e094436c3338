//! Supervisor session tests.

mod session_test;
mod shutdown_test;

use rwt_supervisor::config::ShutdownConfig;
use rwt_supervisor::supervisor::{
    SessionOptions, DEFAULT_CLEANUP_TIMEOUT, DEFAULT_DRAIN_TIMEOUT, DEFAULT_GRACEFUL_TIMEOUT,
    DEFAULT_TERMINATE_TIMEOUT,
};

/// The default config section and the built-in defaults describe the same
/// stop sequence, and the cleanup bound outlasts the escalation windows.
#[test]
fn test_default_shutdown_config_matches_session_defaults() {
    let from_config = SessionOptions::from(&ShutdownConfig::default());
    assert_eq!(from_config, SessionOptions::default());

    assert_eq!(from_config.timeouts.graceful, DEFAULT_GRACEFUL_TIMEOUT);
    assert_eq!(from_config.timeouts.terminate, DEFAULT_TERMINATE_TIMEOUT);
    assert_eq!(from_config.drain_timeout, DEFAULT_DRAIN_TIMEOUT);
    assert_eq!(from_config.cleanup_timeout, DEFAULT_CLEANUP_TIMEOUT);
    assert!(
        DEFAULT_CLEANUP_TIMEOUT > DEFAULT_GRACEFUL_TIMEOUT + DEFAULT_TERMINATE_TIMEOUT,
        "cleanup bound must leave room for the kill stage"
    );
}
