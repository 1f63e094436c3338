//! Event sink abstraction.
//!
//! The presentation layer implements [`EventSink`]; the core only ever
//! emits into it and never reads anything back.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::types::SupervisorEvent;

/// Consumer of supervisor events.
///
/// Implementations must be cheap and non-blocking: `emit` is called from the
/// output reader, the shutdown coordinator and the log tailer concurrently.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: SupervisorEvent);
}

impl std::fmt::Debug for dyn EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EventSink")
    }
}

impl EventSink for mpsc::UnboundedSender<SupervisorEvent> {
    fn emit(&self, event: SupervisorEvent) {
        if self.send(event).is_err() {
            tracing::trace!("Event receiver dropped, discarding event");
        }
    }
}

/// Create a channel-backed sink and the receiving half for the consumer.
#[must_use]
pub fn event_channel() -> (Arc<dyn EventSink>, mpsc::UnboundedReceiver<SupervisorEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(tx), rx)
}
