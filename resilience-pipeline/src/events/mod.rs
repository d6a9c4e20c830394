//! Event sink system for resilience telemetry.
//!
//! Strategies report what they did (timeouts fired, retries scheduled,
//! retries exhausted) to an [`EventSink`]. Pipelines built without an
//! explicit sink use the process-wide default returned by [`get_event_sink`].

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use parking_lot::RwLock;
use std::sync::Arc;

/// Emitted when a timeout strategy gives up on its operation.
pub const TIMEOUT_EVENT: &str = "resilience.timeout";
/// Emitted before each retry delay.
pub const RETRY_EVENT: &str = "resilience.retry";
/// Emitted when a handled fault is returned because no retries remain.
pub const RETRY_EXHAUSTED_EVENT: &str = "resilience.retry_exhausted";
/// Emitted once per pipeline execution.
pub const EXECUTION_COMPLETED_EVENT: &str = "resilience.execution.completed";

static GLOBAL_EVENT_SINK: RwLock<Option<Arc<dyn EventSink>>> = RwLock::new(None);

/// Sets the process-wide default event sink.
pub fn set_event_sink(sink: Arc<dyn EventSink>) {
    *GLOBAL_EVENT_SINK.write() = Some(sink);
}

/// Clears the process-wide default event sink.
pub fn clear_event_sink() {
    *GLOBAL_EVENT_SINK.write() = None;
}

/// Gets the process-wide default event sink.
///
/// Returns a `NoOpEventSink` if no sink is set.
pub fn get_event_sink() -> Arc<dyn EventSink> {
    GLOBAL_EVENT_SINK
        .read()
        .clone()
        .unwrap_or_else(|| Arc::new(NoOpEventSink))
}
