//! Event sinks for strategy telemetry.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, trace, warn, Level};

/// Receives the events strategies report while a pipeline runs.
///
/// Payloads are JSON objects stamped with `pipeline` and `execution_id`
/// by [`ResilienceContext`](crate::context::ResilienceContext).
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event asynchronously.
    ///
    /// # Arguments
    ///
    /// * `event_type` - The type of event (e.g., "resilience.retry")
    /// * `data` - Optional event payload
    async fn emit(&self, event_type: &str, data: Option<Value>);

    /// Emits an event from synchronous code.
    ///
    /// Strategies call this on their hot path, so it must never fail or block.
    fn try_emit(&self, event_type: &str, data: Option<Value>);
}

/// Discards every event. The default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: Option<Value>) {}

    fn try_emit(&self, _event_type: &str, _data: Option<Value>) {}
}

/// Writes every event to `tracing` at a fixed level.
#[derive(Debug, Clone, Copy)]
pub struct LoggingEventSink {
    level: Level,
}

impl LoggingEventSink {
    /// Creates a sink logging at `level`.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    /// Creates an info-level sink.
    #[must_use]
    pub fn info() -> Self {
        Self::new(Level::INFO)
    }

    /// Returns the level events are logged at.
    #[must_use]
    pub fn level(&self) -> Level {
        self.level
    }

    fn log(&self, event_type: &str, data: Option<&Value>) {
        let pipeline = str_field(data, "pipeline");
        let execution_id = str_field(data, "execution_id");

        match self.level {
            Level::TRACE => trace!(event_type, pipeline, execution_id, payload = ?data, "Resilience event"),
            Level::DEBUG => debug!(event_type, pipeline, execution_id, payload = ?data, "Resilience event"),
            Level::WARN | Level::ERROR => {
                warn!(event_type, pipeline, execution_id, payload = ?data, "Resilience event");
            }
            _ => info!(event_type, pipeline, execution_id, payload = ?data, "Resilience event"),
        }
    }
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self::info()
    }
}

fn str_field<'a>(data: Option<&'a Value>, key: &str) -> &'a str {
    data.and_then(|d| d.get(key))
        .and_then(Value::as_str)
        .unwrap_or("-")
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.log(event_type, data.as_ref());
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.log(event_type, data.as_ref());
    }
}

/// Records events in memory so tests can inspect them.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    recorded: Mutex<Vec<(String, Option<Value>)>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, event_type: &str, data: Option<Value>) {
        self.recorded.lock().push((event_type.to_owned(), data));
    }

    /// Returns a snapshot of every recorded event, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<(String, Option<Value>)> {
        self.recorded.lock().clone()
    }

    /// Returns the recorded events whose type starts with `type_prefix`.
    ///
    /// `"resilience.retry"` also matches `"resilience.retry_exhausted"`; use
    /// [`count`](Self::count) or [`payloads`](Self::payloads) for an exact match.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<(String, Option<Value>)> {
        self.recorded
            .lock()
            .iter()
            .filter(|(event_type, _)| event_type.starts_with(type_prefix))
            .cloned()
            .collect()
    }

    /// Returns how many events of exactly `event_type` were recorded.
    #[must_use]
    pub fn count(&self, event_type: &str) -> usize {
        self.recorded
            .lock()
            .iter()
            .filter(|(recorded, _)| recorded == event_type)
            .count()
    }

    /// Returns the payloads of events of exactly `event_type`.
    #[must_use]
    pub fn payloads(&self, event_type: &str) -> Vec<Value> {
        self.recorded
            .lock()
            .iter()
            .filter(|(recorded, _)| recorded == event_type)
            .filter_map(|(_, data)| data.clone())
            .collect()
    }

    /// Returns the number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.recorded.lock().len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recorded.lock().is_empty()
    }

    /// Forgets every recorded event.
    pub fn clear(&self) {
        self.recorded.lock().clear();
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.record(event_type, data);
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.record(event_type, data);
    }
}
