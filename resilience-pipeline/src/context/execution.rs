//! Per-execution context handed to strategies and operations.

use crate::cancellation::CancellationToken;
use crate::errors::ResilienceError;
use crate::events::{get_event_sink, EventSink};
use std::sync::Arc;
use uuid::Uuid;

/// The context of one pipeline execution.
///
/// A context is owned by a single `execute` call. Strategies derive new
/// contexts from it: the timeout strategy links a child cancellation token,
/// and the retry strategy stamps the attempt number. Cloning is cheap.
#[derive(Clone)]
pub struct ResilienceContext {
    /// Cancellation signal for this execution.
    token: CancellationToken,
    /// The pipeline running this execution.
    pipeline: Arc<str>,
    /// Correlates log lines and events of one execution.
    execution_id: Uuid,
    /// Retry-scoped attempt number (0-indexed).
    attempt: u32,
    /// Sink for strategy telemetry.
    event_sink: Arc<dyn EventSink>,
}

impl ResilienceContext {
    /// Creates a context driven by the given token.
    #[must_use]
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            pipeline: Arc::from("default"),
            execution_id: Uuid::new_v4(),
            attempt: 0,
            event_sink: get_event_sink(),
        }
    }

    /// Sets the pipeline name.
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: Arc<str>) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Returns a copy of this context stamped with an attempt number.
    #[must_use]
    pub fn with_attempt(&self, attempt: u32) -> Self {
        let mut ctx = self.clone();
        ctx.attempt = attempt;
        ctx
    }

    /// Returns a copy of this context with a linked child token.
    ///
    /// Cancelling the child leaves this context untouched.
    #[must_use]
    pub fn child(&self) -> Self {
        let mut ctx = self.clone();
        ctx.token = self.token.child_token();
        ctx
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes once cancellation has been requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Builds the fault reported when this context is cancelled.
    #[must_use]
    pub fn cancelled_error(&self) -> ResilienceError {
        ResilienceError::cancelled(
            self.token
                .reason()
                .unwrap_or_else(|| "execution was cancelled".to_string()),
        )
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// Returns the execution id.
    #[must_use]
    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    /// Returns the current attempt number.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Tries to emit an event, stamped with the pipeline and execution id.
    pub fn try_emit_event(&self, event_type: &str, data: Option<serde_json::Value>) {
        let mut payload = match data {
            Some(serde_json::Value::Object(map)) => map,
            Some(other) => {
                let mut map = serde_json::Map::new();
                map.insert("data".to_string(), other);
                map
            }
            None => serde_json::Map::new(),
        };
        payload.insert("pipeline".to_string(), serde_json::json!(&*self.pipeline));
        payload.insert(
            "execution_id".to_string(),
            serde_json::json!(self.execution_id.to_string()),
        );

        self.event_sink
            .try_emit(event_type, Some(serde_json::Value::Object(payload)));
    }
}

impl Default for ResilienceContext {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

impl std::fmt::Debug for ResilienceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilienceContext")
            .field("pipeline", &self.pipeline)
            .field("execution_id", &self.execution_id)
            .field("attempt", &self.attempt)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}
