//! Pipeline execution.

use crate::cancellation::CancellationToken;
use crate::context::ResilienceContext;
use crate::core::Outcome;
use crate::errors::ResilienceError;
use crate::events::{EventSink, EXECUTION_COMPLETED_EVENT};
use crate::strategies::{erase_operation, Next, Strategy};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// An immutable, ordered composition of strategies.
///
/// Built once through [`PipelineBuilder`](super::PipelineBuilder) and shared
/// freely: every execution gets its own context, so concurrent executions
/// never observe each other.
pub struct Pipeline<T: Send + 'static> {
    name: Arc<str>,
    strategies: Arc<[Arc<dyn Strategy<T>>]>,
    event_sink: Option<Arc<dyn EventSink>>,
}

impl<T: Send + 'static> Pipeline<T> {
    pub(crate) fn new(
        name: Arc<str>,
        strategies: Vec<Arc<dyn Strategy<T>>>,
        event_sink: Option<Arc<dyn EventSink>>,
    ) -> Self {
        Self {
            name,
            strategies: strategies.into(),
            event_sink,
        }
    }

    /// A pipeline with no strategies that runs operations directly.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Arc::from("empty"), Vec::new(), None)
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the strategy names, outermost first.
    #[must_use]
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Returns the number of strategies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Returns true if the pipeline has no strategies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Executes an operation under a fresh, never-cancelled context.
    ///
    /// # Errors
    ///
    /// Returns the final fault after every strategy has had its say.
    pub async fn execute<F, Fut>(&self, operation: F) -> Result<T, ResilienceError>
    where
        F: Fn(ResilienceContext) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, ResilienceError>> + Send,
    {
        self.execute_with_token(operation, CancellationToken::new())
            .await
    }

    /// Executes an operation under the caller's cancellation token.
    ///
    /// # Errors
    ///
    /// Returns the final fault, or a cancellation fault once `token` fires.
    pub async fn execute_with_token<F, Fut>(
        &self,
        operation: F,
        token: CancellationToken,
    ) -> Result<T, ResilienceError>
    where
        F: Fn(ResilienceContext) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, ResilienceError>> + Send,
    {
        self.execute_outcome(operation, token).await.into_result()
    }

    /// Executes an operation and returns the raw outcome.
    pub async fn execute_outcome<F, Fut>(&self, operation: F, token: CancellationToken) -> Outcome<T>
    where
        F: Fn(ResilienceContext) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, ResilienceError>> + Send,
    {
        let mut ctx = ResilienceContext::new(token).with_pipeline(Arc::clone(&self.name));
        if let Some(sink) = &self.event_sink {
            ctx = ctx.with_event_sink(Arc::clone(sink));
        }

        let operation = erase_operation(&operation);
        let started = Instant::now();

        let outcome = Next::new(&self.strategies, &operation)
            .run(ctx.clone())
            .await;

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        debug!(
            pipeline = %self.name,
            execution_id = %ctx.execution_id(),
            status = outcome.status(),
            duration_ms,
            "Resilience pipeline execution completed"
        );
        ctx.try_emit_event(
            EXECUTION_COMPLETED_EVENT,
            Some(serde_json::json!({
                "status": outcome.status(),
                "fault": outcome.fault_kind().map(|kind| kind.as_str()),
                "duration_ms": duration_ms,
            })),
        );

        outcome
    }

    /// Executes a synchronous operation, one blocking task per attempt.
    ///
    /// The closure should poll `ctx.is_cancelled()` during long work: a
    /// timeout stops waiting for it but cannot interrupt the thread.
    ///
    /// # Errors
    ///
    /// Returns the final fault. A panic inside `operation` surfaces as an
    /// operation fault.
    pub async fn execute_blocking<F>(&self, operation: F) -> Result<T, ResilienceError>
    where
        F: Fn(&ResilienceContext) -> Result<T, ResilienceError> + Send + Sync + 'static,
    {
        let operation = Arc::new(operation);
        self.execute(move |ctx| {
            let operation = Arc::clone(&operation);
            async move {
                tokio::task::spawn_blocking(move || operation(&ctx))
                    .await
                    .unwrap_or_else(|join_error| Err(ResilienceError::operation(join_error)))
            }
        })
        .await
    }
}

impl<T: Send + 'static> Clone for Pipeline<T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            strategies: Arc::clone(&self.strategies),
            event_sink: self.event_sink.clone(),
        }
    }
}

impl<T: Send + 'static> fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("strategies", &self.strategy_names())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FaultKind;
    use crate::events::CollectingEventSink;
    use crate::pipeline::PipelineBuilder;
    use std::time::Duration;

    #[tokio::test]
    async fn test_empty_pipeline_runs_operation_once() {
        let pipeline = Pipeline::<u32>::empty();
        let value = pipeline.execute(|_ctx| async { Ok(5) }).await.unwrap();
        assert_eq!(value, 5);
    }

    #[tokio::test]
    async fn test_cancelled_token_surfaces_through_operation() {
        let token = CancellationToken::new();
        token.cancel("caller gone");

        let error = Pipeline::<u32>::empty()
            .execute_with_token(
                |ctx| async move {
                    if ctx.is_cancelled() {
                        Err(ctx.cancelled_error())
                    } else {
                        Ok(1)
                    }
                },
                token,
            )
            .await
            .unwrap_err();

        assert_eq!(error.kind(), FaultKind::Cancelled);
    }

    #[tokio::test]
    async fn test_completion_event_uses_pipeline_sink() {
        let sink = Arc::new(CollectingEventSink::new());
        let pipeline = PipelineBuilder::<u32>::new()
            .with_name("observed")
            .with_event_sink(sink.clone())
            .build()
            .unwrap();

        let outcome = pipeline
            .execute_outcome(|ctx| async move { Ok(ctx.attempt()) }, CancellationToken::new())
            .await;
        assert!(outcome.is_success());

        let events = sink.events_of_type(EXECUTION_COMPLETED_EVENT);
        assert_eq!(events.len(), 1);
        let data = events[0].1.as_ref().unwrap();
        assert_eq!(data["pipeline"], "observed");
        assert_eq!(data["status"], "success");
    }

    #[tokio::test]
    async fn test_execute_blocking_under_timeout() {
        let pipeline = PipelineBuilder::<u32>::new()
            .add_timeout(Duration::from_secs(5))
            .build()
            .unwrap();

        let value = pipeline.execute_blocking(|_ctx| Ok(3)).await.unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn test_execute_blocking_panic_is_operation_fault() {
        let error = Pipeline::<u32>::empty()
            .execute_blocking(|_ctx| panic!("worker exploded"))
            .await
            .unwrap_err();
        assert_eq!(error.kind(), FaultKind::Operation);
    }

    #[test]
    fn test_debug_lists_strategies() {
        let pipeline = PipelineBuilder::<u32>::new()
            .with_name("dbg")
            .add_timeout(Duration::from_secs(1))
            .build()
            .unwrap();
        let debug = format!("{pipeline:?}");
        assert!(debug.contains("dbg"));
        assert!(debug.contains("timeout"));
    }
}
