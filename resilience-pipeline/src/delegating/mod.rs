//! Outbound calls routed through named pipelines.
//!
//! A [`Transport`] sends one request. [`DelegatingExecutor`] wraps a
//! transport and is itself a transport, so it can be stacked wherever the
//! plain one was used: every call is looked up by name in a
//! [`PipelineRegistry`] and executed inside that pipeline.

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::{is_transient_status, transient_http_errors, ReqwestTransport};

use crate::context::ResilienceContext;
use crate::errors::ResilienceError;
use crate::registry::PipelineRegistry;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Sends a request and returns its response.
#[async_trait]
pub trait Transport: Send + Sync {
    /// The request type. Requests are borrowed so retries can resend them.
    type Request: Send + Sync;
    /// The response type.
    type Response: Send + 'static;

    /// Sends one request under the given context.
    async fn send(
        &self,
        request: &Self::Request,
        ctx: &ResilienceContext,
    ) -> Result<Self::Response, ResilienceError>;
}

/// A transport that runs every send inside a named pipeline.
pub struct DelegatingExecutor<Tr> {
    inner: Tr,
    registry: Arc<PipelineRegistry>,
    pipeline: String,
}

impl<Tr: Transport> DelegatingExecutor<Tr> {
    /// Wraps `inner` with the pipeline registered as `pipeline` for
    /// `Tr::Response`.
    pub fn new(inner: Tr, registry: Arc<PipelineRegistry>, pipeline: impl Into<String>) -> Self {
        Self {
            inner,
            registry,
            pipeline: pipeline.into(),
        }
    }

    /// Returns the wrapped transport.
    pub fn inner(&self) -> &Tr {
        &self.inner
    }

    /// Returns the pipeline name.
    pub fn pipeline_name(&self) -> &str {
        &self.pipeline
    }

    /// Sends a request under a fresh, never-cancelled context.
    ///
    /// # Errors
    ///
    /// Returns the final fault of the pipeline.
    pub async fn send_request(&self, request: &Tr::Request) -> Result<Tr::Response, ResilienceError> {
        self.send(request, &ResilienceContext::default()).await
    }
}

#[async_trait]
impl<Tr: Transport> Transport for DelegatingExecutor<Tr> {
    type Request = Tr::Request;
    type Response = Tr::Response;

    async fn send(
        &self,
        request: &Self::Request,
        ctx: &ResilienceContext,
    ) -> Result<Self::Response, ResilienceError> {
        let pipeline = self
            .registry
            .get_pipeline::<Tr::Response>(&self.pipeline)?;

        debug!(
            pipeline = %self.pipeline,
            caller_execution_id = %ctx.execution_id(),
            "Delegating send through resilience pipeline"
        );

        let inner = &self.inner;
        pipeline
            .execute_with_token(
                move |attempt_ctx| async move { inner.send(request, &attempt_ctx).await },
                ctx.token().clone(),
            )
            .await
    }
}

impl<Tr> fmt::Debug for DelegatingExecutor<Tr> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatingExecutor")
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use crate::errors::FaultKind;
    use crate::strategies::{PredicateBuilder, RetryOptions};
    use crate::testing::FakeResponse;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Answers each send with the next queued status.
    #[derive(Debug)]
    struct QueuedTransport {
        responses: Mutex<VecDeque<FakeResponse>>,
        sent: Mutex<Vec<(String, u32)>>,
    }

    impl QueuedTransport {
        fn new(statuses: impl IntoIterator<Item = FakeResponse>) -> Self {
            Self {
                responses: Mutex::new(statuses.into_iter().collect()),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transport for QueuedTransport {
        type Request = String;
        type Response = FakeResponse;

        async fn send(
            &self,
            request: &String,
            ctx: &ResilienceContext,
        ) -> Result<FakeResponse, ResilienceError> {
            if ctx.is_cancelled() {
                return Err(ctx.cancelled_error());
            }
            self.sent.lock().push((request.clone(), ctx.attempt()));
            self.responses
                .lock()
                .pop_front()
                .ok_or_else(|| ResilienceError::configuration("no queued response"))
        }
    }

    fn registry() -> Arc<PipelineRegistry> {
        let registry = PipelineRegistry::new();
        registry
            .add_pipeline::<FakeResponse, _>("http", |builder, _| {
                builder.add_retry(
                    RetryOptions::new()
                        .with_delay(Duration::from_millis(10))
                        .with_should_handle(
                            PredicateBuilder::new().handle_result(|r: &FakeResponse| r.status() >= 500),
                        )
                        .retry_after_header(),
                );
            })
            .unwrap();
        Arc::new(registry)
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_is_retried_through_named_pipeline() {
        let transport = QueuedTransport::new([
            FakeResponse::new(503),
            FakeResponse::new(500),
            FakeResponse::new(200),
        ]);
        let executor = DelegatingExecutor::new(transport, registry(), "http");

        let response = executor.send_request(&"GET /status".to_string()).await.unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(
            *executor.inner().sent.lock(),
            vec![
                ("GET /status".to_string(), 0),
                ("GET /status".to_string(), 1),
                ("GET /status".to_string(), 2),
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_pipeline_is_configuration_fault() {
        let executor = DelegatingExecutor::new(QueuedTransport::new([]), registry(), "missing");

        let error = executor.send_request(&"GET /".to_string()).await.unwrap_err();

        assert_eq!(error.kind(), FaultKind::Configuration);
        assert!(error.to_string().contains("missing"));
    }

    #[tokio::test]
    async fn test_caller_token_reaches_inner_send() {
        let executor =
            DelegatingExecutor::new(QueuedTransport::new([FakeResponse::new(200)]), registry(), "http");
        let token = CancellationToken::new();
        token.cancel("client disconnected");

        let error = executor
            .send(&"GET /".to_string(), &ResilienceContext::new(token))
            .await
            .unwrap_err();

        assert_eq!(error.kind(), FaultKind::Cancelled);
        assert!(executor.inner().sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_executors_stack() {
        let inner = DelegatingExecutor::new(
            QueuedTransport::new([FakeResponse::new(502), FakeResponse::new(204)]),
            registry(),
            "http",
        );
        let outer = DelegatingExecutor::new(inner, registry(), "http");

        let response = tokio::time::timeout(
            Duration::from_secs(5),
            outer.send_request(&"GET /".to_string()),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(response.status(), 204);
    }
}
