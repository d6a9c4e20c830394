//! Timeout strategy.

use super::{notify_observer, Next, Strategy};
use crate::context::ResilienceContext;
use crate::core::Outcome;
use crate::errors::ResilienceError;
use crate::events::TIMEOUT_EVENT;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Default timeout when none is configured.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound accepted by validation.
const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Passed to the `on_timeout` observer.
#[derive(Debug, Clone)]
pub struct TimeoutEvent {
    /// The timeout that elapsed.
    pub timeout: Duration,
    /// The context of the execution that timed out.
    pub context: ResilienceContext,
}

/// Observer invoked when a timeout fires.
pub type OnTimeout = Arc<dyn Fn(&TimeoutEvent) + Send + Sync>;

/// Options for [`TimeoutStrategy`].
#[derive(Clone)]
pub struct TimeoutOptions {
    /// How long the inner pipeline may run.
    pub timeout: Duration,
    /// Called after the inner pipeline has been cancelled.
    pub on_timeout: Option<OnTimeout>,
}

impl TimeoutOptions {
    /// Creates options with the given timeout.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            on_timeout: None,
        }
    }

    /// Sets the timeout observer.
    #[must_use]
    pub fn with_on_timeout<F>(mut self, observer: F) -> Self
    where
        F: Fn(&TimeoutEvent) + Send + Sync + 'static,
    {
        self.on_timeout = Some(Arc::new(observer));
        self
    }
}

impl Default for TimeoutOptions {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl From<Duration> for TimeoutOptions {
    fn from(timeout: Duration) -> Self {
        Self::new(timeout)
    }
}

impl fmt::Debug for TimeoutOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeoutOptions")
            .field("timeout", &self.timeout)
            .field("on_timeout", &self.on_timeout.is_some())
            .finish()
    }
}

/// Bounds the execution time of everything it wraps.
///
/// The inner pipeline runs under a child cancellation token. When the timer
/// wins, that token is cancelled and the in-flight future is dropped, so the
/// operation observes cancellation at its next await point. Cancellation of
/// the caller's context always wins over the timer.
#[derive(Debug, Clone)]
pub struct TimeoutStrategy {
    options: TimeoutOptions,
}

impl TimeoutStrategy {
    /// Creates a timeout strategy.
    #[must_use]
    pub fn new(options: TimeoutOptions) -> Self {
        Self { options }
    }

    /// Returns the configured timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.options.timeout
    }

    fn timed_out(&self, ctx: &ResilienceContext, child: &ResilienceContext) -> ResilienceError {
        let timeout = self.options.timeout;
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);

        child
            .token()
            .cancel(format!("timed out after {timeout_ms}ms"));

        warn!(
            pipeline = ctx.pipeline(),
            execution_id = %ctx.execution_id(),
            timeout_ms,
            "Timeout occurred after: {} seconds",
            timeout.as_secs_f64()
        );

        ctx.try_emit_event(
            TIMEOUT_EVENT,
            Some(serde_json::json!({
                "timeout_ms": timeout_ms,
                "attempt": ctx.attempt(),
            })),
        );

        if let Some(observer) = &self.options.on_timeout {
            let event = TimeoutEvent {
                timeout,
                context: ctx.clone(),
            };
            notify_observer("on_timeout", ctx, || observer(&event));
        }

        ResilienceError::timeout(timeout)
    }
}

#[async_trait]
impl<T: Send + 'static> Strategy<T> for TimeoutStrategy {
    fn name(&self) -> &'static str {
        "timeout"
    }

    fn validate(&self) -> Result<(), ResilienceError> {
        let timeout = self.options.timeout;
        if timeout.is_zero() || timeout > MAX_TIMEOUT {
            return Err(ResilienceError::configuration(format!(
                "timeout must be greater than zero and at most 24 hours, got {timeout:?}"
            )));
        }
        Ok(())
    }

    async fn execute(&self, ctx: ResilienceContext, next: Next<'_, T>) -> Outcome<T> {
        if ctx.is_cancelled() {
            return Outcome::Failure(ctx.cancelled_error());
        }

        let child = ctx.child();

        tokio::select! {
            biased;
            () = ctx.cancelled() => Outcome::Failure(ctx.cancelled_error()),
            outcome = next.run(child.clone()) => outcome,
            () = tokio::time::sleep(self.options.timeout) => {
                Outcome::Failure(self.timed_out(&ctx, &child))
            }
        }
    }
}
