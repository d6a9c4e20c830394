//! Retry strategy.

use super::backoff::{BackoffKind, DelayGenerator, DelayGeneratorArguments, JitterStrategy};
use super::predicate::ShouldHandle;
use super::retry_after::{retry_after_header, HeaderLookup, RetryAfterExtractor};
use super::{notify_observer, Next, Strategy};
use crate::context::ResilienceContext;
use crate::core::Outcome;
use crate::errors::ResilienceError;
use crate::events::{RETRY_EVENT, RETRY_EXHAUSTED_EVENT};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_DELAY: Duration = Duration::from_secs(2);
const MAX_BASE_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Passed to the `on_retry` observer before each retry delay.
#[derive(Debug)]
pub struct RetryEvent<'a, T> {
    /// The attempt that just failed (0-indexed).
    pub attempt: u32,
    /// How long the strategy will wait before the next attempt.
    pub retry_delay: Duration,
    /// The outcome that triggered the retry.
    pub outcome: &'a Outcome<T>,
    /// The execution context of the failed attempt.
    pub context: &'a ResilienceContext,
}

/// Observer invoked before each retry delay.
pub type OnRetry<T> = Arc<dyn Fn(&RetryEvent<'_, T>) + Send + Sync>;

/// Options for [`RetryStrategy`].
pub struct RetryOptions<T> {
    /// Retries after the first attempt; total calls are at most this plus one.
    pub max_retry_attempts: u32,
    /// Base delay fed to the backoff formula.
    pub delay: Duration,
    /// How the base delay grows.
    pub backoff: BackoffKind,
    /// Randomization applied to backoff delays.
    pub jitter: JitterStrategy,
    /// Cap for generated and backoff delays.
    pub max_delay: Option<Duration>,
    /// Custom delay source tried before the backoff formula.
    pub delay_generator: Option<DelayGenerator<T>>,
    /// Delay hint read from the outcome, tried before everything else.
    pub retry_after: Option<RetryAfterExtractor<T>>,
    /// Decides which outcomes are retried.
    pub should_handle: ShouldHandle<T>,
    /// Called before each retry delay.
    pub on_retry: Option<OnRetry<T>>,
}

impl<T: 'static> RetryOptions<T> {
    /// Creates options with defaults: 3 retries, 2s constant delay.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_retry_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            delay: DEFAULT_DELAY,
            backoff: BackoffKind::default(),
            jitter: JitterStrategy::default(),
            max_delay: None,
            delay_generator: None,
            retry_after: None,
            should_handle: ShouldHandle::default(),
            on_retry: None,
        }
    }

    /// Sets the maximum number of retries.
    #[must_use]
    pub fn with_max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sets the backoff formula.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffKind) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Caps generated and backoff delays.
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Sets a custom delay generator.
    #[must_use]
    pub fn with_delay_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(&DelayGeneratorArguments<'_, T>) -> Option<Duration> + Send + Sync + 'static,
    {
        self.delay_generator = Some(Arc::new(generator));
        self
    }

    /// Sets a custom delay hint extractor.
    #[must_use]
    pub fn with_retry_after<F>(mut self, extractor: F) -> Self
    where
        F: Fn(&Outcome<T>) -> Option<Result<Duration, ResilienceError>> + Send + Sync + 'static,
    {
        self.retry_after = Some(Arc::new(extractor));
        self
    }

    /// Sets the predicate deciding which outcomes are retried.
    #[must_use]
    pub fn with_should_handle(mut self, should_handle: impl Into<ShouldHandle<T>>) -> Self {
        self.should_handle = should_handle.into();
        self
    }

    /// Sets the retry observer.
    #[must_use]
    pub fn with_on_retry<F>(mut self, observer: F) -> Self
    where
        F: Fn(&RetryEvent<'_, T>) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(observer));
        self
    }
}

impl<T: HeaderLookup + 'static> RetryOptions<T> {
    /// Honors the `Retry-After` header of successful responses.
    #[must_use]
    pub fn retry_after_header(mut self) -> Self {
        self.retry_after = Some(retry_after_header());
        self
    }
}

impl<T: 'static> Default for RetryOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for RetryOptions<T> {
    fn clone(&self) -> Self {
        Self {
            max_retry_attempts: self.max_retry_attempts,
            delay: self.delay,
            backoff: self.backoff,
            jitter: self.jitter,
            max_delay: self.max_delay,
            delay_generator: self.delay_generator.clone(),
            retry_after: self.retry_after.clone(),
            should_handle: self.should_handle.clone(),
            on_retry: self.on_retry.clone(),
        }
    }
}

impl<T> fmt::Debug for RetryOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("max_retry_attempts", &self.max_retry_attempts)
            .field("delay", &self.delay)
            .field("backoff", &self.backoff)
            .field("jitter", &self.jitter)
            .field("max_delay", &self.max_delay)
            .field("delay_generator", &self.delay_generator.is_some())
            .field("retry_after", &self.retry_after.is_some())
            .field("on_retry", &self.on_retry.is_some())
            .finish_non_exhaustive()
    }
}

/// Re-runs everything it wraps while the outcome is handled.
///
/// Attempts are strictly sequential. The final answer is always the outcome
/// of the last attempt, or a cancellation fault if the caller's context is
/// cancelled while a retry is pending.
pub struct RetryStrategy<T> {
    options: RetryOptions<T>,
}

impl<T> Clone for RetryStrategy<T> {
    fn clone(&self) -> Self {
        Self {
            options: self.options.clone(),
        }
    }
}

impl<T> fmt::Debug for RetryStrategy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryStrategy")
            .field("options", &self.options)
            .finish()
    }
}

impl<T> RetryStrategy<T> {
    /// Creates a retry strategy.
    #[must_use]
    pub fn new(options: RetryOptions<T>) -> Self {
        Self { options }
    }

    /// Returns the strategy options.
    #[must_use]
    pub fn options(&self) -> &RetryOptions<T> {
        &self.options
    }

    /// Computes the delay before the retry following `attempt`.
    ///
    /// The retry-after hint wins over the delay generator, which wins over
    /// the backoff formula. Only the latter two are capped by `max_delay`.
    ///
    /// # Errors
    ///
    /// Returns the extractor's fault if the retry-after hint is malformed.
    pub fn next_delay(
        &self,
        attempt: u32,
        outcome: &Outcome<T>,
        ctx: &ResilienceContext,
    ) -> Result<Duration, ResilienceError> {
        if let Some(hint) = self.options.retry_after.as_ref().and_then(|extract| extract(outcome)) {
            return hint;
        }

        let generated = self.options.delay_generator.as_ref().and_then(|generate| {
            generate(&DelayGeneratorArguments {
                attempt,
                outcome,
                context: ctx,
            })
        });

        let delay = generated.unwrap_or_else(|| {
            self.options
                .jitter
                .apply(self.options.backoff.delay(self.options.delay, attempt))
        });

        Ok(self.options.max_delay.map_or(delay, |cap| delay.min(cap)))
    }

    fn exhausted(&self, ctx: &ResilienceContext, outcome: &Outcome<T>) {
        warn!(
            pipeline = ctx.pipeline(),
            execution_id = %ctx.execution_id(),
            attempts = ctx.attempt() + 1,
            "Retries exhausted, returning last outcome"
        );
        ctx.try_emit_event(
            RETRY_EXHAUSTED_EVENT,
            Some(serde_json::json!({
                "attempts": ctx.attempt() + 1,
                "max_retry_attempts": self.options.max_retry_attempts,
                "fault": outcome.fault_kind().map(|kind| kind.as_str()),
            })),
        );
    }

    fn retrying(&self, ctx: &ResilienceContext, outcome: &Outcome<T>, delay: Duration) {
        let attempt = ctx.attempt();
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);

        info!(
            pipeline = ctx.pipeline(),
            execution_id = %ctx.execution_id(),
            attempt = attempt + 1,
            delay_ms,
            "Retrying... {} attempt after {:?}",
            attempt + 1,
            delay
        );
        ctx.try_emit_event(
            RETRY_EVENT,
            Some(serde_json::json!({
                "attempt": attempt,
                "delay_ms": delay_ms,
                "outcome": outcome.status(),
                "fault": outcome.fault_kind().map(|kind| kind.as_str()),
            })),
        );

        if let Some(observer) = &self.options.on_retry {
            let event = RetryEvent {
                attempt,
                retry_delay: delay,
                outcome,
                context: ctx,
            };
            notify_observer("on_retry", ctx, || observer(&event));
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Strategy<T> for RetryStrategy<T> {
    fn name(&self) -> &'static str {
        "retry"
    }

    fn validate(&self) -> Result<(), ResilienceError> {
        if self.options.delay > MAX_BASE_DELAY {
            return Err(ResilienceError::configuration(format!(
                "retry delay must be at most 24 hours, got {:?}",
                self.options.delay
            )));
        }
        Ok(())
    }

    async fn execute(&self, ctx: ResilienceContext, next: Next<'_, T>) -> Outcome<T> {
        let mut attempt = 0;

        loop {
            let attempt_ctx = ctx.with_attempt(attempt);
            let outcome = next.run(attempt_ctx.clone()).await;

            if !self.options.should_handle.matches(&outcome) {
                return outcome;
            }

            if attempt >= self.options.max_retry_attempts {
                self.exhausted(&attempt_ctx, &outcome);
                return outcome;
            }

            if ctx.is_cancelled() {
                return Outcome::Failure(ctx.cancelled_error());
            }

            let delay = match self.next_delay(attempt, &outcome, &attempt_ctx) {
                Ok(delay) => delay,
                Err(error) => {
                    warn!(
                        pipeline = ctx.pipeline(),
                        execution_id = %ctx.execution_id(),
                        attempt,
                        "Invalid retry delay hint: {}",
                        error
                    );
                    return Outcome::Failure(error);
                }
            };

            self.retrying(&attempt_ctx, &outcome, delay);
            drop(outcome);

            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    () = ctx.cancelled() => {
                        debug!(
                            pipeline = ctx.pipeline(),
                            execution_id = %ctx.execution_id(),
                            attempt,
                            "Retry delay interrupted by cancellation"
                        );
                        return Outcome::Failure(ctx.cancelled_error());
                    }
                    () = tokio::time::sleep(delay) => {}
                }
            }

            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use crate::errors::FaultKind;
    use crate::events::CollectingEventSink;
    use crate::strategies::{erase_operation, exponential_seconds, PredicateBuilder};
    use crate::testing::{FakeResponse, PermanentFault, ScriptedOperation, TestFault};
    use parking_lot::Mutex;
    use tokio::time::Instant;

    async fn run<T>(options: RetryOptions<T>, op: &ScriptedOperation<T>, ctx: ResilienceContext) -> Outcome<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let strategies: Vec<Arc<dyn Strategy<T>>> = vec![Arc::new(RetryStrategy::new(options))];
        let raw = |ctx: ResilienceContext| op.call(ctx);
        let operation = erase_operation(&raw);
        Next::new(&strategies, &operation).run(ctx).await
    }

    #[test]
    fn test_default_options() {
        let options = RetryOptions::<u32>::default();
        assert_eq!(options.max_retry_attempts, 3);
        assert_eq!(options.delay, Duration::from_secs(2));
        assert_eq!(options.backoff, BackoffKind::Constant);
        assert!(options.delay_generator.is_none());
    }

    #[test]
    fn test_validate_accepts_any_attempt_count() {
        for attempts in [0, 101, u32::MAX] {
            let strategy = RetryStrategy::new(RetryOptions::<u32>::new().with_max_retry_attempts(attempts));
            assert!(Strategy::<u32>::validate(&strategy).is_ok());
        }

        let slow = RetryStrategy::new(RetryOptions::<u32>::new().with_delay(Duration::from_secs(24 * 60 * 60 + 1)));
        let error = Strategy::<u32>::validate(&slow).unwrap_err();
        assert_eq!(error.kind(), FaultKind::Configuration);
    }

    #[test]
    fn test_delay_priority() {
        let ctx = ResilienceContext::default();
        let strategy = RetryStrategy::new(
            RetryOptions::<FakeResponse>::new()
                .with_delay(Duration::from_secs(1))
                .with_backoff(BackoffKind::Exponential)
                .with_delay_generator(|args| (args.attempt == 0).then(|| Duration::from_millis(300)))
                .retry_after_header(),
        );

        let hinted = Outcome::Success(FakeResponse::new(429).with_header("Retry-After", "10"));
        assert_eq!(strategy.next_delay(0, &hinted, &ctx).unwrap(), Duration::from_secs(10));

        let plain = Outcome::Success(FakeResponse::new(503));
        assert_eq!(strategy.next_delay(0, &plain, &ctx).unwrap(), Duration::from_millis(300));
        assert_eq!(strategy.next_delay(1, &plain, &ctx).unwrap(), Duration::from_secs(4));

        let malformed = Outcome::Success(FakeResponse::new(429).with_header("Retry-After", "later"));
        assert_eq!(
            strategy.next_delay(0, &malformed, &ctx).unwrap_err().kind(),
            FaultKind::Configuration
        );
    }

    #[test]
    fn test_max_delay_caps_backoff_but_not_hint() {
        let ctx = ResilienceContext::default();
        let strategy = RetryStrategy::new(
            RetryOptions::<FakeResponse>::new()
                .with_delay(Duration::from_secs(10))
                .with_max_delay(Duration::from_secs(3))
                .retry_after_header(),
        );

        let plain = Outcome::Success(FakeResponse::new(503));
        assert_eq!(strategy.next_delay(0, &plain, &ctx).unwrap(), Duration::from_secs(3));

        let hinted = Outcome::Success(FakeResponse::new(429).with_header("Retry-After", "60"));
        assert_eq!(strategy.next_delay(0, &hinted, &ctx).unwrap(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let op = ScriptedOperation::new([
            Err(ResilienceError::operation(TestFault::new("boom"))),
            Err(ResilienceError::operation(TestFault::new("boom"))),
            Ok(7),
        ]);
        let options = RetryOptions::new().with_delay(Duration::from_millis(100));

        let outcome = run(options, &op, ResilienceContext::default()).await;

        assert_eq!(outcome.result(), Some(&7));
        assert_eq!(op.calls(), 3);
        assert_eq!(op.attempts_seen(), vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_fault() {
        let op = ScriptedOperation::<u32>::new([
            Err(ResilienceError::operation(TestFault::new("first"))),
            Err(ResilienceError::operation(TestFault::new("last"))),
        ]);
        let sink = Arc::new(CollectingEventSink::new());
        let ctx = ResilienceContext::default().with_event_sink(sink.clone());
        let options = RetryOptions::new()
            .with_max_retry_attempts(2)
            .with_delay(Duration::from_millis(10));

        let outcome = run(options, &op, ctx).await;

        assert_eq!(op.calls(), 3);
        let fault = outcome.error().unwrap().downcast_ref::<TestFault>().unwrap();
        assert_eq!(fault.message(), "last");
        assert_eq!(sink.count(RETRY_EVENT), 2);
        assert_eq!(sink.events_of_type(RETRY_EXHAUSTED_EVENT).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_means_single_attempt() {
        let op = ScriptedOperation::<u32>::new([Err(ResilienceError::operation(TestFault::new("x")))]);
        let outcome = run(RetryOptions::new().with_max_retry_attempts(0), &op, ResilienceContext::default()).await;

        assert!(outcome.is_failure());
        assert_eq!(op.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unhandled_fault_passes_through() {
        let op = ScriptedOperation::<u32>::new([Err(ResilienceError::operation(PermanentFault))]);
        let options = RetryOptions::new().with_should_handle(PredicateBuilder::new().handle::<TestFault>());

        let outcome = run(options, &op, ResilienceContext::default()).await;

        assert_eq!(op.calls(), 1);
        assert!(outcome.error().unwrap().downcast_ref::<PermanentFault>().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exponential_generator_schedule() {
        let op = ScriptedOperation::<u32>::new([Err(ResilienceError::operation(TestFault::new("x")))]);
        let recorded = Arc::new(Mutex::new(Vec::new()));
        let recorded_clone = recorded.clone();
        let options = RetryOptions::new()
            .with_delay_generator(exponential_seconds)
            .with_on_retry(move |event| recorded_clone.lock().push((event.attempt, event.retry_delay)));

        let start = Instant::now();
        let outcome = run(options, &op, ResilienceContext::default()).await;

        assert!(outcome.is_failure());
        assert_eq!(op.calls(), 4);
        assert_eq!(
            *recorded.lock(),
            vec![
                (0, Duration::from_secs(2)),
                (1, Duration::from_secs(4)),
                (2, Duration::from_secs(8)),
            ]
        );
        assert!(start.elapsed() >= Duration::from_secs(14));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_result_retries_values() {
        let op = ScriptedOperation::new([
            Ok(FakeResponse::new(503)),
            Ok(FakeResponse::new(429).with_header("Retry-After", "1")),
            Ok(FakeResponse::new(200)),
        ]);
        let options = RetryOptions::new()
            .with_delay(Duration::from_millis(10))
            .with_should_handle(PredicateBuilder::new().handle_result(|r: &FakeResponse| r.status() >= 429))
            .retry_after_header();

        let outcome = run(options, &op, ResilienceContext::default()).await;

        assert_eq!(outcome.result().map(FakeResponse::status), Some(200));
        assert_eq!(op.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_hint_fails_with_configuration() {
        let op = ScriptedOperation::new([Ok(FakeResponse::new(429).with_header("Retry-After", "abc"))]);
        let options = RetryOptions::new()
            .with_should_handle(PredicateBuilder::new().handle_result(|r: &FakeResponse| r.status() == 429))
            .retry_after_header();

        let outcome = run(options, &op, ResilienceContext::default()).await;

        assert_eq!(outcome.fault_kind(), Some(FaultKind::Configuration));
        assert_eq!(op.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_delay() {
        let op = ScriptedOperation::<u32>::new([Err(ResilienceError::operation(TestFault::new("x")))]);
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel("shutdown");
        });

        let options = RetryOptions::new().with_delay(Duration::from_secs(30));
        let start = Instant::now();
        let outcome = run(options, &op, ResilienceContext::new(token)).await;

        assert_eq!(outcome.fault_kind(), Some(FaultKind::Cancelled));
        assert_eq!(op.calls(), 1);
        assert!(start.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_observer_does_not_break_retry() {
        let op = ScriptedOperation::new([Err(ResilienceError::operation(TestFault::new("x"))), Ok(1)]);
        let options = RetryOptions::new()
            .with_delay(Duration::from_millis(1))
            .with_on_retry(|_| panic!("observer failure"));

        let outcome = run(options, &op, ResilienceContext::default()).await;

        assert_eq!(outcome.result(), Some(&1));
    }
}
