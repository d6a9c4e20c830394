//! Resilience strategies and the machinery that chains them.
//!
//! A [`Strategy`] wraps whatever comes after it in the pipeline, reached
//! through [`Next`]. The innermost `Next` runs the user operation itself.

mod backoff;
mod predicate;
mod retry;
mod retry_after;
mod timeout;

pub use backoff::{exponential_seconds, BackoffKind, DelayGenerator, DelayGeneratorArguments, JitterStrategy};
pub use predicate::{PredicateBuilder, ShouldHandle};
pub use retry::{OnRetry, RetryEvent, RetryOptions, RetryStrategy};
pub use retry_after::{parse_retry_after, retry_after_header, HeaderLookup, RetryAfterExtractor, RETRY_AFTER};
pub use timeout::{OnTimeout, TimeoutEvent, TimeoutOptions, TimeoutStrategy};

use crate::context::ResilienceContext;
use crate::core::Outcome;
use crate::errors::ResilienceError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

/// The user operation after type erasure.
///
/// The returned future borrows only the operation itself, so a pipeline can
/// hold the operation on its own stack while strategies run it.
pub trait Operation<T>: Send + Sync {
    /// Starts one attempt.
    fn call(&self, ctx: ResilienceContext) -> BoxFuture<'_, Outcome<T>>;
}

/// A borrowed, erased user operation.
pub type BoxedOperation<'a, T> = dyn Operation<T> + 'a;

/// A composable unit of resilience behavior.
///
/// Implementations receive the execution context and a handle to the rest
/// of the pipeline. They may call [`Next::run`] zero, one or many times and
/// may observe or replace the outcome it returns.
#[async_trait]
pub trait Strategy<T: Send + 'static>: Send + Sync + Debug {
    /// Returns the strategy name used in logs.
    fn name(&self) -> &'static str;

    /// Validates the strategy options when the pipeline is built.
    fn validate(&self) -> Result<(), ResilienceError> {
        Ok(())
    }

    /// Executes the strategy around the rest of the pipeline.
    async fn execute(&self, ctx: ResilienceContext, next: Next<'_, T>) -> Outcome<T>;
}

/// Adapts a borrowed closure to [`Operation`].
pub(crate) struct ClosureOperation<'f, F>(&'f F);

impl<'f, T, F, Fut> Operation<T> for ClosureOperation<'f, F>
where
    T: Send + 'f,
    F: Fn(ResilienceContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, ResilienceError>> + Send + 'f,
{
    fn call(&self, ctx: ResilienceContext) -> BoxFuture<'_, Outcome<T>> {
        let attempt = (self.0)(ctx);
        Box::pin(async move { Outcome::from(attempt.await) })
    }
}

/// Erases a user operation into the form stored in [`Next`].
pub(crate) fn erase_operation<F>(operation: &F) -> ClosureOperation<'_, F> {
    ClosureOperation(operation)
}

/// Handle to the remainder of a pipeline.
pub struct Next<'a, T: Send + 'static> {
    strategies: &'a [Arc<dyn Strategy<T>>],
    operation: &'a BoxedOperation<'a, T>,
}

impl<'a, T: Send + 'static> Next<'a, T> {
    /// Creates a handle over the given strategies and operation.
    pub fn new(strategies: &'a [Arc<dyn Strategy<T>>], operation: &'a BoxedOperation<'a, T>) -> Self {
        Self {
            strategies,
            operation,
        }
    }

    /// Runs the rest of the pipeline once.
    pub fn run(self, ctx: ResilienceContext) -> BoxFuture<'a, Outcome<T>> {
        match self.strategies.split_first() {
            Some((head, rest)) => head.execute(
                ctx,
                Next {
                    strategies: rest,
                    operation: self.operation,
                },
            ),
            None => self.operation.call(ctx),
        }
    }

    /// Returns the number of strategies still to run.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.strategies.len()
    }
}

impl<T: Send + 'static> Clone for Next<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Send + 'static> Copy for Next<'_, T> {}

/// Invokes an observer hook, isolating any panic it raises.
pub(crate) fn notify_observer(hook: &'static str, ctx: &ResilienceContext, observer: impl FnOnce()) {
    if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(observer)) {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        warn!(
            hook,
            pipeline = ctx.pipeline(),
            execution_id = %ctx.execution_id(),
            "Resilience observer panicked: {}",
            message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Tagging(&'static str);

    #[async_trait]
    impl Strategy<Vec<&'static str>> for Tagging {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn execute(
            &self,
            ctx: ResilienceContext,
            next: Next<'_, Vec<&'static str>>,
        ) -> Outcome<Vec<&'static str>> {
            match next.run(ctx).await {
                Outcome::Success(mut seen) => {
                    seen.push(self.0);
                    Outcome::Success(seen)
                }
                failure => failure,
            }
        }
    }

    #[tokio::test]
    async fn test_next_runs_strategies_outermost_first() {
        let strategies: Vec<Arc<dyn Strategy<Vec<&'static str>>>> =
            vec![Arc::new(Tagging("outer")), Arc::new(Tagging("inner"))];
        let raw = |_ctx: ResilienceContext| async { Ok(vec!["operation"]) };
        let operation = erase_operation(&raw);

        let next = Next::new(&strategies, &operation);
        assert_eq!(next.remaining(), 2);

        let outcome = next.run(ResilienceContext::default()).await;
        assert_eq!(outcome.result().unwrap(), &vec!["operation", "inner", "outer"]);
    }

    #[tokio::test]
    async fn test_operation_borrows_stack_state_across_runs() {
        let strategies: Vec<Arc<dyn Strategy<usize>>> = Vec::new();
        let calls = AtomicUsize::new(0);
        let raw = |_ctx: ResilienceContext| {
            let calls = &calls;
            async move { Ok(calls.fetch_add(1, Ordering::SeqCst) + 1) }
        };

        let seen = {
            let operation = erase_operation(&raw);
            let next = Next::new(&strategies, &operation);
            assert!(next.run(ResilienceContext::default()).await.is_success());
            next.run(ResilienceContext::default()).await
        };

        assert_eq!(seen.result().unwrap(), &2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_observer_panic_is_isolated() {
        let calls = AtomicUsize::new(0);
        notify_observer("on_retry", &ResilienceContext::default(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            panic!("observer blew up");
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
