//! Predicates that classify outcomes as worth handling.

use crate::core::Outcome;
use crate::errors::{FaultKind, ResilienceError};
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

type ErrorPredicate = Arc<dyn Fn(&ResilienceError) -> bool + Send + Sync>;
type ResultPredicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

enum Matcher<T> {
    ByFaultKind(FaultKind),
    ByError(ErrorPredicate),
    ByResult(ResultPredicate<T>),
}

impl<T> Matcher<T> {
    fn matches(&self, outcome: &Outcome<T>) -> bool {
        match (self, outcome) {
            (Self::ByFaultKind(kind), Outcome::Failure(error)) => error.kind() == *kind,
            (Self::ByError(predicate), Outcome::Failure(error)) => predicate(error),
            (Self::ByResult(predicate), Outcome::Success(value)) => predicate(value),
            _ => false,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::ByFaultKind(kind) => format!("fault:{kind}"),
            Self::ByError(_) => "error".to_string(),
            Self::ByResult(_) => "result".to_string(),
        }
    }
}

/// Builds an OR-combination of outcome matchers.
///
/// Matchers are evaluated in registration order and the first match wins.
/// A builder with no matchers handles nothing.
///
/// ```rust,ignore
/// let predicate = PredicateBuilder::<Response>::new()
///     .handle::<reqwest::Error>()
///     .handle_result(|r| r.status().is_server_error());
/// ```
pub struct PredicateBuilder<T> {
    matchers: Vec<Matcher<T>>,
}

impl<T: 'static> PredicateBuilder<T> {
    /// Creates an empty predicate.
    #[must_use]
    pub fn new() -> Self {
        Self {
            matchers: Vec::new(),
        }
    }

    /// Handles every fault of the given kind.
    #[must_use]
    pub fn handle_kind(mut self, kind: FaultKind) -> Self {
        self.matchers.push(Matcher::ByFaultKind(kind));
        self
    }

    /// Handles operation faults whose source error is an `E`.
    #[must_use]
    pub fn handle<E>(self) -> Self
    where
        E: StdError + 'static,
    {
        self.handle_where::<E, _>(|_| true)
    }

    /// Handles operation faults whose source error is an `E` matching `predicate`.
    #[must_use]
    pub fn handle_where<E, F>(mut self, predicate: F) -> Self
    where
        E: StdError + 'static,
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.matchers.push(Matcher::ByError(Arc::new(move |error| {
            error.downcast_ref::<E>().is_some_and(&predicate)
        })));
        self
    }

    /// Handles any fault accepted by `predicate`.
    #[must_use]
    pub fn handle_error<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ResilienceError) -> bool + Send + Sync + 'static,
    {
        self.matchers.push(Matcher::ByError(Arc::new(predicate)));
        self
    }

    /// Handles successful values accepted by `predicate`.
    #[must_use]
    pub fn handle_result<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.matchers.push(Matcher::ByResult(Arc::new(predicate)));
        self
    }

    /// Returns true if any matcher accepts the outcome.
    #[must_use]
    pub fn matches(&self, outcome: &Outcome<T>) -> bool {
        self.matchers.iter().any(|m| m.matches(outcome))
    }

    /// Returns the number of registered matchers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    /// Returns true if no matchers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    /// Freezes the builder into a shareable predicate.
    #[must_use]
    pub fn build(self) -> ShouldHandle<T> {
        ShouldHandle::from_fn(move |outcome| self.matches(outcome))
    }
}

impl<T: 'static> Default for PredicateBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for PredicateBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.matchers.iter().map(Matcher::describe))
            .finish()
    }
}

/// A frozen outcome predicate.
pub struct ShouldHandle<T> {
    predicate: Arc<dyn Fn(&Outcome<T>) -> bool + Send + Sync>,
}

impl<T: 'static> ShouldHandle<T> {
    /// Wraps a plain closure.
    pub fn from_fn<F>(predicate: F) -> Self
    where
        F: Fn(&Outcome<T>) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// Handles every failure except cancellation.
    #[must_use]
    pub fn any_fault_except_cancellation() -> Self {
        Self::from_fn(|outcome| {
            outcome
                .error()
                .is_some_and(|error| error.kind() != FaultKind::Cancelled)
        })
    }

    /// Returns true if the outcome should be handled.
    #[must_use]
    pub fn matches(&self, outcome: &Outcome<T>) -> bool {
        (self.predicate)(outcome)
    }
}

impl<T: 'static> Default for ShouldHandle<T> {
    fn default() -> Self {
        Self::any_fault_except_cancellation()
    }
}

impl<T> Clone for ShouldHandle<T> {
    fn clone(&self) -> Self {
        Self {
            predicate: Arc::clone(&self.predicate),
        }
    }
}

impl<T> fmt::Debug for ShouldHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShouldHandle").finish_non_exhaustive()
    }
}

impl<T: 'static> From<PredicateBuilder<T>> for ShouldHandle<T> {
    fn from(builder: PredicateBuilder<T>) -> Self {
        builder.build()
    }
}
