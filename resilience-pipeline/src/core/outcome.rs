//! The result of a single attempt.

use crate::errors::{FaultKind, ResilienceError};

/// The outcome of one attempt at an operation.
///
/// An outcome is either a success carrying the operation's value or a
/// failure carrying the fault. A value that is semantically unsuccessful
/// (say, an HTTP 503 response) stays a `Success`; predicates decide whether
/// such a value is worth retrying.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    /// The operation produced a value.
    Success(T),
    /// The operation, or a strategy wrapping it, failed.
    Failure(ResilienceError),
}

impl<T> Outcome<T> {
    /// Creates a successful outcome.
    #[must_use]
    pub fn success(value: T) -> Self {
        Self::Success(value)
    }

    /// Creates a failed outcome.
    #[must_use]
    pub fn failure(error: ResilienceError) -> Self {
        Self::Failure(error)
    }

    /// Returns true if the outcome carries a value.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns true if the outcome carries a fault.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Returns the value, if any.
    #[must_use]
    pub fn result(&self) -> Option<&T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    /// Returns the fault, if any.
    #[must_use]
    pub fn error(&self) -> Option<&ResilienceError> {
        match self {
            Self::Success(_) => None,
            Self::Failure(error) => Some(error),
        }
    }

    /// Returns the fault classification for failures.
    #[must_use]
    pub fn fault_kind(&self) -> Option<FaultKind> {
        self.error().map(ResilienceError::kind)
    }

    /// Converts into a standard `Result`.
    pub fn into_result(self) -> Result<T, ResilienceError> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(error) => Err(error),
        }
    }

    /// Returns the status label used in event payloads.
    #[must_use]
    pub fn status(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Failure(error) => error.kind().as_str(),
        }
    }
}

impl<T> From<Result<T, ResilienceError>> for Outcome<T> {
    fn from(result: Result<T, ResilienceError>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(error) => Self::Failure(error),
        }
    }
}

impl<T> From<Outcome<T>> for Result<T, ResilienceError> {
    fn from(outcome: Outcome<T>) -> Self {
        outcome.into_result()
    }
}
