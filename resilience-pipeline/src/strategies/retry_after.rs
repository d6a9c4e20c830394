//! Retry delay hints carried by responses.

use crate::core::Outcome;
use crate::errors::ResilienceError;
use std::sync::Arc;
use std::time::Duration;

/// The standard HTTP header carrying a retry delay hint.
pub const RETRY_AFTER: &str = "Retry-After";

/// Read access to named headers of a response-like value.
pub trait HeaderLookup {
    /// Returns the first value of the header, if present and valid text.
    ///
    /// Header names are matched case-insensitively.
    fn header_value(&self, name: &str) -> Option<String>;
}

/// Extracts a delay hint from an outcome.
///
/// `None` means no hint is present. `Some(Err(_))` means a hint is present
/// but malformed, which fails the retry with that fault.
pub type RetryAfterExtractor<T> =
    Arc<dyn Fn(&Outcome<T>) -> Option<Result<Duration, ResilienceError>> + Send + Sync>;

/// Parses a retry-after value given as a non-negative integer of seconds.
///
/// # Errors
///
/// Returns a configuration fault if the value is not an integer.
pub fn parse_retry_after(value: &str) -> Result<Duration, ResilienceError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| {
            ResilienceError::configuration(format!(
                "invalid {RETRY_AFTER} value {value:?}: {e}"
            ))
        })
}

/// Reads the `Retry-After` header from successful responses.
#[must_use]
pub fn retry_after_header<T>() -> RetryAfterExtractor<T>
where
    T: HeaderLookup + 'static,
{
    Arc::new(|outcome| {
        let value = outcome.result()?.header_value(RETRY_AFTER)?;
        Some(parse_retry_after(&value))
    })
}
