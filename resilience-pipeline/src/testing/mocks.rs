//! Scripted operations and fake responses for testing.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::context::ResilienceContext;
use crate::errors::ResilienceError;
use crate::strategies::HeaderLookup;

/// A transient failure used in tests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transient failure: {message}")]
pub struct TestFault {
    message: String,
}

impl TestFault {
    /// Creates a transient fault.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the fault message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A failure that predicates in tests never handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("permanent failure")]
pub struct PermanentFault;

/// An operation that answers each call with the next scripted result.
///
/// Once the script runs down to its last step, that step repeats forever.
/// Every call records the attempt number it saw in its context.
#[derive(Debug)]
pub struct ScriptedOperation<T> {
    script: Mutex<VecDeque<Result<T, ResilienceError>>>,
    latency: Option<Duration>,
    attempts: Mutex<Vec<u32>>,
}

impl<T: Clone + Send + 'static> ScriptedOperation<T> {
    /// Creates an operation from its script.
    pub fn new(script: impl IntoIterator<Item = Result<T, ResilienceError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            latency: None,
            attempts: Mutex::new(Vec::new()),
        }
    }

    /// Creates an operation that always succeeds with `value`.
    pub fn succeeding(value: T) -> Self {
        Self::new([Ok(value)])
    }

    /// Creates an operation that always fails with `error`.
    pub fn failing(error: ResilienceError) -> Self {
        Self::new([Err(error)])
    }

    /// Delays every answer by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Runs one attempt.
    pub fn call(
        &self,
        ctx: ResilienceContext,
    ) -> impl Future<Output = Result<T, ResilienceError>> + Send + 'static {
        self.attempts.lock().push(ctx.attempt());

        let step = {
            let mut script = self.script.lock();
            if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            }
        };
        let latency = self.latency;

        async move {
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            step.unwrap_or_else(|| Err(ResilienceError::configuration("empty operation script")))
        }
    }

    /// Returns the number of calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.attempts.lock().len()
    }

    /// Returns the attempt number seen by each call.
    #[must_use]
    pub fn attempts_seen(&self) -> Vec<u32> {
        self.attempts.lock().clone()
    }
}

/// A response-like value with a status code and headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeResponse {
    status: u16,
    headers: Vec<(String, String)>,
}

impl FakeResponse {
    /// Creates a response with no headers.
    #[must_use]
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns the status code.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }
}

impl HeaderLookup for FakeResponse {
    fn header_value(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone())
    }
}
