//! reqwest transport and HTTP-specific predicates.

use super::{DelegatingExecutor, Transport};
use crate::context::ResilienceContext;
use crate::errors::ResilienceError;
use crate::strategies::{HeaderLookup, PredicateBuilder};
use async_trait::async_trait;
use reqwest::{Client, Request, Response, StatusCode};
use tracing::debug;

/// A [`Transport`] backed by a `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Creates a transport using the given client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Returns the underlying client.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    type Request = Request;
    type Response = Response;

    async fn send(&self, request: &Request, ctx: &ResilienceContext) -> Result<Response, ResilienceError> {
        let request = request.try_clone().ok_or_else(|| {
            ResilienceError::configuration("request body is a stream and cannot be resent")
        })?;

        debug!(
            method = %request.method(),
            url = %request.url(),
            attempt = ctx.attempt(),
            execution_id = %ctx.execution_id(),
            "Sending HTTP request"
        );

        tokio::select! {
            biased;
            () = ctx.cancelled() => Err(ctx.cancelled_error()),
            response = self.client.execute(request) => response.map_err(ResilienceError::operation),
        }
    }
}

impl HeaderLookup for Response {
    fn header_value(&self, name: &str) -> Option<String> {
        self.headers()
            .get(name)?
            .to_str()
            .ok()
            .map(str::to_string)
    }
}

/// Returns true for 408, 429 and every 5xx status.
#[must_use]
pub fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

/// Handles transport errors and transient HTTP statuses.
#[must_use]
pub fn transient_http_errors() -> PredicateBuilder<Response> {
    PredicateBuilder::new()
        .handle::<reqwest::Error>()
        .handle_result(|response: &Response| is_transient_status(response.status()))
}

impl DelegatingExecutor<ReqwestTransport> {
    /// Sends a GET request through the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an operation fault for an invalid URL, otherwise the
    /// pipeline's final fault.
    pub async fn get(&self, url: &str) -> Result<Response, ResilienceError> {
        let request = self
            .inner()
            .client()
            .get(url)
            .build()
            .map_err(ResilienceError::operation)?;
        self.send_request(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_statuses() {
        for code in [408, 429, 500, 502, 503, 504] {
            assert!(is_transient_status(StatusCode::from_u16(code).unwrap()), "{code}");
        }
        for code in [200, 301, 400, 401, 404] {
            assert!(!is_transient_status(StatusCode::from_u16(code).unwrap()), "{code}");
        }
    }
}
