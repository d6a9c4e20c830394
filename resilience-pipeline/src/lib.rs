//! # Resilience Pipeline
//!
//! Composable fault-tolerance for async operations.
//!
//! A pipeline wraps any unit of work with an ordered chain of strategies:
//!
//! - **Timeout**: bounds execution time and cancels the operation when it elapses
//! - **Retry**: re-runs handled outcomes with constant, linear or exponential backoff,
//!   custom delay generators and `Retry-After` overrides
//! - **Registry**: builds named pipelines once, per result type, on first use
//! - **Delegating executor**: routes outbound calls through a named pipeline
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use resilience_pipeline::prelude::*;
//! use std::time::Duration;
//!
//! let pipeline = PipelineBuilder::<u32>::new()
//!     .add_retry(
//!         RetryOptions::new()
//!             .with_max_retry_attempts(3)
//!             .with_delay_generator(exponential_seconds),
//!     )
//!     .add_timeout(Duration::from_secs(5))
//!     .build()?;
//!
//! let value = pipeline.execute(|ctx| async move { fetch(ctx).await }).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod context;
pub mod core;
pub mod delegating;
pub mod errors;
pub mod events;
pub mod pipeline;
pub mod registry;
pub mod strategies;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::context::ResilienceContext;
    pub use crate::core::Outcome;
    pub use crate::delegating::{DelegatingExecutor, Transport};
    pub use crate::errors::{FaultKind, RegistryError, ResilienceError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::{Pipeline, PipelineBuilder, PipelineConfig, RetryConfig, TimeoutConfig};
    pub use crate::registry::{BuildContext, PipelineRegistry};
    pub use crate::strategies::{
        exponential_seconds, BackoffKind, HeaderLookup, JitterStrategy, PredicateBuilder,
        RetryOptions, ShouldHandle, Strategy, TimeoutOptions,
    };

    #[cfg(feature = "http")]
    pub use crate::delegating::{transient_http_errors, ReqwestTransport};
}
