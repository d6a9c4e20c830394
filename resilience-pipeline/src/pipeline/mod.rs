//! Pipeline building and execution.
//!
//! This module provides:
//! - The pipeline builder with validation
//! - The immutable, shareable pipeline and its execute entry points
//! - Declarative, serde-loadable pipeline configuration

mod builder;
mod config;
mod executor;

pub use builder::PipelineBuilder;
pub use config::{PipelineConfig, RetryConfig, StrategyConfig, TimeoutConfig};
pub use executor::Pipeline;
