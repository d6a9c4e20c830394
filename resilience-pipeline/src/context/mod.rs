//! Execution contexts.

mod execution;

pub use execution::ResilienceContext;
