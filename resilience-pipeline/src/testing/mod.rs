//! Testing utilities for resilience pipelines.
//!
//! This module provides:
//! - Scripted operations with per-attempt outcomes
//! - Fake responses carrying headers
//! - Outcome assertions

mod assertions;
mod mocks;

pub use assertions::{assert_fault_kind, assert_operation_fault, assert_succeeded};
pub use mocks::{FakeResponse, PermanentFault, ScriptedOperation, TestFault};
