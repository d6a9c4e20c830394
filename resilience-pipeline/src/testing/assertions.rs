//! Test assertions for outcomes.

use crate::core::Outcome;
use crate::errors::FaultKind;
use std::error::Error as StdError;
use std::fmt::Debug;

/// Asserts that an outcome succeeded.
pub fn assert_succeeded<T: Debug>(outcome: &Outcome<T>) {
    assert!(
        outcome.is_success(),
        "Expected success, got {outcome:?}"
    );
}

/// Asserts that an outcome failed with a fault of the given kind.
pub fn assert_fault_kind<T: Debug>(outcome: &Outcome<T>, expected: FaultKind) {
    assert_eq!(
        outcome.fault_kind(),
        Some(expected),
        "Expected {expected} fault, got {outcome:?}"
    );
}

/// Asserts that an outcome failed with an operation error of type `E`.
pub fn assert_operation_fault<T: Debug, E: StdError + 'static>(outcome: &Outcome<T>) -> &E {
    match outcome.error().and_then(|e| e.downcast_ref::<E>()) {
        Some(error) => error,
        None => panic!(
            "Expected operation fault of type {}, got {outcome:?}",
            std::any::type_name::<E>()
        ),
    }
}
