//! Error types for resilience pipelines.
//!
//! Every fault that travels through a pipeline is a [`ResilienceError`].
//! Strategies classify faults by their [`FaultKind`] when deciding whether
//! to retry, and registry lookups report [`RegistryError`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Type-erased error raised by a user operation.
pub type BoxError = Arc<dyn StdError + Send + Sync + 'static>;

/// The classification of a fault, used by predicates and telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// The operation exceeded its timeout.
    Timeout,
    /// The ambient context was cancelled.
    Cancelled,
    /// A strategy was misconfigured or a hint could not be parsed.
    Configuration,
    /// The operation raised its own error.
    Operation,
}

impl FaultKind {
    /// Returns the string form used in event payloads.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Configuration => "configuration",
            Self::Operation => "operation",
        }
    }
}

impl std::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The main error type for resilience pipeline execution.
#[derive(Debug, Clone, Error)]
pub enum ResilienceError {
    /// The operation did not complete within the configured timeout.
    #[error("The operation didn't complete within the allowed timeout of {}ms", .timeout.as_millis())]
    Timeout {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The ambient execution context was cancelled.
    #[error("Operation cancelled: {reason}")]
    Cancelled {
        /// Why the context was cancelled.
        reason: String,
    },

    /// A configuration problem, including unparseable retry-after hints.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The operation's own error, passed through unmodified.
    #[error(transparent)]
    Operation(BoxError),
}

impl ResilienceError {
    /// Wraps an operation error.
    pub fn operation<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Operation(Arc::new(error))
    }

    /// Creates a timeout fault.
    #[must_use]
    pub fn timeout(timeout: Duration) -> Self {
        Self::Timeout { timeout }
    }

    /// Creates a cancellation fault.
    #[must_use]
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    /// Creates a configuration fault.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Returns the fault classification.
    #[must_use]
    pub fn kind(&self) -> FaultKind {
        match self {
            Self::Timeout { .. } => FaultKind::Timeout,
            Self::Cancelled { .. } => FaultKind::Cancelled,
            Self::Configuration(_) => FaultKind::Configuration,
            Self::Operation(_) => FaultKind::Operation,
        }
    }

    /// Returns true for timeout faults.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns true for cancellation faults.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Downcasts an operation fault to its concrete error type.
    #[must_use]
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        match self {
            Self::Operation(source) => source.as_ref().downcast_ref::<E>(),
            _ => None,
        }
    }

    /// Converts to a dictionary representation for event payloads.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("kind".to_string(), serde_json::json!(self.kind().as_str()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));

        match self {
            Self::Timeout { timeout } => {
                map.insert(
                    "timeout_ms".to_string(),
                    serde_json::json!(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)),
                );
            }
            Self::Cancelled { reason } => {
                map.insert("reason".to_string(), serde_json::json!(reason));
            }
            Self::Configuration(_) | Self::Operation(_) => {}
        }

        map
    }
}

/// Errors raised by the pipeline registry.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// No factory was registered for the key.
    #[error("No resilience pipeline registered for '{name}' (result type {result_type})")]
    NotFound {
        /// The pipeline name.
        name: String,
        /// The expected result type.
        result_type: &'static str,
    },

    /// A factory was already registered for the key.
    #[error("A resilience pipeline is already registered for '{name}' (result type {result_type})")]
    AlreadyRegistered {
        /// The pipeline name.
        name: String,
        /// The result type.
        result_type: &'static str,
    },

    /// The registered factory produced an invalid pipeline.
    #[error("Failed to build resilience pipeline '{name}': {source}")]
    Build {
        /// The pipeline name.
        name: String,
        /// The validation error.
        #[source]
        source: ResilienceError,
    },
}

impl RegistryError {
    /// Creates a not found error.
    #[must_use]
    pub fn not_found(name: impl Into<String>, result_type: &'static str) -> Self {
        Self::NotFound {
            name: name.into(),
            result_type,
        }
    }

    /// Creates an already registered error.
    #[must_use]
    pub fn already_registered(name: impl Into<String>, result_type: &'static str) -> Self {
        Self::AlreadyRegistered {
            name: name.into(),
            result_type,
        }
    }
}

impl From<RegistryError> for ResilienceError {
    fn from(err: RegistryError) -> Self {
        Self::Configuration(err.to_string())
    }
}
