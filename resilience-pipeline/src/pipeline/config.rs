//! Declarative pipeline configuration.

use super::PipelineBuilder;
use crate::errors::ResilienceError;
use crate::strategies::{BackoffKind, JitterStrategy, RetryOptions, TimeoutOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for a timeout strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl TimeoutConfig {
    /// Creates a timeout configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Converts to strategy options.
    #[must_use]
    pub fn to_options(&self) -> TimeoutOptions {
        TimeoutOptions::new(Duration::from_millis(self.timeout_ms))
    }
}

/// Configuration for a retry strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    /// Base delay in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    /// Optional cap for computed delays in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
    /// Backoff formula.
    #[serde(default)]
    pub backoff: BackoffKind,
    /// Jitter strategy.
    #[serde(default)]
    pub jitter: JitterStrategy,
}

fn default_max_retry_attempts() -> u32 {
    3
}

fn default_delay_ms() -> u64 {
    2_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: default_max_retry_attempts(),
            delay_ms: default_delay_ms(),
            max_delay_ms: None,
            backoff: BackoffKind::default(),
            jitter: JitterStrategy::default(),
        }
    }
}

impl RetryConfig {
    /// Creates a retry configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of retries.
    #[must_use]
    pub fn with_max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = Some(max_delay_ms);
        self
    }

    /// Sets the backoff formula.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffKind) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Converts to strategy options with the default predicate.
    #[must_use]
    pub fn to_options<T: 'static>(&self) -> RetryOptions<T> {
        let options = RetryOptions::new()
            .with_max_retry_attempts(self.max_retry_attempts)
            .with_delay(Duration::from_millis(self.delay_ms))
            .with_backoff(self.backoff)
            .with_jitter(self.jitter);

        match self.max_delay_ms {
            Some(cap) => options.with_max_delay(Duration::from_millis(cap)),
            None => options,
        }
    }
}

/// One strategy entry in a [`PipelineConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    /// A timeout strategy.
    Timeout(TimeoutConfig),
    /// A retry strategy.
    Retry(RetryConfig),
}

/// Declarative pipeline settings, strategies outermost first.
///
/// ```json
/// { "strategies": [
///     { "type": "retry", "max_retry_attempts": 3, "backoff": "exponential" },
///     { "type": "timeout", "timeout_ms": 2000 } ] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// The strategies, outermost first.
    #[serde(default)]
    pub strategies: Vec<StrategyConfig>,
}

impl PipelineConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a timeout strategy.
    #[must_use]
    pub fn with_timeout(mut self, config: TimeoutConfig) -> Self {
        self.strategies.push(StrategyConfig::Timeout(config));
        self
    }

    /// Appends a retry strategy.
    #[must_use]
    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.strategies.push(StrategyConfig::Retry(config));
        self
    }

    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns a configuration fault if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self, ResilienceError> {
        serde_json::from_str(json)
            .map_err(|e| ResilienceError::configuration(format!("invalid pipeline config: {e}")))
    }

    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns a configuration fault if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ResilienceError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ResilienceError::configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    /// Serializes the configuration to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns a configuration fault if serialization fails.
    pub fn to_json(&self) -> Result<String, ResilienceError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ResilienceError::configuration(e.to_string()))
    }

    /// Adds the configured strategies to a builder.
    pub fn apply<'b, T: Send + 'static>(
        &self,
        builder: &'b mut PipelineBuilder<T>,
    ) -> &'b mut PipelineBuilder<T> {
        for strategy in &self.strategies {
            match strategy {
                StrategyConfig::Timeout(config) => builder.add_timeout(config.to_options()),
                StrategyConfig::Retry(config) => builder.add_retry(config.to_options()),
            };
        }
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "strategies": [
            { "type": "retry", "max_retry_attempts": 5, "delay_ms": 100, "backoff": "exponential" },
            { "type": "timeout", "timeout_ms": 2000 }
        ]
    }"#;

    #[test]
    fn test_parse_json_with_defaults() {
        let config = PipelineConfig::from_json(SAMPLE).unwrap();

        assert_eq!(
            config,
            PipelineConfig::new()
                .with_retry(
                    RetryConfig::new()
                        .with_max_retry_attempts(5)
                        .with_delay_ms(100)
                        .with_backoff(BackoffKind::Exponential)
                )
                .with_timeout(TimeoutConfig::new().with_timeout_ms(2000))
        );
    }

    #[test]
    fn test_unknown_strategy_type_is_rejected() {
        let error = PipelineConfig::from_json(r#"{"strategies":[{"type":"hedging"}]}"#).unwrap_err();
        assert!(error.to_string().contains("invalid pipeline config"));
    }

    #[test]
    fn test_json_round_trip_preserves_order() {
        let config = PipelineConfig::from_json(SAMPLE).unwrap();
        let reparsed = PipelineConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(reparsed, config);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.strategies.len(), 2);

        assert!(PipelineConfig::from_file("/nonexistent/pipeline.json").is_err());
    }

    #[test]
    fn test_apply_builds_strategies_in_order() {
        let config = PipelineConfig::from_json(SAMPLE).unwrap();
        let mut builder = PipelineBuilder::<u32>::new();
        config.apply(&mut builder);

        let pipeline = builder.build().unwrap();
        assert_eq!(pipeline.strategy_names(), vec!["retry", "timeout"]);
    }

    #[test]
    fn test_retry_config_to_options() {
        let options = RetryConfig::new().with_max_delay_ms(500).to_options::<u32>();
        assert_eq!(options.max_retry_attempts, 3);
        assert_eq!(options.delay, Duration::from_secs(2));
        assert_eq!(options.max_delay, Some(Duration::from_millis(500)));
    }
}
