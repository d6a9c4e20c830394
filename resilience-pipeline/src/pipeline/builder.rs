//! Pipeline builder with validation.

use super::Pipeline;
use crate::errors::ResilienceError;
use crate::events::EventSink;
use crate::strategies::{RetryOptions, RetryStrategy, Strategy, TimeoutOptions, TimeoutStrategy};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Builder for creating validated pipelines.
///
/// Strategies run outermost-first in the order they are added:
///
/// ```rust,ignore
/// let pipeline = PipelineBuilder::<u32>::new()
///     .add_retry(RetryOptions::new())       // outer: retries timeouts
///     .add_timeout(Duration::from_secs(1))  // inner: bounds each attempt
///     .build()?;
/// ```
pub struct PipelineBuilder<T: Send + 'static> {
    /// The pipeline name.
    name: Arc<str>,
    /// The strategies, outermost first.
    strategies: Vec<Arc<dyn Strategy<T>>>,
    /// Overrides the process-wide event sink.
    event_sink: Option<Arc<dyn EventSink>>,
}

impl<T: Send + 'static> PipelineBuilder<T> {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: Arc::from("default"),
            strategies: Vec::new(),
            event_sink: None,
        }
    }

    /// Sets the pipeline name used in logs and events.
    pub fn with_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Arc::from(name.into());
        self
    }

    /// Sets the event sink for executions of the built pipeline.
    pub fn with_event_sink(&mut self, sink: Arc<dyn EventSink>) -> &mut Self {
        self.event_sink = Some(sink);
        self
    }

    /// Adds a timeout strategy.
    pub fn add_timeout(&mut self, options: impl Into<TimeoutOptions>) -> &mut Self {
        self.add_strategy(TimeoutStrategy::new(options.into()))
    }

    /// Adds a retry strategy.
    pub fn add_retry(&mut self, options: RetryOptions<T>) -> &mut Self {
        self.add_strategy(RetryStrategy::new(options))
    }

    /// Adds a custom strategy.
    pub fn add_strategy(&mut self, strategy: impl Strategy<T> + 'static) -> &mut Self {
        self.strategies.push(Arc::new(strategy));
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of strategies added so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Returns true if no strategies have been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Validates every strategy and freezes the pipeline.
    ///
    /// # Errors
    ///
    /// Returns a configuration fault naming the first invalid strategy.
    pub fn build(&self) -> Result<Pipeline<T>, ResilienceError> {
        for (index, strategy) in self.strategies.iter().enumerate() {
            strategy.validate().map_err(|e| {
                ResilienceError::configuration(format!(
                    "pipeline '{}' strategy #{index} ({}): {e}",
                    self.name,
                    strategy.name()
                ))
            })?;
        }

        debug!(
            pipeline = %self.name,
            strategies = self.strategies.len(),
            "Built resilience pipeline"
        );

        Ok(Pipeline::new(
            Arc::clone(&self.name),
            self.strategies.clone(),
            self.event_sink.clone(),
        ))
    }
}

impl<T: Send + 'static> Default for PipelineBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> fmt::Debug for PipelineBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("name", &self.name)
            .field("strategies", &self.strategies)
            .finish_non_exhaustive()
    }
}
