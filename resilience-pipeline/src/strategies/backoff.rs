//! Backoff formulas, jitter and custom delay generators for retries.

use crate::context::ResilienceContext;
use crate::core::Outcome;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// How the retry delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// delay = base
    #[default]
    Constant,
    /// delay = base * (attempt + 1)
    Linear,
    /// delay = base * 2^(attempt + 1)
    Exponential,
}

impl BackoffKind {
    /// Calculates the delay before the retry that follows `attempt` (0-indexed).
    #[must_use]
    pub fn delay(self, base: Duration, attempt: u32) -> Duration {
        match self {
            Self::Constant => base,
            Self::Linear => base.saturating_mul(attempt.saturating_add(1)),
            Self::Exponential => {
                base.saturating_mul(2u32.saturating_pow(attempt.saturating_add(1)))
            }
        }
    }
}

/// Jitter strategy to prevent thundering herd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    #[default]
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    Equal,
}

impl JitterStrategy {
    /// Applies jitter to a delay.
    #[must_use]
    pub fn apply(self, delay: Duration) -> Duration {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);

        match self {
            Self::None => delay,
            Self::Full => {
                if millis == 0 {
                    delay
                } else {
                    Duration::from_millis(rand::thread_rng().gen_range(0..=millis))
                }
            }
            Self::Equal => {
                let half = millis / 2;
                if half == 0 {
                    delay
                } else {
                    Duration::from_millis(half + rand::thread_rng().gen_range(0..=half))
                }
            }
        }
    }
}

/// Arguments handed to a custom delay generator.
#[derive(Debug)]
pub struct DelayGeneratorArguments<'a, T> {
    /// The attempt that just failed (0-indexed).
    pub attempt: u32,
    /// The outcome of that attempt.
    pub outcome: &'a Outcome<T>,
    /// The execution context.
    pub context: &'a ResilienceContext,
}

/// Computes a retry delay; `None` falls back to the backoff formula.
pub type DelayGenerator<T> =
    Arc<dyn Fn(&DelayGeneratorArguments<'_, T>) -> Option<Duration> + Send + Sync>;

/// A delay generator that waits `2^(attempt + 1)` seconds: 2s, 4s, 8s, ...
///
/// The base delay configured on the strategy is ignored.
#[must_use]
pub fn exponential_seconds<T>(args: &DelayGeneratorArguments<'_, T>) -> Option<Duration> {
    Some(Duration::from_secs(
        2u64.saturating_pow(args.attempt.saturating_add(1)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_default() {
        assert_eq!(BackoffKind::default(), BackoffKind::Constant);
        assert_eq!(JitterStrategy::default(), JitterStrategy::None);
    }

    #[test]
    fn test_constant_backoff() {
        let base = Duration::from_millis(100);
        assert_eq!(BackoffKind::Constant.delay(base, 0), base);
        assert_eq!(BackoffKind::Constant.delay(base, 5), base);
    }

    #[test]
    fn test_linear_backoff() {
        let base = Duration::from_millis(100);
        assert_eq!(BackoffKind::Linear.delay(base, 0), Duration::from_millis(100));
        assert_eq!(BackoffKind::Linear.delay(base, 2), Duration::from_millis(300));
    }

    #[test]
    fn test_exponential_backoff() {
        let base = Duration::from_secs(1);
        assert_eq!(BackoffKind::Exponential.delay(base, 0), Duration::from_secs(2));
        assert_eq!(BackoffKind::Exponential.delay(base, 1), Duration::from_secs(4));
        assert_eq!(BackoffKind::Exponential.delay(base, 2), Duration::from_secs(8));
    }

    #[test]
    fn test_exponential_backoff_saturates() {
        let delay = BackoffKind::Exponential.delay(Duration::from_secs(1), 200);
        assert!(delay >= Duration::from_secs(u64::from(u32::MAX)));
    }

    #[test]
    fn test_no_jitter() {
        let delay = Duration::from_secs(10);
        assert_eq!(JitterStrategy::None.apply(delay), delay);
    }

    #[test]
    fn test_jitter_bounds() {
        let delay = Duration::from_millis(100);
        for _ in 0..100 {
            assert!(JitterStrategy::Full.apply(delay) <= delay);
            let equal = JitterStrategy::Equal.apply(delay);
            assert!(equal >= Duration::from_millis(50) && equal <= delay);
        }
    }

    #[test]
    fn test_exponential_seconds_generator() {
        let outcome = Outcome::Success(());
        let context = ResilienceContext::default();

        let delays: Vec<_> = (0..3)
            .map(|attempt| {
                exponential_seconds(&DelayGeneratorArguments {
                    attempt,
                    outcome: &outcome,
                    context: &context,
                })
            })
            .collect();

        assert_eq!(
            delays,
            vec![
                Some(Duration::from_secs(2)),
                Some(Duration::from_secs(4)),
                Some(Duration::from_secs(8)),
            ]
        );
    }
}
