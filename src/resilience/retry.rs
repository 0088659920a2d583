//! Retry logic with configurable backoff

use crate::error::{ConstellationError, ConstellationResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// How the delay between attempts grows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// Same delay between every attempt
    Fixed,
    /// Delay grows linearly with the attempt number
    Linear,
    /// Delay doubles each attempt
    #[default]
    Exponential,
}

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Extra attempts after the first failure
    pub max_retries: u32,
    /// Base delay before the first retry
    pub initial_delay: Duration,
    /// Cap on the computed delay
    pub max_delay: Duration,
    pub backoff: BackoffStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff: BackoffStrategy::Exponential,
        }
    }
}

impl RetryConfig {
    /// Delay before the retry following attempt number `attempt` (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = match self.backoff {
            BackoffStrategy::Fixed => self.initial_delay,
            BackoffStrategy::Linear => self
                .initial_delay
                .saturating_mul(attempt.saturating_add(1)),
            BackoffStrategy::Exponential => self
                .initial_delay
                .saturating_mul(1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX)),
        };
        base.min(self.max_delay)
    }
}

/// Run `f` with up to `max_retries + 1` attempts.
///
/// Only transient errors are retried: circuit-open, cancellation, and
/// timeouts would fail the same way again.
pub async fn retry_with_backoff<F, Fut, T>(
    config: &RetryConfig,
    mut f: F,
) -> ConstellationResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ConstellationResult<T>>,
{
    let mut last_error: Option<ConstellationError> = None;
    for attempt in 0..=config.max_retries {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let retriable = err.is_transient();
                last_error = Some(err);
                if attempt < config.max_retries && retriable {
                    let delay = config.delay_for_attempt(attempt);
                    tracing::debug!(attempt, ?delay, "retrying after transient failure");
                    sleep(delay).await;
                } else {
                    break;
                }
            }
        }
    }
    Err(last_error.unwrap_or_else(|| {
        ConstellationError::Internal("retry loop settled without an outcome".to_string())
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn transient() -> ConstellationError {
        ConstellationError::ModuleExecution {
            module: "m".to_string(),
            message: "flaky".to_string(),
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_after_transient_failure() {
        let config = RetryConfig {
            initial_delay: Duration::from_millis(1),
            ..Default::default()
        };
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let result = retry_with_backoff(&config, move || {
            let attempts = attempts_clone.clone();
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transient())
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_returns_last_error() {
        let config = RetryConfig {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            ..Default::default()
        };
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let result: ConstellationResult<u32> = retry_with_backoff(&config, move || {
            let attempts = attempts_clone.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(transient())
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_errors_not_retried() {
        let config = RetryConfig::default();
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let result: ConstellationResult<u32> = retry_with_backoff(&config, move || {
            let attempts = attempts_clone.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(ConstellationError::CircuitOpen("m".to_string()))
            }
        })
        .await;
        assert!(matches!(result, Err(ConstellationError::CircuitOpen(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_progressions() {
        let base = RetryConfig {
            max_retries: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff: BackoffStrategy::Fixed,
        };
        assert_eq!(base.delay_for_attempt(3), Duration::from_millis(100));

        let linear = RetryConfig {
            backoff: BackoffStrategy::Linear,
            ..base.clone()
        };
        assert_eq!(linear.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(linear.delay_for_attempt(2), Duration::from_millis(300));

        let exponential = RetryConfig {
            backoff: BackoffStrategy::Exponential,
            ..base
        };
        assert_eq!(exponential.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(exponential.delay_for_attempt(3), Duration::from_millis(800));
        // Capped at max_delay.
        assert_eq!(exponential.delay_for_attempt(20), Duration::from_secs(30));
    }
}
