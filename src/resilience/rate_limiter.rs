//! Token-bucket rate limiting
//!
//! Continuous refill: available tokens accrue with elapsed time at
//! `count / per` and are capped at `count`. `acquire` waits for a token;
//! `try_acquire` never waits.

use crate::error::{ConstellationError, ConstellationResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// A rate expressed as `count` permits per `per` duration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimit {
    pub count: u32,
    pub per: Duration,
}

impl RateLimit {
    pub fn new(count: u32, per: Duration) -> ConstellationResult<Self> {
        if count == 0 {
            return Err(ConstellationError::Config(
                "rate limit count must be greater than zero".to_string(),
            ));
        }
        if per.is_zero() {
            return Err(ConstellationError::Config(
                "rate limit duration must be greater than zero".to_string(),
            ));
        }
        Ok(Self { count, per })
    }

    pub fn per_second(count: u32) -> ConstellationResult<Self> {
        Self::new(count, Duration::from_secs(1))
    }

    fn tokens_per_ms(&self) -> f64 {
        f64::from(self.count) / self.per.as_millis().max(1) as f64
    }
}

struct BucketCore {
    tokens: f64,
    last_refill: Instant,
}

/// Point-in-time limiter snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimiterStats {
    pub available_tokens: f64,
    pub max_tokens: f64,
    pub rate: RateLimit,
    pub fill_ratio: f64,
}

/// Continuous-refill token bucket
pub struct TokenBucketRateLimiter {
    rate: RateLimit,
    core: Mutex<BucketCore>,
}

impl TokenBucketRateLimiter {
    /// New bucket starting full
    pub fn new(rate: RateLimit) -> Self {
        Self::with_initial_tokens(rate, f64::from(rate.count))
    }

    /// New bucket with `initial` tokens, clamped to `[0, count]`
    pub fn with_initial_tokens(rate: RateLimit, initial: f64) -> Self {
        let max = f64::from(rate.count);
        Self {
            rate,
            core: Mutex::new(BucketCore {
                tokens: initial.clamp(0.0, max),
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, core: &mut BucketCore) {
        let elapsed_ms = core.last_refill.elapsed().as_secs_f64() * 1000.0;
        core.last_refill = Instant::now();
        let max = f64::from(self.rate.count);
        core.tokens = (core.tokens + elapsed_ms * self.rate.tokens_per_ms()).min(max);
    }

    /// Consume one token, waiting until one is available
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut core = self.core.lock();
                self.refill(&mut core);
                if core.tokens >= 1.0 {
                    core.tokens -= 1.0;
                    return;
                }
                let deficit = 1.0 - core.tokens;
                let wait_ms = deficit / self.rate.tokens_per_ms();
                Duration::from_secs_f64(wait_ms / 1000.0).max(Duration::from_millis(1))
            };
            sleep(wait).await;
        }
    }

    /// Consume one token only if immediately available
    pub fn try_acquire(&self) -> bool {
        let mut core = self.core.lock();
        self.refill(&mut core);
        if core.tokens >= 1.0 {
            core.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Acquire a token, then run the operation
    pub async fn with_rate_limit<F, Fut, T>(&self, operation: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.acquire().await;
        operation().await
    }

    /// Currently available tokens, after refill
    pub fn available_tokens(&self) -> f64 {
        let mut core = self.core.lock();
        self.refill(&mut core);
        core.tokens
    }

    pub fn stats(&self) -> RateLimiterStats {
        let available = self.available_tokens();
        let max = f64::from(self.rate.count);
        RateLimiterStats {
            available_tokens: available,
            max_tokens: max,
            rate: self.rate,
            fill_ratio: if max > 0.0 { available / max } else { 0.0 },
        }
    }

    pub fn rate(&self) -> RateLimit {
        self.rate
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_rates_rejected() {
        assert!(RateLimit::new(0, Duration::from_secs(1)).is_err());
        assert!(RateLimit::new(10, Duration::ZERO).is_err());
        assert!(RateLimit::new(10, Duration::from_secs(1)).is_ok());
    }

    #[tokio::test]
    async fn test_starts_full_and_acquires() {
        let limiter = TokenBucketRateLimiter::new(RateLimit::per_second(5).unwrap());
        for _ in 0..5 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());
    }

    #[tokio::test]
    async fn test_tokens_never_exceed_max() {
        let limiter = TokenBucketRateLimiter::new(RateLimit::per_second(3).unwrap());
        tokio::time::sleep(Duration::from_millis(50)).await;
        let available = limiter.available_tokens();
        assert!(available <= 3.0, "available {} over max", available);
        assert!(available >= 0.0);
    }

    #[tokio::test]
    async fn test_initial_tokens_clamped() {
        let rate = RateLimit::per_second(4).unwrap();
        let over = TokenBucketRateLimiter::with_initial_tokens(rate, 100.0);
        assert!(over.available_tokens() <= 4.0);
        let under = TokenBucketRateLimiter::with_initial_tokens(rate, -3.0);
        assert!(under.available_tokens() >= 0.0);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_refill() {
        let rate = RateLimit::new(10, Duration::from_millis(100)).unwrap();
        let limiter = TokenBucketRateLimiter::with_initial_tokens(rate, 0.0);
        let started = Instant::now();
        limiter.acquire().await;
        // One token accrues every 10ms at this rate.
        assert!(started.elapsed() >= Duration::from_millis(5));
    }

    #[tokio::test]
    async fn test_with_rate_limit_runs_operation() {
        let limiter = TokenBucketRateLimiter::new(RateLimit::per_second(2).unwrap());
        let result = limiter.with_rate_limit(|| async { 11 }).await;
        assert_eq!(result, 11);
    }

    #[tokio::test]
    async fn test_stats_fill_ratio() {
        let limiter = TokenBucketRateLimiter::new(RateLimit::per_second(4).unwrap());
        let stats = limiter.stats();
        assert_eq!(stats.max_tokens, 4.0);
        assert!(stats.fill_ratio > 0.9);
    }
}
