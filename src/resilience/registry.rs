//! Name-keyed limiter directories
//!
//! First registration wins: once a name is registered, later calls return
//! the existing limiter and ignore the supplied configuration. Concurrent
//! creation under one name coalesces to a single instance.

use super::concurrency::ConcurrencyLimiter;
use super::rate_limiter::{RateLimit, TokenBucketRateLimiter};
use crate::error::ConstellationResult;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

/// Directory of rate and concurrency limiters shared by name
pub struct LimiterRegistry {
    rate_limiters: DashMap<String, Arc<TokenBucketRateLimiter>>,
    concurrency_limiters: DashMap<String, Arc<ConcurrencyLimiter>>,
}

impl LimiterRegistry {
    pub fn new() -> Self {
        Self {
            rate_limiters: DashMap::new(),
            concurrency_limiters: DashMap::new(),
        }
    }

    /// Existing limiter for the name, or a new one at the supplied rate.
    /// The rate is ignored when the name is already registered.
    pub fn get_rate_limiter(&self, name: &str, rate: RateLimit) -> Arc<TokenBucketRateLimiter> {
        if let Some(existing) = self.rate_limiters.get(name) {
            if existing.rate() != rate {
                tracing::debug!(
                    name,
                    "rate limiter already registered; supplied rate ignored"
                );
            }
            return existing.clone();
        }
        self.rate_limiters
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(TokenBucketRateLimiter::new(rate)))
            .clone()
    }

    /// Existing limiter for the name, or a new one with the supplied cap.
    /// The cap is ignored when the name is already registered.
    pub fn get_concurrency_limiter(
        &self,
        name: &str,
        max_concurrent: usize,
    ) -> ConstellationResult<Arc<ConcurrencyLimiter>> {
        if let Some(existing) = self.concurrency_limiters.get(name) {
            return Ok(existing.clone());
        }
        let created = Arc::new(ConcurrencyLimiter::new(max_concurrent)?);
        Ok(self
            .concurrency_limiters
            .entry(name.to_string())
            .or_insert(created)
            .clone())
    }

    pub fn has_rate_limiter(&self, name: &str) -> bool {
        self.rate_limiters.contains_key(name)
    }

    pub fn has_concurrency_limiter(&self, name: &str) -> bool {
        self.concurrency_limiters.contains_key(name)
    }

    pub fn list_rate_limiters(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .rate_limiters
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn list_concurrency_limiters(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .concurrency_limiters
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn remove_rate_limiter(&self, name: &str) -> bool {
        self.rate_limiters.remove(name).is_some()
    }

    pub fn remove_concurrency_limiter(&self, name: &str) -> bool {
        self.concurrency_limiters.remove(name).is_some()
    }

    pub fn clear(&self) {
        self.rate_limiters.clear();
        self.concurrency_limiters.clear();
    }
}

impl Default for LimiterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Optional throttle + concurrency cap applied around one operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RateControlOptions {
    pub throttle: Option<RateLimit>,
    pub concurrency: Option<usize>,
}

/// Applies rate control around operations using registry-shared limiters
pub struct RateControlExecutor;

impl RateControlExecutor {
    /// Run the operation under the named limiters: the throttle token is
    /// acquired first, then the concurrency permit, then the operation.
    /// Missing options mean no limiter is applied.
    pub async fn execute_with_rate_control<F, Fut, T>(
        operation: F,
        name: &str,
        options: &RateControlOptions,
        registry: &LimiterRegistry,
    ) -> ConstellationResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ConstellationResult<T>>,
    {
        if let Some(rate) = options.throttle {
            registry.get_rate_limiter(name, rate).acquire().await;
        }
        match options.concurrency {
            Some(max_concurrent) => {
                let limiter = registry.get_concurrency_limiter(name, max_concurrent)?;
                limiter.with_permit(operation).await
            }
            None => operation().await,
        }
    }
}
