//! Per-module resilience primitives
//!
//! Each wrapper is independent and a no-op when its options are absent. The
//! runtime nests them, outermost to innermost: error strategy, fallback,
//! rate limiter, concurrency limiter, circuit breaker, cache, retry,
//! timeout, and finally the module's own execute.

pub mod cache;
pub mod circuit_breaker;
pub mod concurrency;
pub mod error_strategy;
pub mod rate_limiter;
pub mod registry;
pub mod retry;

pub use cache::ModuleCache;
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitBreakerStats,
    CircuitState,
};
pub use concurrency::{ConcurrencyLimiter, ConcurrencyStats};
pub use error_strategy::{ErrorStrategy, ErrorStrategyExecutor, ModuleFailure, StrategyOutcome};
pub use rate_limiter::{RateLimit, RateLimiterStats, TokenBucketRateLimiter};
pub use registry::{LimiterRegistry, RateControlExecutor, RateControlOptions};
pub use retry::{retry_with_backoff, BackoffStrategy, RetryConfig};
