//! Constellation engine: a demand-driven dataflow runtime
//!
//! This crate executes compiled pipelines (directed acyclic graphs of typed
//! modules connected through data nodes) and provides:
//! - Demand-driven evaluation over memoized lazy cells, so only the modules
//!   a declared output needs are ever fired
//! - A bounded priority scheduler with aging-based starvation prevention
//! - A per-module resilience stack: retry, timeout, cache, fallback,
//!   circuit breaker, token-bucket rate limiting, concurrency limiting, and
//!   error strategies
//! - Cancellable executions with cooperative cancellation at every
//!   suspension point
//! - Process-level lifecycle control with drain-and-force-cancel shutdown
//! - Execution tracing with bounded retention and value truncation

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod dag;
pub mod error;
pub mod lazy;
pub mod lifecycle;
pub mod module;
pub mod resilience;
pub mod runtime;
pub mod scheduler;
pub mod tracker;
pub mod value;

pub use dag::{DagMetadata, DagSpec, DagSpecBuilder, DataId, DataNodeSpec, ModuleId, ModuleNodeSpec};
pub use error::{ConstellationError, ConstellationResult};
pub use lazy::LazyCell;
pub use lifecycle::{ConstellationLifecycle, LifecycleState};
pub use module::{
    FnModule, Module, ModuleCallOptions, ModuleOutcome, ModuleSpec, ModuleStatus,
};
pub use resilience::{
    BackoffStrategy, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry,
    CircuitBreakerStats, CircuitState, ConcurrencyLimiter, ConcurrencyStats, ErrorStrategy,
    ErrorStrategyExecutor, LimiterRegistry, ModuleCache, ModuleFailure, RateControlExecutor,
    RateControlOptions, RateLimit, RateLimiterStats, RetryConfig, StrategyOutcome,
    TokenBucketRateLimiter,
};
pub use runtime::{
    Backends, CancelToken, CancellableExecution, ChannelListener, Constellation,
    ConstellationConfig, ExecutionEvent, ExecutionId, ExecutionListener, ExecutionStatus,
    RunState, TracingListener,
};
pub use scheduler::{
    priority_levels, PriorityScheduler, PriorityStats, SchedulerConfig, SchedulerHandle,
    SchedulerStats, UnboundedScheduler,
};
pub use tracker::{
    ExecutionTrace, ExecutionTracker, NodeResult, NodeStatus, TrackerConfig,
};
pub use value::{has_zero_value, zero_value, Type, Value};
