//! Circuit breaker - fault tolerance for module calls
//!
//! Per-module three-state breaker (Closed/Open/HalfOpen). Breakers live in a
//! process-wide registry keyed by module name, so two pipelines calling the
//! same module share breaker state.

use crate::error::{ConstellationError, ConstellationResult};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation
    Closed,
    /// Failing; calls are rejected without running
    Open,
    /// Testing recovery with a bounded number of probes
    HalfOpen,
}

/// Breaker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Open duration before the next call may probe
    pub reset_duration: Duration,
    /// Concurrent probes permitted while half-open
    pub half_open_requests: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_duration: Duration::from_secs(30),
            half_open_requests: 1,
        }
    }
}

struct BreakerCore {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open_in_flight: u32,
}

/// Point-in-time breaker snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_rejected: u64,
}

/// Three-state circuit breaker for one module name
pub struct CircuitBreaker {
    module_name: String,
    config: CircuitBreakerConfig,
    core: Mutex<BreakerCore>,
    total_successes: AtomicU64,
    total_failures: AtomicU64,
    total_rejected: AtomicU64,
}

/// Returns a half-open probe slot if the protected future is dropped before
/// the probe settles.
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut core = self.breaker.core.lock();
            if core.state == CircuitState::HalfOpen {
                core.half_open_in_flight = core.half_open_in_flight.saturating_sub(1);
            }
        }
    }
}

impl CircuitBreaker {
    pub fn new(module_name: &str, config: CircuitBreakerConfig) -> Self {
        Self {
            module_name: module_name.to_string(),
            config,
            core: Mutex::new(BreakerCore {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                half_open_in_flight: 0,
            }),
            total_successes: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            total_rejected: AtomicU64::new(0),
        }
    }

    /// Execute an operation under breaker protection.
    ///
    /// Open circuits reject immediately without running the operation; the
    /// Open -> HalfOpen transition happens lazily here once the reset
    /// duration has elapsed.
    pub async fn protect<F, Fut, T>(&self, operation: F) -> ConstellationResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ConstellationResult<T>>,
    {
        let probing = {
            let mut core = self.core.lock();
            match core.state {
                CircuitState::Closed => false,
                CircuitState::Open => {
                    let elapsed = core
                        .opened_at
                        .map(|at| at.elapsed())
                        .unwrap_or(Duration::ZERO);
                    if elapsed >= self.config.reset_duration {
                        core.state = CircuitState::HalfOpen;
                        core.half_open_in_flight = 1;
                        tracing::debug!(
                            module = %self.module_name,
                            "circuit breaker half-open, probing"
                        );
                        true
                    } else {
                        self.total_rejected.fetch_add(1, Ordering::Relaxed);
                        return Err(ConstellationError::CircuitOpen(self.module_name.clone()));
                    }
                }
                CircuitState::HalfOpen => {
                    if core.half_open_in_flight < self.config.half_open_requests {
                        core.half_open_in_flight += 1;
                        true
                    } else {
                        self.total_rejected.fetch_add(1, Ordering::Relaxed);
                        return Err(ConstellationError::CircuitOpen(self.module_name.clone()));
                    }
                }
            }
        };

        let mut guard = ProbeGuard {
            breaker: self,
            armed: probing,
        };
        let result = operation().await;
        guard.armed = false;

        let mut core = self.core.lock();
        if probing && core.state == CircuitState::HalfOpen {
            core.half_open_in_flight = core.half_open_in_flight.saturating_sub(1);
        }
        match &result {
            Ok(_) => {
                self.total_successes.fetch_add(1, Ordering::Relaxed);
                core.consecutive_failures = 0;
                if core.state == CircuitState::HalfOpen {
                    core.state = CircuitState::Closed;
                    core.opened_at = None;
                    core.half_open_in_flight = 0;
                    tracing::info!(module = %self.module_name, "circuit breaker closed");
                }
            }
            // Cancellation says nothing about module health.
            Err(err) if err.is_cancelled() => {}
            Err(_) => {
                self.total_failures.fetch_add(1, Ordering::Relaxed);
                match core.state {
                    CircuitState::Closed => {
                        core.consecutive_failures += 1;
                        if core.consecutive_failures >= self.config.failure_threshold {
                            core.state = CircuitState::Open;
                            core.opened_at = Some(Instant::now());
                            tracing::warn!(
                                module = %self.module_name,
                                failures = core.consecutive_failures,
                                "circuit breaker opened"
                            );
                        }
                    }
                    CircuitState::HalfOpen => {
                        core.state = CircuitState::Open;
                        core.opened_at = Some(Instant::now());
                        core.half_open_in_flight = 0;
                        tracing::warn!(
                            module = %self.module_name,
                            "circuit breaker reopened after failed probe"
                        );
                    }
                    CircuitState::Open => {}
                }
            }
        }
        drop(core);
        result
    }

    pub fn state(&self) -> CircuitState {
        self.core.lock().state
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let core = self.core.lock();
        CircuitBreakerStats {
            state: core.state,
            consecutive_failures: core.consecutive_failures,
            total_successes: self.total_successes.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_rejected: self.total_rejected.load(Ordering::Relaxed),
        }
    }

    /// Force the breaker closed and clear its counters
    pub fn reset(&self) {
        let mut core = self.core.lock();
        core.state = CircuitState::Closed;
        core.consecutive_failures = 0;
        core.opened_at = None;
        core.half_open_in_flight = 0;
    }
}

/// Process-wide registry of breakers keyed by module name
pub struct CircuitBreakerRegistry {
    default_config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            default_config,
            breakers: DashMap::new(),
        }
    }

    /// Existing breaker for the name, or a new one with the registry default.
    /// Concurrent creation under one name coalesces to a single instance.
    pub fn get_or_create(&self, module_name: &str) -> Arc<CircuitBreaker> {
        self.get_or_create_with(module_name, self.default_config.clone())
    }

    /// Like `get_or_create` with an explicit config for first registration
    pub fn get_or_create_with(
        &self,
        module_name: &str,
        config: CircuitBreakerConfig,
    ) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(module_name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(module_name, config)))
            .clone()
    }

    pub fn get(&self, module_name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(module_name).map(|entry| entry.clone())
    }

    pub fn remove(&self, module_name: &str) -> bool {
        self.breakers.remove(module_name).is_some()
    }

    pub fn clear(&self) {
        self.breakers.clear();
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
