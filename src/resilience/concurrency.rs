//! Concurrency limiting with statistics
//!
//! A counting semaphore wrapped with gauges: current active, peak active,
//! total executions, and current waiters. `with_permit` releases on every
//! exit path, including cancellation.

use crate::error::{ConstellationError, ConstellationResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Point-in-time limiter snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencyStats {
    pub max_concurrent: usize,
    pub current_active: usize,
    pub peak_active: usize,
    pub total_executions: u64,
    pub current_waiting: usize,
    pub available_permits: usize,
}

/// Counting semaphore with statistics
pub struct ConcurrencyLimiter {
    max_concurrent: usize,
    semaphore: Arc<Semaphore>,
    current_active: AtomicUsize,
    peak_active: AtomicUsize,
    total_executions: AtomicU64,
    current_waiting: AtomicUsize,
}

struct WaitGuard<'a>(&'a AtomicUsize);

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

impl ConcurrencyLimiter {
    /// `max_concurrent` must be greater than zero
    pub fn new(max_concurrent: usize) -> ConstellationResult<Self> {
        if max_concurrent == 0 {
            return Err(ConstellationError::Config(
                "concurrency limiter max_concurrent must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            max_concurrent,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            current_active: AtomicUsize::new(0),
            peak_active: AtomicUsize::new(0),
            total_executions: AtomicU64::new(0),
            current_waiting: AtomicUsize::new(0),
        })
    }

    /// Take a permit, waiting until one is available
    pub async fn acquire(&self) -> ConstellationResult<()> {
        self.current_waiting.fetch_add(1, Ordering::Relaxed);
        let wait = WaitGuard(&self.current_waiting);
        let permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| ConstellationError::Internal("semaphore closed".to_string()))?;
        permit.forget();
        drop(wait);
        let active = self.current_active.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_active.fetch_max(active, Ordering::Relaxed);
        self.total_executions.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Take a permit only if immediately available
    pub fn try_acquire(&self) -> bool {
        match self.semaphore.try_acquire() {
            Ok(permit) => {
                permit.forget();
                let active = self.current_active.fetch_add(1, Ordering::Relaxed) + 1;
                self.peak_active.fetch_max(active, Ordering::Relaxed);
                self.total_executions.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => false,
        }
    }

    /// Return a permit taken with `acquire` or `try_acquire`
    pub fn release(&self) {
        let _ = self
            .current_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |active| {
                active.checked_sub(1)
            });
        self.semaphore.add_permits(1);
    }

    /// Acquire, run the operation, release on every exit path
    pub async fn with_permit<F, Fut, T>(&self, operation: F) -> ConstellationResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ConstellationResult<T>>,
    {
        self.acquire().await?;
        struct ReleaseGuard<'a>(&'a ConcurrencyLimiter);
        impl Drop for ReleaseGuard<'_> {
            fn drop(&mut self) {
                self.0.release();
            }
        }
        let _release = ReleaseGuard(self);
        operation().await
    }

    pub fn stats(&self) -> ConcurrencyStats {
        ConcurrencyStats {
            max_concurrent: self.max_concurrent,
            current_active: self.current_active.load(Ordering::Relaxed),
            peak_active: self.peak_active.load(Ordering::Relaxed),
            total_executions: self.total_executions.load(Ordering::Relaxed),
            current_waiting: self.current_waiting.load(Ordering::Relaxed),
            available_permits: self.semaphore.available_permits(),
        }
    }

    /// Clear peak and total; active and waiting gauges are untouched
    pub fn reset_stats(&self) {
        self.peak_active
            .store(self.current_active.load(Ordering::Relaxed), Ordering::Relaxed);
        self.total_executions.store(0, Ordering::Relaxed);
    }
}
