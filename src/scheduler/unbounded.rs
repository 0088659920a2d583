//! Unbounded scheduler variant
//!
//! Admits every submission immediately and reports zeroed stats. Useful in
//! tests and when no process-wide coordination is wanted.

use super::SchedulerStats;
use crate::error::ConstellationResult;
use std::future::Future;
use std::sync::Arc;

/// Scheduler that never queues
pub struct UnboundedScheduler;

impl UnboundedScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }

    /// Run the task immediately; the priority is ignored
    pub async fn submit<F, T>(&self, _priority: i32, task: F) -> ConstellationResult<T>
    where
        F: Future<Output = ConstellationResult<T>> + Send,
        T: Send,
    {
        task.await
    }

    pub async fn submit_normal<F, T>(&self, task: F) -> ConstellationResult<T>
    where
        F: Future<Output = ConstellationResult<T>> + Send,
        T: Send,
    {
        task.await
    }

    /// Always zeroed; this variant keeps no counters
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats::default()
    }

    pub fn shutdown(&self) {}
}
