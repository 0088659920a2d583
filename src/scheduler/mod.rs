//! Process-wide admission-control scheduling
//!
//! The bounded `PriorityScheduler` admits at most `max_concurrent` tasks to
//! user work at once and queues the rest in priority order with aging, so
//! low-priority waiters cannot starve. The `UnboundedScheduler` admits every
//! submission immediately; `SchedulerHandle` lets callers hold either.

mod priority;
mod unbounded;

pub use priority::{PriorityScheduler, SchedulerConfig};
pub use unbounded::UnboundedScheduler;

use crate::error::ConstellationResult;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

/// Well-known priority levels
pub mod priority_levels {
    pub const CRITICAL: u8 = 100;
    pub const HIGH: u8 = 75;
    pub const NORMAL: u8 = 50;
    pub const LOW: u8 = 25;
    pub const BACKGROUND: u8 = 0;
}

/// Completion counters bucketed by submitted priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityStats {
    /// Completions submitted at priority >= 75
    pub high_priority_completed: u64,
    /// Completions submitted at priority < 25
    pub low_priority_completed: u64,
    /// Queue entries whose effective priority was boosted by aging
    pub starvation_promotions: u64,
}

/// Point-in-time snapshot of scheduler counters and gauges
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub total_submitted: u64,
    /// Completions, including failed tasks
    pub total_completed: u64,
    pub queued_count: usize,
    pub active_count: usize,
    pub max_concurrent: usize,
    pub priority: PriorityStats,
}

/// Cheap-clone handle over either scheduler variant
#[derive(Clone)]
pub enum SchedulerHandle {
    Bounded(Arc<PriorityScheduler>),
    Unbounded(Arc<UnboundedScheduler>),
}

impl SchedulerHandle {
    /// Submit a task at the given priority (clamped to [0, 100])
    pub async fn submit<F, T>(&self, priority: i32, task: F) -> ConstellationResult<T>
    where
        F: Future<Output = ConstellationResult<T>> + Send,
        T: Send,
    {
        match self {
            SchedulerHandle::Bounded(scheduler) => scheduler.submit(priority, task).await,
            SchedulerHandle::Unbounded(scheduler) => scheduler.submit(priority, task).await,
        }
    }

    /// Submit at normal priority (50)
    pub async fn submit_normal<F, T>(&self, task: F) -> ConstellationResult<T>
    where
        F: Future<Output = ConstellationResult<T>> + Send,
        T: Send,
    {
        self.submit(priority_levels::NORMAL as i32, task).await
    }

    pub fn stats(&self) -> SchedulerStats {
        match self {
            SchedulerHandle::Bounded(scheduler) => scheduler.stats(),
            SchedulerHandle::Unbounded(scheduler) => scheduler.stats(),
        }
    }

    /// Idempotent; queued waiters wake with a shutdown error
    pub fn shutdown(&self) {
        match self {
            SchedulerHandle::Bounded(scheduler) => scheduler.shutdown(),
            SchedulerHandle::Unbounded(scheduler) => scheduler.shutdown(),
        }
    }
}
