//! Bounded priority scheduler with starvation prevention
//!
//! Admission control, not execution: at most `max_concurrent` submitted
//! tasks run user work at once, the rest wait on oneshot gates ordered by
//! effective priority (ties broken FIFO by sequence id). A background aging
//! task boosts long waiters so low-priority work cannot starve.

use super::{PriorityStats, SchedulerStats};
use crate::error::{ConstellationError, ConstellationResult};
use parking_lot::Mutex;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Scheduler construction parameters
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum tasks admitted to run concurrently
    pub max_concurrent: usize,
    /// Queue capacity; 0 means unlimited
    pub max_queue_size: usize,
    /// How often the aging pass runs
    pub aging_interval: Duration,
    /// Wait time after which an entry becomes eligible for boosting
    pub starvation_timeout: Duration,
    /// Priority points added per second waited, once eligible
    pub boost_per_second: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 16,
            max_queue_size: 0,
            aging_interval: Duration::from_secs(5),
            starvation_timeout: Duration::from_secs(30),
            boost_per_second: 10,
        }
    }
}

struct QueueEntry {
    sequence_id: u64,
    submitted_priority: u8,
    submitted_at: Instant,
    effective_priority: u8,
    gate: oneshot::Sender<ConstellationResult<()>>,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.effective_priority == other.effective_priority
            && self.sequence_id == other.sequence_id
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Max-heap: higher effective priority first, then lower sequence id.
        self.effective_priority
            .cmp(&other.effective_priority)
            .then(other.sequence_id.cmp(&self.sequence_id))
    }
}

struct SchedulerCore {
    queue: BinaryHeap<QueueEntry>,
    active: usize,
    next_sequence: u64,
    shutdown: bool,
}

/// Bounded priority scheduler
pub struct PriorityScheduler {
    config: SchedulerConfig,
    core: Mutex<SchedulerCore>,
    total_submitted: AtomicU64,
    total_completed: AtomicU64,
    high_priority_completed: AtomicU64,
    low_priority_completed: AtomicU64,
    starvation_promotions: AtomicU64,
    aging_task: Mutex<Option<JoinHandle<()>>>,
}

/// Frees the admitted slot when a task settles, handing it to the best
/// queued waiter. Runs on drop so a caller abandoning the submit future
/// mid-task still releases the slot.
struct SlotGuard<'a> {
    scheduler: &'a PriorityScheduler,
    submitted_priority: u8,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.scheduler.release_slot();
        self.scheduler.total_completed.fetch_add(1, Ordering::Relaxed);
        if self.submitted_priority >= 75 {
            self.scheduler
                .high_priority_completed
                .fetch_add(1, Ordering::Relaxed);
        } else if self.submitted_priority < 25 {
            self.scheduler
                .low_priority_completed
                .fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Covers the window between enqueueing and admission: if the submitter is
/// dropped while waiting and its gate already fired, the granted slot is
/// returned.
struct GateGuard<'a> {
    scheduler: &'a PriorityScheduler,
    gate: Option<oneshot::Receiver<ConstellationResult<()>>>,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        if let Some(mut gate) = self.gate.take() {
            if let Ok(Ok(())) = gate.try_recv() {
                self.scheduler.release_slot();
            }
        }
    }
}

impl PriorityScheduler {
    /// Build the scheduler and start its aging task
    pub fn new(config: SchedulerConfig) -> ConstellationResult<Arc<Self>> {
        if config.max_concurrent == 0 {
            return Err(ConstellationError::Config(
                "scheduler max_concurrent must be greater than zero".to_string(),
            ));
        }
        if config.aging_interval.is_zero() {
            return Err(ConstellationError::Config(
                "scheduler aging_interval must be greater than zero".to_string(),
            ));
        }
        let scheduler = Arc::new(Self {
            config,
            core: Mutex::new(SchedulerCore {
                queue: BinaryHeap::new(),
                active: 0,
                next_sequence: 0,
                shutdown: false,
            }),
            total_submitted: AtomicU64::new(0),
            total_completed: AtomicU64::new(0),
            high_priority_completed: AtomicU64::new(0),
            low_priority_completed: AtomicU64::new(0),
            starvation_promotions: AtomicU64::new(0),
            aging_task: Mutex::new(None),
        });
        let handle = Self::spawn_aging_task(Arc::downgrade(&scheduler));
        *scheduler.aging_task.lock() = Some(handle);
        Ok(scheduler)
    }

    fn spawn_aging_task(scheduler: Weak<Self>) -> JoinHandle<()> {
        let interval = match scheduler.upgrade() {
            Some(s) => s.config.aging_interval,
            None => Duration::from_secs(5),
        };
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // First tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match scheduler.upgrade() {
                    Some(s) => s.age_waiters(),
                    None => break,
                }
            }
        })
    }

    /// One aging pass: boost every starving entry and restore heap order
    fn age_waiters(&self) {
        let now = Instant::now();
        let promoted = {
            let mut core = self.core.lock();
            if core.queue.is_empty() {
                return;
            }
            let mut entries = std::mem::take(&mut core.queue).into_vec();
            let mut promoted = 0u64;
            for entry in &mut entries {
                let waited = now.saturating_duration_since(entry.submitted_at);
                if waited < self.config.starvation_timeout {
                    continue;
                }
                let boost =
                    u64::from(self.config.boost_per_second).saturating_mul(waited.as_secs());
                let new_effective =
                    (u64::from(entry.submitted_priority).saturating_add(boost)).min(100) as u8;
                if new_effective > entry.effective_priority {
                    entry.effective_priority = new_effective;
                    promoted += 1;
                }
            }
            core.queue = BinaryHeap::from(entries);
            promoted
        };
        if promoted > 0 {
            self.starvation_promotions
                .fetch_add(promoted, Ordering::Relaxed);
            tracing::debug!(promoted, "boosted starving scheduler entries");
        }
    }

    /// Submit a task at the given priority (clamped to [0, 100]).
    ///
    /// Runs immediately when a slot is free, otherwise waits on a gate in
    /// the priority queue. Task errors propagate to the caller but still
    /// count as completions.
    pub async fn submit<F, T>(&self, priority: i32, task: F) -> ConstellationResult<T>
    where
        F: Future<Output = ConstellationResult<T>> + Send,
        T: Send,
    {
        let priority = priority.clamp(0, 100) as u8;
        let gate = {
            let mut core = self.core.lock();
            if core.shutdown {
                return Err(ConstellationError::SchedulerShutdown);
            }
            if core.active < self.config.max_concurrent {
                core.active += 1;
                None
            } else {
                if self.config.max_queue_size > 0
                    && core.queue.len() >= self.config.max_queue_size
                {
                    return Err(ConstellationError::QueueFull {
                        current: core.queue.len(),
                        max: self.config.max_queue_size,
                    });
                }
                let (tx, rx) = oneshot::channel();
                let sequence_id = core.next_sequence;
                core.next_sequence += 1;
                core.queue.push(QueueEntry {
                    sequence_id,
                    submitted_priority: priority,
                    submitted_at: Instant::now(),
                    effective_priority: priority,
                    gate: tx,
                });
                Some(rx)
            }
        };
        self.total_submitted.fetch_add(1, Ordering::Relaxed);

        if let Some(rx) = gate {
            let mut guard = GateGuard {
                scheduler: self,
                gate: Some(rx),
            };
            let admitted = match guard.gate.as_mut() {
                Some(gate) => gate.await,
                None => {
                    return Err(ConstellationError::Internal(
                        "scheduler gate vanished before admission".to_string(),
                    ))
                }
            };
            guard.gate = None;
            match admitted {
                Ok(Ok(())) => {}
                Ok(Err(err)) => return Err(err),
                Err(_) => return Err(ConstellationError::SchedulerShutdown),
            }
        }

        let _slot = SlotGuard {
            scheduler: self,
            submitted_priority: priority,
        };
        task.await
    }

    /// Submit at normal priority (50)
    pub async fn submit_normal<F, T>(&self, task: F) -> ConstellationResult<T>
    where
        F: Future<Output = ConstellationResult<T>> + Send,
        T: Send,
    {
        self.submit(super::priority_levels::NORMAL as i32, task).await
    }

    /// Free one slot, transferring it to the best queued waiter if any
    fn release_slot(&self) {
        let mut core = self.core.lock();
        if core.shutdown {
            core.active = core.active.saturating_sub(1);
            return;
        }
        loop {
            match core.queue.pop() {
                Some(entry) => {
                    // A dropped waiter cannot take the slot; try the next.
                    if entry.gate.send(Ok(())).is_ok() {
                        return;
                    }
                }
                None => {
                    core.active = core.active.saturating_sub(1);
                    return;
                }
            }
        }
    }

    /// Consistent snapshot of counters and gauges
    pub fn stats(&self) -> SchedulerStats {
        let (queued, active) = {
            let core = self.core.lock();
            (core.queue.len(), core.active)
        };
        SchedulerStats {
            total_submitted: self.total_submitted.load(Ordering::Relaxed),
            total_completed: self.total_completed.load(Ordering::Relaxed),
            queued_count: queued,
            active_count: active,
            max_concurrent: self.config.max_concurrent,
            priority: PriorityStats {
                high_priority_completed: self.high_priority_completed.load(Ordering::Relaxed),
                low_priority_completed: self.low_priority_completed.load(Ordering::Relaxed),
                starvation_promotions: self.starvation_promotions.load(Ordering::Relaxed),
            },
        }
    }

    /// Reject further submissions and wake every queued waiter with a
    /// shutdown error. Idempotent.
    pub fn shutdown(&self) {
        let drained = {
            let mut core = self.core.lock();
            if core.shutdown {
                return;
            }
            core.shutdown = true;
            std::mem::take(&mut core.queue).into_vec()
        };
        let woken = drained.len();
        for entry in drained {
            let _ = entry.gate.send(Err(ConstellationError::SchedulerShutdown));
        }
        if let Some(handle) = self.aging_task.lock().take() {
            handle.abort();
        }
        tracing::info!(woken, "priority scheduler shut down");
    }
}

impl Drop for PriorityScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.aging_task.lock().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::sync::Notify;

    fn quick_config(max_concurrent: usize) -> SchedulerConfig {
        SchedulerConfig {
            max_concurrent,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_submit_runs_task() {
        let scheduler = PriorityScheduler::new(quick_config(2)).unwrap();
        let result = scheduler.submit_normal(async { Ok(5) }).await.unwrap();
        assert_eq!(result, 5);
        let stats = scheduler.stats();
        assert_eq!(stats.total_submitted, 1);
        assert_eq!(stats.total_completed, 1);
        assert_eq!(stats.active_count, 0);
    }

    #[tokio::test]
    async fn test_task_error_counts_as_completed() {
        let scheduler = PriorityScheduler::new(quick_config(2)).unwrap();
        let result: ConstellationResult<u32> = scheduler
            .submit_normal(async { Err(ConstellationError::Internal("boom".to_string())) })
            .await;
        assert!(result.is_err());
        let stats = scheduler.stats();
        assert_eq!(stats.total_completed, 1);
        assert_eq!(stats.active_count, 0);
    }

    #[tokio::test]
    async fn test_priority_clamping() {
        let scheduler = PriorityScheduler::new(quick_config(1)).unwrap();
        assert_eq!(scheduler.submit(-10, async { Ok(1) }).await.unwrap(), 1);
        assert_eq!(scheduler.submit(150, async { Ok(2) }).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_queue_full_rejection() {
        let config = SchedulerConfig {
            max_concurrent: 1,
            max_queue_size: 1,
            ..Default::default()
        };
        let scheduler = PriorityScheduler::new(config).unwrap();

        let release = Arc::new(Notify::new());
        let blocker = {
            let scheduler = scheduler.clone();
            let release = release.clone();
            tokio::spawn(async move {
                scheduler
                    .submit_normal(async move {
                        release.notified().await;
                        Ok(())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Fills the single queue slot.
        let queued = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.submit_normal(async { Ok(()) }).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let rejected = scheduler.submit_normal(async { Ok(()) }).await;
        assert!(matches!(
            rejected,
            Err(ConstellationError::QueueFull { current: 1, max: 1 })
        ));

        release.notify_waiters();
        blocker.await.unwrap().unwrap();
        queued.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_completion_order_follows_priority() {
        let scheduler = PriorityScheduler::new(quick_config(1)).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        let release = Arc::new(Notify::new());

        let blocker = {
            let scheduler = scheduler.clone();
            let order = order.clone();
            let release = release.clone();
            tokio::spawn(async move {
                scheduler
                    .submit(50, async move {
                        release.notified().await;
                        order.lock().push("blocker");
                        Ok(())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut waiters = Vec::new();
        for (priority, label) in [(10, "low"), (50, "normal"), (90, "high")] {
            let scheduler = scheduler.clone();
            let order = order.clone();
            waiters.push(tokio::spawn(async move {
                scheduler
                    .submit(priority, async move {
                        order.lock().push(label);
                        Ok(())
                    })
                    .await
            }));
            // Deterministic sequence ids.
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        release.notify_waiters();
        blocker.await.unwrap().unwrap();
        for waiter in waiters {
            waiter.await.unwrap().unwrap();
        }

        let seen = order.lock().clone();
        assert_eq!(seen, vec!["blocker", "high", "normal", "low"]);
    }

    #[tokio::test]
    async fn test_fifo_within_same_priority() {
        let scheduler = PriorityScheduler::new(quick_config(1)).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        let release = Arc::new(Notify::new());

        let blocker = {
            let scheduler = scheduler.clone();
            let release = release.clone();
            tokio::spawn(async move {
                scheduler
                    .submit(50, async move {
                        release.notified().await;
                        Ok(())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut waiters = Vec::new();
        for label in ["first", "second", "third"] {
            let scheduler = scheduler.clone();
            let order = order.clone();
            waiters.push(tokio::spawn(async move {
                scheduler
                    .submit(50, async move {
                        order.lock().push(label);
                        Ok(())
                    })
                    .await
            }));
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        release.notify_waiters();
        blocker.await.unwrap().unwrap();
        for waiter in waiters {
            waiter.await.unwrap().unwrap();
        }
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_starvation_promotion() {
        let config = SchedulerConfig {
            max_concurrent: 1,
            max_queue_size: 0,
            aging_interval: Duration::from_millis(100),
            starvation_timeout: Duration::from_millis(200),
            boost_per_second: 10,
        };
        let scheduler = PriorityScheduler::new(config).unwrap();
        let release = Arc::new(Notify::new());

        let blocker = {
            let scheduler = scheduler.clone();
            let release = release.clone();
            tokio::spawn(async move {
                scheduler
                    .submit(50, async move {
                        release.notified().await;
                        Ok(())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let waiter = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.submit(10, async { Ok(()) }).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Boosting needs at least one whole second of waiting; give the
        // aging passes room to observe the starving entry.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(scheduler.stats().priority.starvation_promotions >= 1);

        release.notify_waiters();
        blocker.await.unwrap().unwrap();
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_wakes_queued_waiters() {
        let scheduler = PriorityScheduler::new(quick_config(1)).unwrap();
        let release = Arc::new(Notify::new());

        let blocker = {
            let scheduler = scheduler.clone();
            let release = release.clone();
            tokio::spawn(async move {
                scheduler
                    .submit_normal(async move {
                        release.notified().await;
                        Ok(())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let waiter = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.submit_normal(async { Ok(()) }).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        scheduler.shutdown();
        scheduler.shutdown();

        assert!(matches!(
            waiter.await.unwrap(),
            Err(ConstellationError::SchedulerShutdown)
        ));
        assert!(matches!(
            scheduler.submit_normal(async { Ok(()) }).await,
            Err(ConstellationError::SchedulerShutdown)
        ));

        release.notify_waiters();
        blocker.await.unwrap().unwrap();
    }
}
