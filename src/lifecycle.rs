//! Process-level lifecycle control
//!
//! Admission for new executions while Running, drain-with-timeout while
//! Draining, force-cancel of whatever remains, then Stopped for good. One
//! mutex guards both the state and the inflight map so a racing register and
//! shutdown produce exactly one outcome per execution.

use crate::runtime::execution::{CancellableExecution, ExecutionId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Lifecycle state; Stopped is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    Running,
    Draining,
    Stopped,
}

struct LifecycleCore {
    state: LifecycleState,
    inflight: HashMap<ExecutionId, Arc<CancellableExecution>>,
}

/// Process-wide admission controller over in-flight executions
pub struct ConstellationLifecycle {
    core: Mutex<LifecycleCore>,
    drained: Notify,
}

impl ConstellationLifecycle {
    pub fn new() -> Self {
        Self {
            core: Mutex::new(LifecycleCore {
                state: LifecycleState::Running,
                inflight: HashMap::new(),
            }),
            drained: Notify::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.core.lock().state
    }

    /// Admit an execution; true only while Running
    pub fn register_execution(
        &self,
        id: ExecutionId,
        handle: Arc<CancellableExecution>,
    ) -> bool {
        let mut core = self.core.lock();
        if core.state != LifecycleState::Running {
            return false;
        }
        core.inflight.insert(id, handle);
        true
    }

    /// Remove an execution from the inflight map. Idempotent.
    pub fn deregister_execution(&self, id: ExecutionId) {
        let mut core = self.core.lock();
        if core.inflight.remove(&id).is_some()
            && core.state == LifecycleState::Draining
            && core.inflight.is_empty()
        {
            self.drained.notify_waiters();
        }
    }

    pub fn inflight_count(&self) -> usize {
        self.core.lock().inflight.len()
    }

    async fn wait_drained(&self) {
        loop {
            let notified = self.drained.notified();
            if self.core.lock().inflight.is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// Drain in-flight executions, force-cancelling whatever remains after
    /// `drain_timeout`, then transition to Stopped. Idempotent; safe to call
    /// concurrently with registrations.
    pub async fn shutdown(&self, drain_timeout: Duration) {
        {
            let mut core = self.core.lock();
            match core.state {
                LifecycleState::Stopped => return,
                LifecycleState::Running => {
                    core.state = LifecycleState::Draining;
                    tracing::info!(
                        inflight = core.inflight.len(),
                        "lifecycle draining"
                    );
                }
                LifecycleState::Draining => {}
            }
            if core.inflight.is_empty() {
                core.state = LifecycleState::Stopped;
                tracing::info!("lifecycle stopped");
                return;
            }
        }

        if tokio::time::timeout(drain_timeout, self.wait_drained())
            .await
            .is_err()
        {
            let remaining: Vec<Arc<CancellableExecution>> =
                self.core.lock().inflight.values().cloned().collect();
            tracing::warn!(
                remaining = remaining.len(),
                "drain timeout; force-cancelling executions"
            );
            for handle in &remaining {
                handle.cancel();
            }
            for handle in &remaining {
                let _ = handle.result().await;
            }
        }

        let mut core = self.core.lock();
        core.state = LifecycleState::Stopped;
        core.inflight.clear();
        tracing::info!("lifecycle stopped");
    }
}

impl Default for ConstellationLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::runtime::execution::ExecutionStatus;

    fn handle() -> (ExecutionId, Arc<CancellableExecution>) {
        let id = ExecutionId::new();
        (id, CancellableExecution::new(id))
    }

    #[tokio::test]
    async fn test_register_only_while_running() {
        let lifecycle = ConstellationLifecycle::new();
        let (id, execution) = handle();
        assert!(lifecycle.register_execution(id, execution.clone()));
        assert_eq!(lifecycle.inflight_count(), 1);

        lifecycle.deregister_execution(id);
        lifecycle.shutdown(Duration::from_millis(10)).await;
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);

        let (id2, execution2) = handle();
        assert!(!lifecycle.register_execution(id2, execution2));
    }

    #[tokio::test]
    async fn test_deregister_is_idempotent() {
        let lifecycle = ConstellationLifecycle::new();
        let (id, execution) = handle();
        lifecycle.register_execution(id, execution);
        lifecycle.deregister_execution(id);
        lifecycle.deregister_execution(id);
        assert_eq!(lifecycle.inflight_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_with_empty_inflight_goes_straight_to_stopped() {
        let lifecycle = ConstellationLifecycle::new();
        lifecycle.shutdown(Duration::from_secs(5)).await;
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_drain_completes_on_deregister() {
        let lifecycle = Arc::new(ConstellationLifecycle::new());
        let (id, execution) = handle();
        lifecycle.register_execution(id, execution);

        let shutdown = {
            let lifecycle = lifecycle.clone();
            tokio::spawn(async move { lifecycle.shutdown(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(lifecycle.state(), LifecycleState::Draining);

        lifecycle.deregister_execution(id);
        shutdown.await.unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_drain_timeout_force_cancels() {
        let lifecycle = ConstellationLifecycle::new();
        let (id, execution) = handle();
        lifecycle.register_execution(id, execution.clone());

        // The execution never deregisters; the handle settles only once its
        // driver publishes, so emulate a driver that reacts to cancellation.
        {
            let execution = execution.clone();
            let token = execution.cancel_token();
            tokio::spawn(async move {
                token.cancelled().await;
                let dag = crate::dag::DagSpecBuilder::new("noop").build().unwrap();
                execution.finish(
                    ExecutionStatus::Cancelled,
                    Ok(crate::runtime::state::RunState {
                        execution_id: id,
                        dag: Arc::new(dag),
                        module_status: HashMap::new(),
                        data: HashMap::new(),
                        latency: None,
                    }),
                );
            });
        }

        lifecycle.shutdown(Duration::from_millis(100)).await;
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
        assert_eq!(execution.status(), ExecutionStatus::Cancelled);
    }
}
