//! Execution event listeners
//!
//! Listeners observe execution and module lifecycle events fire-and-forget:
//! events are dispatched on their own tasks and listener failures never
//! affect the run.

use crate::error::ConstellationError;
use crate::runtime::execution::{ExecutionId, ExecutionStatus};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Observer of execution events; every hook defaults to a no-op
#[async_trait]
pub trait ExecutionListener: Send + Sync {
    async fn on_execution_start(&self, _execution_id: ExecutionId, _dag_name: &str) {}

    async fn on_module_start(&self, _execution_id: ExecutionId, _module_name: &str) {}

    async fn on_module_complete(
        &self,
        _execution_id: ExecutionId,
        _module_name: &str,
        _duration: Duration,
    ) {
    }

    async fn on_module_failed(
        &self,
        _execution_id: ExecutionId,
        _module_name: &str,
        _error: &ConstellationError,
    ) {
    }

    async fn on_execution_complete(
        &self,
        _execution_id: ExecutionId,
        _status: ExecutionStatus,
        _latency: Duration,
    ) {
    }

    async fn on_execution_cancelled(&self, _execution_id: ExecutionId) {}
}

/// Optional external collaborators injected into the engine
#[derive(Clone, Default)]
pub struct Backends {
    pub listener: Option<Arc<dyn ExecutionListener>>,
}

impl Backends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listener(mut self, listener: Arc<dyn ExecutionListener>) -> Self {
        self.listener = Some(listener);
        self
    }
}

/// Listener that logs every event through `tracing`
pub struct TracingListener;

#[async_trait]
impl ExecutionListener for TracingListener {
    async fn on_execution_start(&self, execution_id: ExecutionId, dag_name: &str) {
        tracing::info!(%execution_id, dag = dag_name, "execution started");
    }

    async fn on_module_start(&self, execution_id: ExecutionId, module_name: &str) {
        tracing::debug!(%execution_id, module = module_name, "module started");
    }

    async fn on_module_complete(
        &self,
        execution_id: ExecutionId,
        module_name: &str,
        duration: Duration,
    ) {
        tracing::debug!(%execution_id, module = module_name, ?duration, "module completed");
    }

    async fn on_module_failed(
        &self,
        execution_id: ExecutionId,
        module_name: &str,
        error: &ConstellationError,
    ) {
        tracing::warn!(%execution_id, module = module_name, %error, "module failed");
    }

    async fn on_execution_complete(
        &self,
        execution_id: ExecutionId,
        status: ExecutionStatus,
        latency: Duration,
    ) {
        tracing::info!(%execution_id, ?status, ?latency, "execution finished");
    }

    async fn on_execution_cancelled(&self, execution_id: ExecutionId) {
        tracing::info!(%execution_id, "execution cancelled");
    }
}

/// An execution event as forwarded by `ChannelListener`
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    ExecutionStarted {
        execution_id: ExecutionId,
        dag_name: String,
    },
    ModuleStarted {
        execution_id: ExecutionId,
        module: String,
    },
    ModuleCompleted {
        execution_id: ExecutionId,
        module: String,
        duration: Duration,
    },
    ModuleFailed {
        execution_id: ExecutionId,
        module: String,
        error: String,
    },
    ExecutionCompleted {
        execution_id: ExecutionId,
        status: ExecutionStatus,
        latency: Duration,
    },
    ExecutionCancelled {
        execution_id: ExecutionId,
    },
}

/// Listener that forwards events over an mpsc channel
///
/// Send errors are swallowed: a gone receiver must not affect the run.
pub struct ChannelListener {
    tx: mpsc::Sender<ExecutionEvent>,
}

impl ChannelListener {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ExecutionEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ExecutionListener for ChannelListener {
    async fn on_execution_start(&self, execution_id: ExecutionId, dag_name: &str) {
        let _ = self
            .tx
            .send(ExecutionEvent::ExecutionStarted {
                execution_id,
                dag_name: dag_name.to_string(),
            })
            .await;
    }

    async fn on_module_start(&self, execution_id: ExecutionId, module_name: &str) {
        let _ = self
            .tx
            .send(ExecutionEvent::ModuleStarted {
                execution_id,
                module: module_name.to_string(),
            })
            .await;
    }

    async fn on_module_complete(
        &self,
        execution_id: ExecutionId,
        module_name: &str,
        duration: Duration,
    ) {
        let _ = self
            .tx
            .send(ExecutionEvent::ModuleCompleted {
                execution_id,
                module: module_name.to_string(),
                duration,
            })
            .await;
    }

    async fn on_module_failed(
        &self,
        execution_id: ExecutionId,
        module_name: &str,
        error: &ConstellationError,
    ) {
        let _ = self
            .tx
            .send(ExecutionEvent::ModuleFailed {
                execution_id,
                module: module_name.to_string(),
                error: error.to_string(),
            })
            .await;
    }

    async fn on_execution_complete(
        &self,
        execution_id: ExecutionId,
        status: ExecutionStatus,
        latency: Duration,
    ) {
        let _ = self
            .tx
            .send(ExecutionEvent::ExecutionCompleted {
                execution_id,
                status,
                latency,
            })
            .await;
    }

    async fn on_execution_cancelled(&self, execution_id: ExecutionId) {
        let _ = self
            .tx
            .send(ExecutionEvent::ExecutionCancelled { execution_id })
            .await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_listener_forwards_events() {
        let (listener, mut rx) = ChannelListener::new(8);
        let id = ExecutionId::new();
        listener.on_execution_start(id, "demo").await;
        listener.on_module_start(id, "step").await;

        assert_eq!(
            rx.recv().await.unwrap(),
            ExecutionEvent::ExecutionStarted {
                execution_id: id,
                dag_name: "demo".to_string(),
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            ExecutionEvent::ModuleStarted {
                execution_id: id,
                module: "step".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_dropped_receiver_does_not_error() {
        let (listener, rx) = ChannelListener::new(1);
        drop(rx);
        listener.on_execution_cancelled(ExecutionId::new()).await;
    }
}
