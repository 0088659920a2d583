//! Cancellable execution handles

use crate::error::{ConstellationError, ConstellationResult};
use crate::runtime::cancel::CancelToken;
use crate::runtime::state::RunState;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Execution identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(pub Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Execution lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

type Outcome = Option<ConstellationResult<RunState>>;

/// Handle over a running pipeline
///
/// `cancel` is idempotent and a no-op once the execution is terminal.
/// `result` awaits the terminal outcome: a completed run yields its
/// `RunState`, a failed run re-raises the error, and a cancelled run yields
/// the partial state accumulated at cancellation.
pub struct CancellableExecution {
    id: ExecutionId,
    status: RwLock<ExecutionStatus>,
    cancel_token: CancelToken,
    outcome_tx: watch::Sender<Outcome>,
    outcome_rx: watch::Receiver<Outcome>,
}

impl CancellableExecution {
    pub(crate) fn new(id: ExecutionId) -> Arc<Self> {
        let (outcome_tx, outcome_rx) = watch::channel(None);
        Arc::new(Self {
            id,
            status: RwLock::new(ExecutionStatus::Running),
            cancel_token: CancelToken::new(),
            outcome_tx,
            outcome_rx,
        })
    }

    /// Handle over an already-finished execution
    pub fn completed(id: ExecutionId, state: RunState) -> Arc<Self> {
        let (outcome_tx, outcome_rx) = watch::channel(Some(Ok(state)));
        Arc::new(Self {
            id,
            status: RwLock::new(ExecutionStatus::Completed),
            cancel_token: CancelToken::new(),
            outcome_tx,
            outcome_rx,
        })
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.id
    }

    pub fn status(&self) -> ExecutionStatus {
        *self.status.read()
    }

    /// Cancel the execution; in-flight module calls stop cooperatively at
    /// their next suspension point.
    pub fn cancel(&self) {
        {
            let mut status = self.status.write();
            if *status != ExecutionStatus::Running {
                return;
            }
            *status = ExecutionStatus::Cancelled;
        }
        tracing::info!(execution_id = %self.id, "execution cancelled");
        self.cancel_token.cancel();
    }

    /// Await the terminal outcome
    pub async fn result(&self) -> ConstellationResult<RunState> {
        let mut rx = self.outcome_rx.clone();
        let outcome = rx.wait_for(|outcome| outcome.is_some()).await.map_err(|_| {
            ConstellationError::Internal("execution driver vanished".to_string())
        })?;
        match &*outcome {
            Some(Ok(state)) => Ok(state.clone()),
            Some(Err(err)) => Err(err.clone()),
            None => Err(ConstellationError::Internal(
                "execution signalled without an outcome".to_string(),
            )),
        }
    }

    pub(crate) fn cancel_token(&self) -> CancelToken {
        self.cancel_token.clone()
    }

    /// Publish the terminal outcome. A cancellation that raced ahead keeps
    /// its status; the published result still settles `result` waiters.
    pub(crate) fn finish(&self, terminal: ExecutionStatus, result: ConstellationResult<RunState>) {
        {
            let mut status = self.status.write();
            if *status == ExecutionStatus::Running {
                *status = terminal;
            }
        }
        let _ = self.outcome_tx.send(Some(result));
    }
}
