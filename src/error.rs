//! Error types for the constellation engine

use std::time::Duration;
use thiserror::Error;

/// Result type for engine operations
pub type ConstellationResult<T> = Result<T, ConstellationError>;

/// Comprehensive error types for the constellation engine
///
/// The enum is `Clone` because lazy-cell coalescing re-raises one attempt's
/// error to every concurrent forcer; payloads are owned strings.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConstellationError {
    /// A required data node has no producing module and no supplied input
    #[error("Missing input for data node '{0}'")]
    MissingInput(String),

    /// A module raised during execute
    #[error("Module '{module}' failed: {message}")]
    ModuleExecution { module: String, message: String },

    /// A module attempt exceeded its timeout
    #[error("Module '{module}' timed out after {timeout:?}")]
    ModuleTimeout { module: String, timeout: Duration },

    /// A circuit breaker rejected the call without running it
    #[error("Circuit breaker open for module '{0}'")]
    CircuitOpen(String),

    /// The scheduler queue is at capacity
    #[error("Scheduler queue full: {current} of {max} entries")]
    QueueFull { current: usize, max: usize },

    /// The scheduler has been shut down
    #[error("Scheduler is shut down")]
    SchedulerShutdown,

    /// The lifecycle is draining or stopped and rejects new work
    #[error("Execution rejected: engine is shutting down")]
    ShutdownRejected,

    /// Cooperative cancellation was observed
    #[error("Execution cancelled")]
    Cancelled,

    /// Invalid construction arguments
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// An error strategy was used where it cannot apply
    #[error("Invalid error strategy use: {0}")]
    InvalidStrategy(String),

    /// A dag spec violated a structural invariant
    #[error("Invalid dag: {0}")]
    InvalidDag(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConstellationError {
    /// Whether retry may reasonably be attempted for this error.
    ///
    /// Circuit-open, cancellation, timeouts, and admission errors are not
    /// retriable: retrying them would hit the same gate again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConstellationError::ModuleExecution { .. } | ConstellationError::Internal(_)
        )
    }

    /// Whether this error represents cooperative cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ConstellationError::Cancelled)
    }

    /// Short label for the error kind, used by wrapped module failures
    pub fn kind(&self) -> &'static str {
        match self {
            ConstellationError::MissingInput(_) => "missing_input",
            ConstellationError::ModuleExecution { .. } => "module_execution",
            ConstellationError::ModuleTimeout { .. } => "module_timeout",
            ConstellationError::CircuitOpen(_) => "circuit_open",
            ConstellationError::QueueFull { .. } => "queue_full",
            ConstellationError::SchedulerShutdown => "scheduler_shutdown",
            ConstellationError::ShutdownRejected => "shutdown_rejected",
            ConstellationError::Cancelled => "cancelled",
            ConstellationError::Config(_) => "config",
            ConstellationError::InvalidStrategy(_) => "invalid_strategy",
            ConstellationError::InvalidDag(_) => "invalid_dag",
            ConstellationError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ConstellationError::ModuleExecution {
            module: "m".to_string(),
            message: "boom".to_string(),
        }
        .is_transient());
        assert!(!ConstellationError::Cancelled.is_transient());
        assert!(!ConstellationError::CircuitOpen("m".to_string()).is_transient());
        assert!(!ConstellationError::ModuleTimeout {
            module: "m".to_string(),
            timeout: Duration::from_secs(1),
        }
        .is_transient());
    }

    #[test]
    fn test_display_carries_context() {
        let err = ConstellationError::QueueFull { current: 8, max: 8 };
        assert!(err.to_string().contains("8 of 8"));
    }
}
