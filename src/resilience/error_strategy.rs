//! Error strategies around module calls
//!
//! A strategy decides what a failed operation becomes: re-raised
//! (`Propagate`), replaced with the zero value of the return type (`Skip`,
//! `Log`), or reified into a tagged success/failure sum (`Wrap`).

use crate::error::{ConstellationError, ConstellationResult};
use crate::value::{zero_value, Type, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;

/// How module call failures are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorStrategy {
    /// Re-raise the error
    #[default]
    Propagate,
    /// Substitute the zero value, silently
    Skip,
    /// Substitute the zero value and log at warn level
    Log,
    /// Reify the outcome as `Ok(value)` or `Err(failure)`
    Wrap,
}

impl ErrorStrategy {
    /// Case-insensitive parse; unknown strings yield `None`
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "propagate" => Some(ErrorStrategy::Propagate),
            "skip" => Some(ErrorStrategy::Skip),
            "log" => Some(ErrorStrategy::Log),
            "wrap" => Some(ErrorStrategy::Wrap),
            _ => None,
        }
    }
}

/// A reified module failure, produced by the `Wrap` strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleFailure {
    pub module_name: String,
    pub error_type: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ModuleFailure {
    pub fn from_error(module_name: &str, error: &ConstellationError) -> Self {
        Self {
            module_name: module_name.to_string(),
            error_type: error.kind().to_string(),
            message: error.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Outcome of running an operation under a strategy
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyOutcome {
    /// The operation's value (possibly a substituted zero value)
    Value(Value),
    /// The `Wrap` strategy's tagged sum
    Wrapped(Result<Value, ModuleFailure>),
}

impl StrategyOutcome {
    pub fn into_value(self) -> Option<Value> {
        match self {
            StrategyOutcome::Value(value) => Some(value),
            StrategyOutcome::Wrapped(Ok(value)) => Some(value),
            StrategyOutcome::Wrapped(Err(_)) => None,
        }
    }
}

/// Applies error strategies around operations
pub struct ErrorStrategyExecutor;

impl ErrorStrategyExecutor {
    /// Run an operation producing a `Value` under the given strategy.
    ///
    /// Cancellation always passes through; only real failures are skipped,
    /// logged, or wrapped.
    pub async fn execute<F, Fut>(
        operation: F,
        strategy: ErrorStrategy,
        return_type: &Type,
        module_name: &str,
    ) -> ConstellationResult<StrategyOutcome>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ConstellationResult<Value>>,
    {
        match strategy {
            ErrorStrategy::Propagate => operation().await.map(StrategyOutcome::Value),
            ErrorStrategy::Skip => match operation().await {
                Ok(value) => Ok(StrategyOutcome::Value(value)),
                Err(err) if err.is_cancelled() => Err(err),
                Err(_) => zero_value(return_type).map(StrategyOutcome::Value),
            },
            ErrorStrategy::Log => match operation().await {
                Ok(value) => Ok(StrategyOutcome::Value(value)),
                Err(err) if err.is_cancelled() => Err(err),
                Err(err) => {
                    tracing::warn!(
                        module = module_name,
                        error = %err,
                        "module failed; substituting zero value"
                    );
                    zero_value(return_type).map(StrategyOutcome::Value)
                }
            },
            ErrorStrategy::Wrap => match operation().await {
                Ok(value) => Ok(StrategyOutcome::Wrapped(Ok(value))),
                Err(err) if err.is_cancelled() => Err(err),
                Err(err) => Ok(StrategyOutcome::Wrapped(Err(ModuleFailure::from_error(
                    module_name,
                    &err,
                )))),
            },
        }
    }

    /// Typed variant over an arbitrary result type, with a zero-value
    /// builder. `Wrap` has no representation here and is rejected.
    pub async fn execute_typed<F, Fut, T, Z>(
        operation: F,
        strategy: ErrorStrategy,
        zero: Z,
        module_name: &str,
    ) -> ConstellationResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ConstellationResult<T>>,
        Z: FnOnce() -> T,
    {
        match strategy {
            ErrorStrategy::Propagate => operation().await,
            ErrorStrategy::Skip => match operation().await {
                Ok(value) => Ok(value),
                Err(err) if err.is_cancelled() => Err(err),
                Err(_) => Ok(zero()),
            },
            ErrorStrategy::Log => match operation().await {
                Ok(value) => Ok(value),
                Err(err) if err.is_cancelled() => Err(err),
                Err(err) => {
                    tracing::warn!(
                        module = module_name,
                        error = %err,
                        "module failed; substituting zero value"
                    );
                    Ok(zero())
                }
            },
            ErrorStrategy::Wrap => Err(ConstellationError::InvalidStrategy(
                "wrap is not supported by the typed executor".to_string(),
            )),
        }
    }
}
