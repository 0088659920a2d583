//! Execution runtime
//!
//! The engine facade, cancellable execution handles, run state, listener
//! hooks, and the cooperative cancellation token they share.

pub mod cancel;
pub mod engine;
pub mod execution;
pub mod listener;
pub mod state;

pub use cancel::CancelToken;
pub use engine::{Constellation, ConstellationConfig};
pub use execution::{CancellableExecution, ExecutionId, ExecutionStatus};
pub use listener::{
    Backends, ChannelListener, ExecutionEvent, ExecutionListener, TracingListener,
};
pub use state::RunState;
