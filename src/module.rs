//! Module runtime interface
//!
//! A module is an opaque, typed computation: it consumes a map of input-port
//! values and produces a map of output-port values. The engine treats
//! `execute` as an opaque suspending operation; idempotency under retry is
//! the module's responsibility.

use crate::error::ConstellationResult;
use crate::resilience::circuit_breaker::CircuitBreakerConfig;
use crate::resilience::error_strategy::ErrorStrategy;
use crate::resilience::rate_limiter::RateLimit;
use crate::resilience::retry::BackoffStrategy;
use crate::value::{Type, Value};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

/// Typed port signature and metadata of a module implementation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleSpec {
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    /// Input port name -> type
    pub consumes: HashMap<String, Type>,
    /// Output port name -> type
    pub produces: HashMap<String, Type>,
    /// Cap on gathering this module's inputs
    pub inputs_timeout: Option<Duration>,
    /// Cap on a single execute attempt
    pub module_timeout: Option<Duration>,
}

impl ModuleSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn consume(mut self, port: &str, ty: Type) -> Self {
        self.consumes.insert(port.to_string(), ty);
        self
    }

    pub fn produce(mut self, port: &str, ty: Type) -> Self {
        self.produces.insert(port.to_string(), ty);
        self
    }

    pub fn with_module_timeout(mut self, timeout: Duration) -> Self {
        self.module_timeout = Some(timeout);
        self
    }
}

/// Result of a successful module execution
#[derive(Debug, Clone)]
pub struct ModuleOutcome {
    /// Output port name -> produced value
    pub outputs: HashMap<String, Value>,
    /// Optional free-form execution context (provenance, notes)
    pub context: Option<String>,
}

impl ModuleOutcome {
    pub fn new(outputs: HashMap<String, Value>) -> Self {
        Self {
            outputs,
            context: None,
        }
    }

    pub fn with_context(mut self, context: &str) -> Self {
        self.context = Some(context.to_string());
        self
    }

    /// Single-port convenience constructor
    pub fn single(port: &str, value: Value) -> Self {
        let mut outputs = HashMap::new();
        outputs.insert(port.to_string(), value);
        Self::new(outputs)
    }
}

/// Per-module runtime status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModuleStatus {
    /// Not yet demanded
    NotYet,
    /// Executed successfully
    Fired {
        duration: Duration,
        context: Option<String>,
    },
    /// Raised an error the resilience stack did not recover
    Failed { error: String },
    /// Exceeded its module timeout
    Timed { duration: Duration },
}

impl ModuleStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ModuleStatus::NotYet)
    }
}

/// A typed, user-supplied computation
#[async_trait]
pub trait Module: Send + Sync {
    /// The typed port signature and metadata
    fn spec(&self) -> &ModuleSpec;

    /// Run the module over its input ports
    async fn execute(
        &self,
        inputs: HashMap<String, Value>,
    ) -> ConstellationResult<ModuleOutcome>;
}

type ModuleFn = Box<
    dyn Fn(HashMap<String, Value>) -> BoxFuture<'static, ConstellationResult<ModuleOutcome>>
        + Send
        + Sync,
>;

/// Adapter turning an async closure into a `Module`
pub struct FnModule {
    spec: ModuleSpec,
    f: ModuleFn,
}

impl FnModule {
    pub fn new<F, Fut>(spec: ModuleSpec, f: F) -> Self
    where
        F: Fn(HashMap<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ConstellationResult<ModuleOutcome>> + Send + 'static,
    {
        Self {
            spec,
            f: Box::new(move |inputs| f(inputs).boxed()),
        }
    }
}

#[async_trait]
impl Module for FnModule {
    fn spec(&self) -> &ModuleSpec {
        &self.spec
    }

    async fn execute(
        &self,
        inputs: HashMap<String, Value>,
    ) -> ConstellationResult<ModuleOutcome> {
        (self.f)(inputs).await
    }
}

/// Per-call resilience option bundle
///
/// Every absent option makes the corresponding wrapper a no-op.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleCallOptions {
    /// Scheduling priority in [0, 100]; defaults to normal (50)
    pub priority: Option<u8>,
    /// Extra attempts after the first failure
    pub retries: u32,
    /// Base delay between attempts
    pub retry_delay: Option<Duration>,
    pub backoff: BackoffStrategy,
    /// Cap on the computed backoff delay; defaults to 30 s
    pub max_delay: Option<Duration>,
    /// Cap on a single execute attempt; overrides the module spec's own
    pub module_timeout: Option<Duration>,
    /// Enable result caching keyed by module name + input fingerprint
    pub cache_ttl: Option<Duration>,
    /// Output ports substituted when the protected call fails
    pub fallback: Option<HashMap<String, Value>>,
    pub error_strategy: ErrorStrategy,
    /// Token-bucket throttle shared under `limiter_name`
    pub throttle: Option<RateLimit>,
    /// Concurrency cap shared under `limiter_name`
    pub concurrency: Option<usize>,
    /// Key for shared limiters; defaults to the module name
    pub limiter_name: Option<String>,
    /// Protect the call with a process-wide breaker for this module name
    pub circuit_breaker: Option<CircuitBreakerConfig>,
}
