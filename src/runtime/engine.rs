//! Demand-driven execution engine
//!
//! `Constellation` owns the process-wide services (scheduler, lifecycle,
//! breaker and limiter registries, module cache, tracker) and turns a
//! `DagSpec` plus inputs into a cancellable execution. Evaluation is
//! demand-driven: one lazy cell per node, forced from the declared outputs
//! downwards, with every module call guarded by the resilience stack and
//! admitted through the scheduler.

use crate::dag::{DagSpec, DataId, ModuleId};
use crate::error::{ConstellationError, ConstellationResult};
use crate::lazy::LazyCell;
use crate::lifecycle::ConstellationLifecycle;
use crate::module::{Module, ModuleCallOptions, ModuleOutcome, ModuleStatus};
use crate::resilience::cache::ModuleCache;
use crate::resilience::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerRegistry};
use crate::resilience::error_strategy::ErrorStrategy;
use crate::resilience::registry::{LimiterRegistry, RateControlExecutor, RateControlOptions};
use crate::resilience::retry::{retry_with_backoff, RetryConfig};
use crate::runtime::execution::{CancellableExecution, ExecutionId, ExecutionStatus};
use crate::runtime::listener::{Backends, ExecutionListener};
use crate::runtime::state::RunState;
use crate::scheduler::{priority_levels, PriorityScheduler, SchedulerConfig, SchedulerHandle, SchedulerStats};
use crate::tracker::{ExecutionTracker, TrackerConfig};
use crate::value::{zero_value, Value};
use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crate::runtime::cancel::CancelToken;

/// Engine construction parameters
#[derive(Debug, Clone, Default)]
pub struct ConstellationConfig {
    pub scheduler: SchedulerConfig,
    pub breaker_defaults: CircuitBreakerConfig,
    pub tracker: TrackerConfig,
}

/// The engine facade
pub struct Constellation {
    scheduler: SchedulerHandle,
    lifecycle: Arc<ConstellationLifecycle>,
    breakers: Arc<CircuitBreakerRegistry>,
    limiters: Arc<LimiterRegistry>,
    cache: Arc<ModuleCache>,
    tracker: Arc<ExecutionTracker>,
    backends: Backends,
}

impl Constellation {
    /// Engine with a bounded priority scheduler and in-memory defaults
    pub fn new(config: ConstellationConfig) -> ConstellationResult<Self> {
        Self::with_backends(config, Backends::default())
    }

    pub fn with_backends(
        config: ConstellationConfig,
        backends: Backends,
    ) -> ConstellationResult<Self> {
        let scheduler = SchedulerHandle::Bounded(PriorityScheduler::new(config.scheduler.clone())?);
        Ok(Self::assemble(scheduler, config, backends))
    }

    /// Engine over a caller-supplied scheduler handle
    pub fn with_scheduler(
        scheduler: SchedulerHandle,
        config: ConstellationConfig,
        backends: Backends,
    ) -> Self {
        Self::assemble(scheduler, config, backends)
    }

    fn assemble(
        scheduler: SchedulerHandle,
        config: ConstellationConfig,
        backends: Backends,
    ) -> Self {
        Self {
            scheduler,
            lifecycle: Arc::new(ConstellationLifecycle::new()),
            breakers: Arc::new(CircuitBreakerRegistry::new(config.breaker_defaults)),
            limiters: Arc::new(LimiterRegistry::new()),
            cache: Arc::new(ModuleCache::new()),
            tracker: Arc::new(ExecutionTracker::new(config.tracker)),
            backends,
        }
    }

    pub fn lifecycle(&self) -> &Arc<ConstellationLifecycle> {
        &self.lifecycle
    }

    pub fn circuit_breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    pub fn limiters(&self) -> &Arc<LimiterRegistry> {
        &self.limiters
    }

    pub fn tracker(&self) -> &Arc<ExecutionTracker> {
        &self.tracker
    }

    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    /// Convenience blocking call: run to completion and return the state
    pub async fn execute(
        &self,
        dag: Arc<DagSpec>,
        inputs: HashMap<String, Value>,
        modules: HashMap<ModuleId, Arc<dyn Module>>,
    ) -> ConstellationResult<RunState> {
        let execution =
            self.run_cancellable(dag, inputs, modules, HashMap::new())?;
        execution.result().await
    }

    /// Start an execution and return its handle.
    ///
    /// `module_options` overrides the dag's per-module option bundles by id.
    pub fn run_cancellable(
        &self,
        dag: Arc<DagSpec>,
        inputs: HashMap<String, Value>,
        modules: HashMap<ModuleId, Arc<dyn Module>>,
        module_options: HashMap<ModuleId, ModuleCallOptions>,
    ) -> ConstellationResult<Arc<CancellableExecution>> {
        dag.validate()?;

        let execution_id = ExecutionId::new();
        let handle = CancellableExecution::new(execution_id);
        if !self
            .lifecycle
            .register_execution(execution_id, handle.clone())
        {
            return Err(ConstellationError::ShutdownRejected);
        }
        self.tracker
            .start_execution_with_id(execution_id, &dag.metadata.name);

        let mut options: HashMap<ModuleId, ModuleCallOptions> = dag
            .modules
            .iter()
            .map(|(id, spec)| (*id, spec.options.clone()))
            .collect();
        options.extend(module_options);

        let ctx = EvalContext::build(
            execution_id,
            dag.clone(),
            inputs,
            modules,
            options,
            handle.cancel_token(),
            self.scheduler.clone(),
            self.breakers.clone(),
            self.limiters.clone(),
            self.cache.clone(),
            self.tracker.clone(),
            self.backends.listener.clone(),
        );

        let lifecycle = self.lifecycle.clone();
        let tracker = self.tracker.clone();
        let listener = self.backends.listener.clone();
        let driver_handle = handle.clone();
        tokio::spawn(async move {
            Self::drive(ctx, driver_handle, lifecycle, tracker, listener).await;
        });

        Ok(handle)
    }

    /// Start an execution and cancel it if `duration` elapses first; the
    /// result is whatever was accumulated at cancellation.
    pub async fn run_with_timeout(
        &self,
        duration: Duration,
        dag: Arc<DagSpec>,
        inputs: HashMap<String, Value>,
        modules: HashMap<ModuleId, Arc<dyn Module>>,
        module_options: HashMap<ModuleId, ModuleCallOptions>,
    ) -> ConstellationResult<RunState> {
        let execution = self.run_cancellable(dag, inputs, modules, module_options)?;
        tokio::select! {
            result = execution.result() => result,
            _ = tokio::time::sleep(duration) => {
                tracing::info!(
                    execution_id = %execution.execution_id(),
                    ?duration,
                    "execution deadline elapsed, cancelling"
                );
                execution.cancel();
                execution.result().await
            }
        }
    }

    /// Drain in-flight executions, then stop the scheduler
    pub async fn shutdown(&self, drain_timeout: Duration) {
        self.lifecycle.shutdown(drain_timeout).await;
        self.scheduler.shutdown();
    }

    /// Drive one execution to its terminal outcome
    async fn drive(
        ctx: Arc<EvalContext>,
        handle: Arc<CancellableExecution>,
        lifecycle: Arc<ConstellationLifecycle>,
        tracker: Arc<ExecutionTracker>,
        listener: Option<Arc<dyn ExecutionListener>>,
    ) {
        let execution_id = ctx.execution_id;
        let dag_name = ctx.dag.metadata.name.clone();
        let started = Instant::now();

        if let Some(listener) = listener.clone() {
            let dag_name = dag_name.clone();
            tokio::spawn(async move {
                listener.on_execution_start(execution_id, &dag_name).await;
            });
        }

        let cancel = ctx.cancel.clone();
        let run = async {
            let mut forces = Vec::new();
            for name in &ctx.dag.declared_outputs {
                let data_id = ctx.dag.output_bindings.get(name).copied().ok_or_else(|| {
                    ConstellationError::InvalidDag(format!(
                        "declared output '{}' has no binding",
                        name
                    ))
                })?;
                let cell = ctx.data_cell(data_id)?;
                forces.push(async move { cell.force().await });
            }
            futures::future::try_join_all(forces).await.map(|_| ())
        };
        let outcome: ConstellationResult<()> = tokio::select! {
            _ = cancel.cancelled() => Err(ConstellationError::Cancelled),
            result = run => result,
        };

        let latency = started.elapsed();
        let state = ctx.collect_state(Some(latency));
        // Project the terminal state over the live node records, keeping the
        // trace's original start time.
        let trace_start = tracker
            .get_trace(execution_id)
            .map(|trace| trace.start_time)
            .unwrap_or_else(Utc::now);
        tracker.from_runtime_state(execution_id, &dag_name, &state, trace_start);

        let (terminal, result) = match outcome {
            Ok(()) => (ExecutionStatus::Completed, Ok(state)),
            Err(err) if err.is_cancelled() => (ExecutionStatus::Cancelled, Ok(state)),
            Err(err) => (ExecutionStatus::Failed, Err(err)),
        };
        if let Some(listener) = listener {
            let status = terminal;
            tokio::spawn(async move {
                match status {
                    ExecutionStatus::Cancelled => {
                        listener.on_execution_cancelled(execution_id).await
                    }
                    _ => {
                        listener
                            .on_execution_complete(execution_id, status, latency)
                            .await
                    }
                }
            });
        }
        handle.finish(terminal, result);
        lifecycle.deregister_execution(execution_id);
        tracing::debug!(%execution_id, dag = %dag_name, ?terminal, "execution settled");
    }
}

/// Per-execution evaluation context: the lazy-cell graph plus the services
/// module calls run through.
struct EvalContext {
    execution_id: ExecutionId,
    dag: Arc<DagSpec>,
    modules: HashMap<ModuleId, Arc<dyn Module>>,
    options: HashMap<ModuleId, ModuleCallOptions>,
    data_cells: HashMap<DataId, Arc<LazyCell<Value>>>,
    module_cells: HashMap<ModuleId, Arc<LazyCell<ModuleOutcome>>>,
    statuses: DashMap<ModuleId, ModuleStatus>,
    cancel: CancelToken,
    scheduler: SchedulerHandle,
    breakers: Arc<CircuitBreakerRegistry>,
    limiters: Arc<LimiterRegistry>,
    cache: Arc<ModuleCache>,
    tracker: Arc<ExecutionTracker>,
    listener: Option<Arc<dyn ExecutionListener>>,
}

impl EvalContext {
    #[allow(clippy::too_many_arguments)]
    fn build(
        execution_id: ExecutionId,
        dag: Arc<DagSpec>,
        inputs: HashMap<String, Value>,
        modules: HashMap<ModuleId, Arc<dyn Module>>,
        options: HashMap<ModuleId, ModuleCallOptions>,
        cancel: CancelToken,
        scheduler: SchedulerHandle,
        breakers: Arc<CircuitBreakerRegistry>,
        limiters: Arc<LimiterRegistry>,
        cache: Arc<ModuleCache>,
        tracker: Arc<ExecutionTracker>,
        listener: Option<Arc<dyn ExecutionListener>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<EvalContext>| {
            let mut data_cells = HashMap::with_capacity(dag.data.len());
            for (&data_id, data_spec) in &dag.data {
                // Supplied inputs seed their cells as already computed.
                let cell = match inputs.get(&data_spec.name) {
                    Some(value) => Arc::new(LazyCell::computed(value.clone())),
                    None => {
                        let weak = weak.clone();
                        Arc::new(LazyCell::new(move || {
                            let weak = weak.clone();
                            async move {
                                let ctx = weak
                                    .upgrade()
                                    .ok_or(ConstellationError::Cancelled)?;
                                ctx.eval_data(data_id).await
                            }
                        }))
                    }
                };
                data_cells.insert(data_id, cell);
            }

            let mut module_cells = HashMap::with_capacity(dag.modules.len());
            for &module_id in dag.modules.keys() {
                let weak = weak.clone();
                module_cells.insert(
                    module_id,
                    Arc::new(LazyCell::new(move || {
                        let weak = weak.clone();
                        async move {
                            let ctx = weak
                                .upgrade()
                                .ok_or(ConstellationError::Cancelled)?;
                            ctx.eval_module(module_id).await
                        }
                    })),
                );
            }

            EvalContext {
                execution_id,
                dag: dag.clone(),
                modules,
                options,
                data_cells,
                module_cells,
                statuses: DashMap::new(),
                cancel,
                scheduler,
                breakers,
                limiters,
                cache,
                tracker,
                listener,
            }
        })
    }

    fn data_cell(&self, data_id: DataId) -> ConstellationResult<Arc<LazyCell<Value>>> {
        self.data_cells.get(&data_id).cloned().ok_or_else(|| {
            ConstellationError::Internal(format!("no cell for data node {}", data_id))
        })
    }

    /// Demand rule for a data node: pre-seeded inputs never reach here; a
    /// node without a producer is a missing input, otherwise the producing
    /// module is forced and the bound port's value returned.
    async fn eval_data(&self, data_id: DataId) -> ConstellationResult<Value> {
        let data_spec = self.dag.data.get(&data_id).ok_or_else(|| {
            ConstellationError::Internal(format!("unknown data node {}", data_id))
        })?;
        let producer = match self.dag.producer_of(data_id) {
            Some(producer) => producer,
            None => {
                return Err(ConstellationError::MissingInput(data_spec.name.clone()));
            }
        };
        let cell = self.module_cells.get(&producer).cloned().ok_or_else(|| {
            ConstellationError::Internal(format!("no cell for module {}", producer))
        })?;
        let outcome = cell.force().await?;
        let port = data_spec.port_bindings.get(&producer).ok_or_else(|| {
            ConstellationError::InvalidDag(format!(
                "data node '{}' has no port binding for its producer",
                data_spec.name
            ))
        })?;
        outcome.outputs.get(port).cloned().ok_or_else(|| {
            ConstellationError::ModuleExecution {
                module: self
                    .dag
                    .modules
                    .get(&producer)
                    .map(|m| m.name.clone())
                    .unwrap_or_else(|| producer.to_string()),
                message: format!("produced no value for port '{}'", port),
            }
        })
    }

    /// Fire a module: force its inputs, run the resilience stack through
    /// the scheduler, record status and events.
    async fn eval_module(&self, module_id: ModuleId) -> ConstellationResult<ModuleOutcome> {
        let node_spec = self.dag.modules.get(&module_id).ok_or_else(|| {
            ConstellationError::Internal(format!("unknown module {}", module_id))
        })?;
        let module = self.modules.get(&module_id).cloned().ok_or_else(|| {
            ConstellationError::Internal(format!(
                "no implementation registered for module '{}'",
                node_spec.name
            ))
        })?;
        let options = self
            .options
            .get(&module_id)
            .cloned()
            .unwrap_or_default();
        let module_name = node_spec.name.clone();

        // Force every upstream data cell concurrently.
        let mut input_forces = Vec::new();
        for (data_id, m) in &self.dag.in_edges {
            if *m != module_id {
                continue;
            }
            let data_spec = self.dag.data.get(data_id).ok_or_else(|| {
                ConstellationError::Internal(format!("unknown data node {}", data_id))
            })?;
            let port = data_spec
                .port_bindings
                .get(&module_id)
                .cloned()
                .ok_or_else(|| {
                    ConstellationError::InvalidDag(format!(
                        "data node '{}' feeds module '{}' without a port binding",
                        data_spec.name, module_name
                    ))
                })?;
            let cell = self.data_cell(*data_id)?;
            input_forces.push(async move { cell.force().await.map(|value| (port, value)) });
        }
        let gather = futures::future::try_join_all(input_forces);
        let inputs: HashMap<String, Value> = match module.spec().inputs_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, gather).await {
                Ok(gathered) => gathered?.into_iter().collect(),
                Err(_) => {
                    return Err(ConstellationError::ModuleTimeout {
                        module: module_name,
                        timeout,
                    })
                }
            },
            None => gather.await?.into_iter().collect(),
        };

        self.tracker.record_node_start(self.execution_id, &module_name);
        if let Some(listener) = self.listener.clone() {
            let name = module_name.clone();
            let id = self.execution_id;
            tokio::spawn(async move {
                listener.on_module_start(id, &name).await;
            });
        }

        let started = Instant::now();
        let produces = node_spec.produces.clone();
        let result = self
            .scheduler
            .submit(
                i32::from(options.priority.unwrap_or(priority_levels::NORMAL)),
                Self::protected_call(
                    module_name.clone(),
                    module,
                    inputs,
                    produces,
                    options,
                    self.breakers.clone(),
                    self.limiters.clone(),
                    self.cache.clone(),
                    self.cancel.clone(),
                ),
            )
            .await;
        let duration = started.elapsed();

        match &result {
            Ok(outcome) => {
                self.statuses.insert(
                    module_id,
                    ModuleStatus::Fired {
                        duration,
                        context: outcome.context.clone(),
                    },
                );
                self.tracker.record_node_complete(
                    self.execution_id,
                    &module_name,
                    None,
                    duration.as_millis() as u64,
                );
                if let Some(listener) = self.listener.clone() {
                    let name = module_name.clone();
                    let id = self.execution_id;
                    tokio::spawn(async move {
                        listener.on_module_complete(id, &name, duration).await;
                    });
                }
            }
            Err(err) if err.is_cancelled() => {
                // A cancelled module never reached a terminal status.
            }
            Err(err) => {
                let status = match err {
                    ConstellationError::ModuleTimeout { .. } => {
                        ModuleStatus::Timed { duration }
                    }
                    other => ModuleStatus::Failed {
                        error: other.to_string(),
                    },
                };
                self.statuses.insert(module_id, status);
                self.tracker.record_node_failed(
                    self.execution_id,
                    &module_name,
                    &err.to_string(),
                    duration.as_millis() as u64,
                );
                if let Some(listener) = self.listener.clone() {
                    let name = module_name.clone();
                    let id = self.execution_id;
                    let err = err.clone();
                    tokio::spawn(async move {
                        listener.on_module_failed(id, &name, &err).await;
                    });
                }
            }
        }
        result
    }

    /// The per-call resilience stack, outermost to innermost: error
    /// strategy, fallback, rate limiter, concurrency limiter, circuit
    /// breaker, cache, retry, timeout, execute.
    #[allow(clippy::too_many_arguments)]
    async fn protected_call(
        module_name: String,
        module: Arc<dyn Module>,
        inputs: HashMap<String, Value>,
        produces: HashMap<String, crate::value::Type>,
        options: ModuleCallOptions,
        breakers: Arc<CircuitBreakerRegistry>,
        limiters: Arc<LimiterRegistry>,
        cache: Arc<ModuleCache>,
        cancel: CancelToken,
    ) -> ConstellationResult<ModuleOutcome> {
        // Typed output ports give Wrap's failure side no representation.
        if options.error_strategy == ErrorStrategy::Wrap {
            return Err(ConstellationError::InvalidStrategy(format!(
                "module '{}': wrap is not supported for typed module outputs",
                module_name
            )));
        }

        let module_timeout = options.module_timeout.or(module.spec().module_timeout);
        let retry_config = (options.retries > 0).then(|| RetryConfig {
            max_retries: options.retries,
            initial_delay: options.retry_delay.unwrap_or(Duration::from_millis(100)),
            max_delay: options.max_delay.unwrap_or(Duration::from_secs(30)),
            backoff: options.backoff,
        });

        // Cache around retried attempts; only the final success is stored.
        let core = async {
            match options.cache_ttl {
                Some(ttl) => {
                    let key = ModuleCache::fingerprint(&module_name, &inputs);
                    if let Some((outputs, context)) = cache.get(&key) {
                        tracing::debug!(module = %module_name, "module cache hit");
                        return Ok(ModuleOutcome { outputs, context });
                    }
                    let outcome = Self::run_attempts(
                        &module,
                        &inputs,
                        &module_name,
                        module_timeout,
                        retry_config.as_ref(),
                        &cancel,
                    )
                    .await?;
                    cache.put(key, outcome.outputs.clone(), outcome.context.clone(), ttl);
                    Ok(outcome)
                }
                None => {
                    Self::run_attempts(
                        &module,
                        &inputs,
                        &module_name,
                        module_timeout,
                        retry_config.as_ref(),
                        &cancel,
                    )
                    .await
                }
            }
        };

        // Circuit breaker around the cache, shared process-wide by name.
        let breaker_config = options.circuit_breaker.clone();
        let breaker_name = module_name.clone();
        let breaker_registry = breakers.clone();
        let protected = async move {
            match breaker_config {
                Some(config) => {
                    let breaker =
                        breaker_registry.get_or_create_with(&breaker_name, config);
                    breaker.protect(|| core).await
                }
                None => core.await,
            }
        };

        let rate_control = RateControlOptions {
            throttle: options.throttle,
            concurrency: options.concurrency,
        };
        let limiter_name = options
            .limiter_name
            .clone()
            .unwrap_or_else(|| module_name.clone());
        let result = RateControlExecutor::execute_with_rate_control(
            move || protected,
            &limiter_name,
            &rate_control,
            &limiters,
        )
        .await;

        let result = match result {
            Err(ref err) if !err.is_cancelled() && options.fallback.is_some() => {
                let outputs = options.fallback.clone().unwrap_or_default();
                tracing::debug!(module = %module_name, error = %err, "using fallback outputs");
                Ok(ModuleOutcome {
                    outputs,
                    context: Some(format!("fallback after error: {}", err)),
                })
            }
            other => other,
        };

        match options.error_strategy {
            ErrorStrategy::Propagate | ErrorStrategy::Wrap => result,
            ErrorStrategy::Skip | ErrorStrategy::Log => match result {
                Ok(outcome) => Ok(outcome),
                Err(err) if err.is_cancelled() => Err(err),
                Err(err) => {
                    if options.error_strategy == ErrorStrategy::Log {
                        tracing::warn!(
                            module = %module_name,
                            error = %err,
                            "module failed; substituting zero-valued outputs"
                        );
                    }
                    let mut outputs = HashMap::with_capacity(produces.len());
                    for (port, port_type) in &produces {
                        outputs.insert(port.clone(), zero_value(port_type)?);
                    }
                    Ok(ModuleOutcome {
                        outputs,
                        context: Some(format!("skipped after error: {}", err)),
                    })
                }
            },
        }
    }

    /// Retry wrapper around single attempts; no-op without retry options
    async fn run_attempts(
        module: &Arc<dyn Module>,
        inputs: &HashMap<String, Value>,
        module_name: &str,
        module_timeout: Option<Duration>,
        retry_config: Option<&RetryConfig>,
        cancel: &CancelToken,
    ) -> ConstellationResult<ModuleOutcome> {
        match retry_config {
            Some(config) => {
                retry_with_backoff(config, || {
                    Self::attempt_once(
                        module.clone(),
                        inputs.clone(),
                        module_name.to_string(),
                        module_timeout,
                        cancel.clone(),
                    )
                })
                .await
            }
            None => {
                Self::attempt_once(
                    module.clone(),
                    inputs.clone(),
                    module_name.to_string(),
                    module_timeout,
                    cancel.clone(),
                )
                .await
            }
        }
    }

    /// One execute attempt, raced against cancellation and capped by the
    /// module timeout
    async fn attempt_once(
        module: Arc<dyn Module>,
        inputs: HashMap<String, Value>,
        module_name: String,
        module_timeout: Option<Duration>,
        cancel: CancelToken,
    ) -> ConstellationResult<ModuleOutcome> {
        let execute = async {
            tokio::select! {
                _ = cancel.cancelled() => Err(ConstellationError::Cancelled),
                result = module.execute(inputs) => result,
            }
        };
        match module_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, execute).await {
                Ok(result) => result,
                Err(_) => Err(ConstellationError::ModuleTimeout {
                    module: module_name,
                    timeout,
                }),
            },
            None => execute.await,
        }
    }

    /// Snapshot the run: every computed data value, every module status
    /// (NotYet when never demanded), and the total latency.
    fn collect_state(&self, latency: Option<Duration>) -> RunState {
        let mut data = HashMap::new();
        for (data_id, cell) in &self.data_cells {
            if let Some(value) = cell.peek() {
                data.insert(*data_id, value);
            }
        }
        let mut module_status = HashMap::with_capacity(self.dag.modules.len());
        for module_id in self.dag.modules.keys() {
            let status = self
                .statuses
                .get(module_id)
                .map(|entry| entry.value().clone())
                .unwrap_or(ModuleStatus::NotYet);
            module_status.insert(*module_id, status);
        }
        RunState {
            execution_id: self.execution_id,
            dag: self.dag.clone(),
            module_status,
            data,
            latency,
        }
    }
}
