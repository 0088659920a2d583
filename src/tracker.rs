//! Execution tracing
//!
//! A bounded store of recent execution traces: per-node status, value,
//! error, and duration. Oversized values are replaced with a truncation
//! marker; when the store is full the oldest trace is evicted.

use crate::module::ModuleStatus;
use crate::runtime::execution::ExecutionId;
use crate::runtime::state::RunState;
use crate::value::Value;
use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroUsize;

/// Status of one node within a trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Result of one node within a trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
    pub status: NodeStatus,
    pub value: Option<Value>,
    pub error: Option<String>,
    pub duration_ms: Option<u64>,
}

/// Trace of one execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTrace {
    pub execution_id: ExecutionId,
    pub dag_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub node_results: HashMap<String, NodeResult>,
}

/// Tracker sizing
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Traces retained before the oldest is evicted
    pub max_traces: usize,
    /// Serialized size past which a node value is truncated
    pub max_value_size_bytes: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_traces: 100,
            max_value_size_bytes: 10_000,
        }
    }
}

/// Thread-safe store of recent execution traces
pub struct ExecutionTracker {
    config: TrackerConfig,
    traces: Mutex<LruCache<ExecutionId, ExecutionTrace>>,
}

impl ExecutionTracker {
    pub fn new(config: TrackerConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_traces.max(1))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            config,
            traces: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Open a new trace, evicting the oldest if the store is full
    pub fn start_execution(&self, dag_name: &str) -> ExecutionId {
        let id = ExecutionId::new();
        self.start_execution_with_id(id, dag_name);
        id
    }

    /// Open a trace under a caller-supplied id
    pub fn start_execution_with_id(&self, id: ExecutionId, dag_name: &str) {
        let trace = ExecutionTrace {
            execution_id: id,
            dag_name: dag_name.to_string(),
            start_time: Utc::now(),
            end_time: None,
            node_results: HashMap::new(),
        };
        self.traces.lock().put(id, trace);
    }

    /// Upsert a node as running
    pub fn record_node_start(&self, execution_id: ExecutionId, node: &str) {
        let mut traces = self.traces.lock();
        if let Some(trace) = traces.get_mut(&execution_id) {
            trace.node_results.insert(
                node.to_string(),
                NodeResult {
                    status: NodeStatus::Running,
                    value: None,
                    error: None,
                    duration_ms: None,
                },
            );
        }
    }

    /// Mark a node completed, truncating oversized values
    pub fn record_node_complete(
        &self,
        execution_id: ExecutionId,
        node: &str,
        value: Option<Value>,
        duration_ms: u64,
    ) {
        let value = value.map(|v| self.truncated(v));
        let mut traces = self.traces.lock();
        if let Some(trace) = traces.get_mut(&execution_id) {
            trace.node_results.insert(
                node.to_string(),
                NodeResult {
                    status: NodeStatus::Completed,
                    value,
                    error: None,
                    duration_ms: Some(duration_ms),
                },
            );
        }
    }

    /// Mark a node failed
    pub fn record_node_failed(
        &self,
        execution_id: ExecutionId,
        node: &str,
        error_message: &str,
        duration_ms: u64,
    ) {
        let mut traces = self.traces.lock();
        if let Some(trace) = traces.get_mut(&execution_id) {
            trace.node_results.insert(
                node.to_string(),
                NodeResult {
                    status: NodeStatus::Failed,
                    value: None,
                    error: Some(error_message.to_string()),
                    duration_ms: Some(duration_ms),
                },
            );
        }
    }

    /// Stamp the trace's end time
    pub fn finish_execution(&self, execution_id: ExecutionId) {
        let mut traces = self.traces.lock();
        if let Some(trace) = traces.get_mut(&execution_id) {
            trace.end_time = Some(Utc::now());
        }
    }

    pub fn get_trace(&self, execution_id: ExecutionId) -> Option<ExecutionTrace> {
        self.traces.lock().peek(&execution_id).cloned()
    }

    /// All retained traces, most recently touched first
    pub fn get_all_traces(&self) -> Vec<ExecutionTrace> {
        self.traces
            .lock()
            .iter()
            .map(|(_, trace)| trace.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.traces.lock().clear();
    }

    /// Project a finished run into a trace
    pub fn from_runtime_state(
        &self,
        execution_id: ExecutionId,
        dag_name: &str,
        run_state: &RunState,
        start_time: DateTime<Utc>,
    ) {
        let mut node_results = HashMap::new();
        for (module_id, status) in &run_state.module_status {
            let name = match run_state.dag.modules.get(module_id) {
                Some(spec) => spec.name.clone(),
                None => module_id.to_string(),
            };
            let result = match status {
                ModuleStatus::NotYet => NodeResult {
                    status: NodeStatus::Pending,
                    value: None,
                    error: None,
                    duration_ms: None,
                },
                ModuleStatus::Fired { duration, .. } => NodeResult {
                    status: NodeStatus::Completed,
                    value: None,
                    error: None,
                    duration_ms: Some(duration.as_millis() as u64),
                },
                ModuleStatus::Failed { error } => NodeResult {
                    status: NodeStatus::Failed,
                    value: None,
                    error: Some(error.clone()),
                    duration_ms: None,
                },
                ModuleStatus::Timed { duration } => NodeResult {
                    status: NodeStatus::Failed,
                    value: None,
                    error: Some("Timed out".to_string()),
                    duration_ms: Some(duration.as_millis() as u64),
                },
            };
            node_results.insert(name, result);
        }
        for (data_id, value) in &run_state.data {
            let name = match run_state.dag.data.get(data_id) {
                Some(spec) => spec.name.clone(),
                None => data_id.to_string(),
            };
            node_results.insert(
                name,
                NodeResult {
                    status: NodeStatus::Completed,
                    value: Some(self.truncated(value.clone())),
                    error: None,
                    duration_ms: None,
                },
            );
        }
        let trace = ExecutionTrace {
            execution_id,
            dag_name: dag_name.to_string(),
            start_time,
            end_time: Some(Utc::now()),
            node_results,
        };
        self.traces.lock().put(execution_id, trace);
    }

    fn truncated(&self, value: Value) -> Value {
        match serde_json::to_string(&value) {
            Ok(serialized) if serialized.len() > self.config.max_value_size_bytes => {
                Value::String(format!("<truncated: {} bytes>", serialized.len()))
            }
            _ => value,
        }
    }
}

impl Default for ExecutionTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_record_round_trip() {
        let tracker = ExecutionTracker::default();
        let id = tracker.start_execution("demo");
        tracker.record_node_start(id, "step");
        tracker.record_node_complete(id, "step", Some(Value::Int(5)), 12);
        tracker.finish_execution(id);

        let trace = tracker.get_trace(id).unwrap();
        assert_eq!(trace.dag_name, "demo");
        assert!(trace.end_time.is_some());
        let node = &trace.node_results["step"];
        assert_eq!(node.status, NodeStatus::Completed);
        assert_eq!(node.value, Some(Value::Int(5)));
        assert_eq!(node.duration_ms, Some(12));
    }

    #[test]
    fn test_failed_node_keeps_error() {
        let tracker = ExecutionTracker::default();
        let id = tracker.start_execution("demo");
        tracker.record_node_failed(id, "step", "exploded", 3);
        let trace = tracker.get_trace(id).unwrap();
        let node = &trace.node_results["step"];
        assert_eq!(node.status, NodeStatus::Failed);
        assert_eq!(node.error.as_deref(), Some("exploded"));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let tracker = ExecutionTracker::new(TrackerConfig {
            max_traces: 2,
            max_value_size_bytes: 10_000,
        });
        let first = tracker.start_execution("a");
        let second = tracker.start_execution("b");
        let third = tracker.start_execution("c");
        assert!(tracker.get_trace(first).is_none());
        assert!(tracker.get_trace(second).is_some());
        assert!(tracker.get_trace(third).is_some());
        assert_eq!(tracker.get_all_traces().len(), 2);
    }

    #[test]
    fn test_oversized_value_truncated() {
        let tracker = ExecutionTracker::new(TrackerConfig {
            max_traces: 10,
            max_value_size_bytes: 32,
        });
        let id = tracker.start_execution("demo");
        tracker.record_node_complete(
            id,
            "step",
            Some(Value::String("x".repeat(500))),
            1,
        );
        let trace = tracker.get_trace(id).unwrap();
        match trace.node_results["step"].value.as_ref().unwrap() {
            Value::String(s) => assert!(s.starts_with("<truncated:")),
            other => panic!("expected marker, got {:?}", other),
        }
    }

    #[test]
    fn test_clear() {
        let tracker = ExecutionTracker::default();
        tracker.start_execution("demo");
        tracker.clear();
        assert!(tracker.get_all_traces().is_empty());
    }

    #[test]
    fn test_from_runtime_state_projects_all_statuses() {
        use crate::dag::DagSpecBuilder;
        use crate::value::Type;
        use std::sync::Arc;
        use std::time::Duration;

        let mut builder = DagSpecBuilder::new("projected");
        let input = builder.data("input", Type::String);
        let middle = builder.data("middle", Type::String);
        let output = builder.data("output", Type::String);
        let fired = builder
            .module("fired", vec![("in", input)], vec![("out", middle)])
            .unwrap();
        let timed = builder
            .module("timed", vec![("in", middle)], vec![("out", output)])
            .unwrap();
        builder.output("result", output);
        let dag = Arc::new(builder.build().unwrap());

        let mut module_status = HashMap::new();
        module_status.insert(
            fired,
            ModuleStatus::Fired {
                duration: Duration::from_millis(12),
                context: None,
            },
        );
        module_status.insert(
            timed,
            ModuleStatus::Timed {
                duration: Duration::from_millis(250),
            },
        );
        let mut data = HashMap::new();
        data.insert(input, Value::String("seed".to_string()));
        data.insert(middle, Value::String("partial".to_string()));
        let execution_id = ExecutionId::new();
        let run_state = RunState {
            execution_id,
            dag,
            module_status,
            data,
            latency: Some(Duration::from_millis(300)),
        };

        let tracker = ExecutionTracker::default();
        let start_time = Utc::now();
        tracker.from_runtime_state(execution_id, "projected", &run_state, start_time);

        let trace = tracker.get_trace(execution_id).unwrap();
        assert_eq!(trace.dag_name, "projected");
        assert_eq!(trace.start_time, start_time);
        assert!(trace.end_time.is_some());

        let fired_node = &trace.node_results["fired"];
        assert_eq!(fired_node.status, NodeStatus::Completed);
        assert_eq!(fired_node.duration_ms, Some(12));

        let timed_node = &trace.node_results["timed"];
        assert_eq!(timed_node.status, NodeStatus::Failed);
        assert_eq!(timed_node.error.as_deref(), Some("Timed out"));
        assert_eq!(timed_node.duration_ms, Some(250));

        assert_eq!(
            trace.node_results["input"].value,
            Some(Value::String("seed".to_string()))
        );
        assert_eq!(
            trace.node_results["middle"].value,
            Some(Value::String("partial".to_string()))
        );
        assert!(!trace.node_results.contains_key("output"));
    }
}
