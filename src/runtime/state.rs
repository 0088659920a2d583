//! Final state of one execution

use crate::dag::{DagSpec, DataId, ModuleId};
use crate::module::ModuleStatus;
use crate::runtime::execution::ExecutionId;
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Result of an execution: per-node statuses and produced values
#[derive(Debug, Clone)]
pub struct RunState {
    pub execution_id: ExecutionId,
    pub dag: Arc<DagSpec>,
    pub module_status: HashMap<ModuleId, ModuleStatus>,
    /// Every data node that was computed (or seeded) during the run
    pub data: HashMap<DataId, Value>,
    /// Filled on terminal completion
    pub latency: Option<Duration>,
}

impl RunState {
    /// Value of a declared public output, if it was produced
    pub fn output(&self, name: &str) -> Option<&Value> {
        let data_id = self.dag.output_bindings.get(name)?;
        self.data.get(data_id)
    }

    /// Value of a data node looked up by node name
    pub fn data_by_name(&self, name: &str) -> Option<&Value> {
        let data_id = self.dag.data_by_name(name)?;
        self.data.get(&data_id)
    }

    /// Status of a module looked up by node name
    pub fn module_status_by_name(&self, name: &str) -> Option<&ModuleStatus> {
        let (module_id, _) = self
            .dag
            .modules
            .iter()
            .find(|(_, spec)| spec.name == name)?;
        self.module_status.get(module_id)
    }
}
