//! Compiled pipeline description
//!
//! A `DagSpec` is the immutable output of an external compiler: module nodes
//! with typed ports, data nodes with a type and port bindings, and the two
//! edge sets connecting them. The graph is bipartite (data <-> module) and
//! acyclic. `validate` makes the structural invariants executable;
//! `DagSpecBuilder` assembles specs by hand.

use crate::error::{ConstellationError, ConstellationResult};
use crate::module::ModuleCallOptions;
use crate::value::Type;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use uuid::Uuid;

/// Module node identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(pub Uuid);

impl ModuleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ModuleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Data node identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataId(pub Uuid);

impl DataId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DataId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Pipeline metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DagMetadata {
    pub name: String,
    pub description: String,
    pub version: String,
}

/// A module node: a named computation with typed input and output ports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleNodeSpec {
    pub name: String,
    /// Input port name -> type
    pub consumes: HashMap<String, Type>,
    /// Output port name -> type
    pub produces: HashMap<String, Type>,
    /// Per-dag default call options; overridable per run
    #[serde(default)]
    pub options: ModuleCallOptions,
}

/// A data node: a typed value slot with a port binding per connected module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataNodeSpec {
    pub name: String,
    pub data_type: Type,
    /// Port name at each module endpoint this node connects to
    pub port_bindings: HashMap<ModuleId, String>,
}

/// Immutable description of one compiled pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagSpec {
    pub metadata: DagMetadata,
    pub modules: HashMap<ModuleId, ModuleNodeSpec>,
    pub data: HashMap<DataId, DataNodeSpec>,
    /// Data consumed by module
    pub in_edges: HashSet<(DataId, ModuleId)>,
    /// Data produced by module
    pub out_edges: HashSet<(ModuleId, DataId)>,
    /// Public output names, in declaration order
    pub declared_outputs: Vec<String>,
    /// Public output name -> backing data node
    pub output_bindings: HashMap<String, DataId>,
}

impl DagSpec {
    /// The unique module producing a data node, if any
    pub fn producer_of(&self, data_id: DataId) -> Option<ModuleId> {
        self.out_edges
            .iter()
            .find(|(_, d)| *d == data_id)
            .map(|(m, _)| *m)
    }

    /// Data nodes consumed by a module
    pub fn inputs_of(&self, module_id: ModuleId) -> Vec<DataId> {
        self.in_edges
            .iter()
            .filter(|(_, m)| *m == module_id)
            .map(|(d, _)| *d)
            .collect()
    }

    /// Look up a data node by its name
    pub fn data_by_name(&self, name: &str) -> Option<DataId> {
        self.data
            .iter()
            .find(|(_, spec)| spec.name == name)
            .map(|(id, _)| *id)
    }

    /// Check the structural invariants: edge referential integrity, port
    /// binding uniqueness, and bipartite acyclicity.
    pub fn validate(&self) -> ConstellationResult<()> {
        self.validate_edge_references()?;
        self.validate_port_bindings()?;
        self.validate_acyclic()?;
        for name in &self.declared_outputs {
            let data_id = self.output_bindings.get(name).ok_or_else(|| {
                ConstellationError::InvalidDag(format!(
                    "declared output '{}' has no binding",
                    name
                ))
            })?;
            if !self.data.contains_key(data_id) {
                return Err(ConstellationError::InvalidDag(format!(
                    "output '{}' is bound to unknown data node {}",
                    name, data_id
                )));
            }
        }
        Ok(())
    }

    fn validate_edge_references(&self) -> ConstellationResult<()> {
        for (data_id, module_id) in &self.in_edges {
            if !self.data.contains_key(data_id) {
                return Err(ConstellationError::InvalidDag(format!(
                    "in-edge references unknown data node {}",
                    data_id
                )));
            }
            if !self.modules.contains_key(module_id) {
                return Err(ConstellationError::InvalidDag(format!(
                    "in-edge references unknown module {}",
                    module_id
                )));
            }
        }
        for (module_id, data_id) in &self.out_edges {
            if !self.modules.contains_key(module_id) {
                return Err(ConstellationError::InvalidDag(format!(
                    "out-edge references unknown module {}",
                    module_id
                )));
            }
            if !self.data.contains_key(data_id) {
                return Err(ConstellationError::InvalidDag(format!(
                    "out-edge references unknown data node {}",
                    data_id
                )));
            }
        }
        Ok(())
    }

    fn validate_port_bindings(&self) -> ConstellationResult<()> {
        for (module_id, module) in &self.modules {
            let mut incoming: HashMap<&str, u32> = HashMap::new();
            for (data_id, m) in &self.in_edges {
                if m != module_id {
                    continue;
                }
                let data = self.data.get(data_id).ok_or_else(|| {
                    ConstellationError::InvalidDag(format!("unknown data node {}", data_id))
                })?;
                let port = data.port_bindings.get(module_id).ok_or_else(|| {
                    ConstellationError::InvalidDag(format!(
                        "data node '{}' feeds module '{}' without a port binding",
                        data.name, module.name
                    ))
                })?;
                *incoming.entry(port.as_str()).or_insert(0) += 1;
            }
            for port in module.consumes.keys() {
                match incoming.get(port.as_str()).copied() {
                    Some(1) => {}
                    Some(n) => {
                        return Err(ConstellationError::InvalidDag(format!(
                            "input port '{}' of module '{}' has {} incoming data nodes",
                            port, module.name, n
                        )))
                    }
                    None => {
                        return Err(ConstellationError::InvalidDag(format!(
                            "input port '{}' of module '{}' is unbound",
                            port, module.name
                        )))
                    }
                }
            }

            let mut outgoing: HashMap<&str, u32> = HashMap::new();
            for (m, data_id) in &self.out_edges {
                if m != module_id {
                    continue;
                }
                let data = self.data.get(data_id).ok_or_else(|| {
                    ConstellationError::InvalidDag(format!("unknown data node {}", data_id))
                })?;
                let port = data.port_bindings.get(module_id).ok_or_else(|| {
                    ConstellationError::InvalidDag(format!(
                        "data node '{}' is produced by module '{}' without a port binding",
                        data.name, module.name
                    ))
                })?;
                *outgoing.entry(port.as_str()).or_insert(0) += 1;
            }
            // A produces port may be unused, but never doubly wired.
            for (port, n) in outgoing {
                if n > 1 {
                    return Err(ConstellationError::InvalidDag(format!(
                        "output port '{}' of module '{}' has {} outgoing data nodes",
                        port, module.name, n
                    )));
                }
            }
        }
        Ok(())
    }

    fn validate_acyclic(&self) -> ConstellationResult<()> {
        // Kahn's algorithm over the bipartite node set.
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        enum Node {
            Data(DataId),
            Module(ModuleId),
        }

        let mut indegree: HashMap<Node, usize> = HashMap::new();
        let mut successors: HashMap<Node, Vec<Node>> = HashMap::new();
        for id in self.data.keys() {
            indegree.entry(Node::Data(*id)).or_insert(0);
        }
        for id in self.modules.keys() {
            indegree.entry(Node::Module(*id)).or_insert(0);
        }
        for (data_id, module_id) in &self.in_edges {
            *indegree.entry(Node::Module(*module_id)).or_insert(0) += 1;
            successors
                .entry(Node::Data(*data_id))
                .or_default()
                .push(Node::Module(*module_id));
        }
        for (module_id, data_id) in &self.out_edges {
            *indegree.entry(Node::Data(*data_id)).or_insert(0) += 1;
            successors
                .entry(Node::Module(*module_id))
                .or_default()
                .push(Node::Data(*data_id));
        }

        let mut ready: VecDeque<Node> = indegree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(n, _)| *n)
            .collect();
        let mut processed = 0usize;
        while let Some(node) = ready.pop_front() {
            processed += 1;
            if let Some(next) = successors.get(&node) {
                for succ in next {
                    if let Some(d) = indegree.get_mut(succ) {
                        *d -= 1;
                        if *d == 0 {
                            ready.push_back(*succ);
                        }
                    }
                }
            }
        }
        if processed != indegree.len() {
            return Err(ConstellationError::InvalidDag(format!(
                "graph '{}' contains a cycle",
                self.metadata.name
            )));
        }
        Ok(())
    }
}

/// Incremental assembly of a `DagSpec`
///
/// Port types on module nodes are pulled from the data nodes they wire to;
/// `build` runs the full validation pass.
pub struct DagSpecBuilder {
    metadata: DagMetadata,
    modules: HashMap<ModuleId, ModuleNodeSpec>,
    data: HashMap<DataId, DataNodeSpec>,
    in_edges: HashSet<(DataId, ModuleId)>,
    out_edges: HashSet<(ModuleId, DataId)>,
    declared_outputs: Vec<String>,
    output_bindings: HashMap<String, DataId>,
}

impl DagSpecBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            metadata: DagMetadata {
                name: name.to_string(),
                description: String::new(),
                version: "1.0".to_string(),
            },
            modules: HashMap::new(),
            data: HashMap::new(),
            in_edges: HashSet::new(),
            out_edges: HashSet::new(),
            declared_outputs: Vec::new(),
            output_bindings: HashMap::new(),
        }
    }

    pub fn description(&mut self, description: &str) -> &mut Self {
        self.metadata.description = description.to_string();
        self
    }

    pub fn version(&mut self, version: &str) -> &mut Self {
        self.metadata.version = version.to_string();
        self
    }

    /// Add a data node and return its id
    pub fn data(&mut self, name: &str, data_type: Type) -> DataId {
        let id = DataId::new();
        self.data.insert(
            id,
            DataNodeSpec {
                name: name.to_string(),
                data_type,
                port_bindings: HashMap::new(),
            },
        );
        id
    }

    /// Add a module node wired to existing data nodes.
    ///
    /// `consumes` and `produces` are (port name, data node) pairs; port types
    /// are taken from the data nodes.
    pub fn module(
        &mut self,
        name: &str,
        consumes: Vec<(&str, DataId)>,
        produces: Vec<(&str, DataId)>,
    ) -> ConstellationResult<ModuleId> {
        let module_id = ModuleId::new();
        let mut consume_ports = HashMap::new();
        for (port, data_id) in &consumes {
            let data = self.data.get_mut(data_id).ok_or_else(|| {
                ConstellationError::InvalidDag(format!(
                    "module '{}' consumes unknown data node {}",
                    name, data_id
                ))
            })?;
            data.port_bindings.insert(module_id, port.to_string());
            consume_ports.insert(port.to_string(), data.data_type.clone());
            self.in_edges.insert((*data_id, module_id));
        }
        let mut produce_ports = HashMap::new();
        for (port, data_id) in &produces {
            let data = self.data.get_mut(data_id).ok_or_else(|| {
                ConstellationError::InvalidDag(format!(
                    "module '{}' produces unknown data node {}",
                    name, data_id
                ))
            })?;
            data.port_bindings.insert(module_id, port.to_string());
            produce_ports.insert(port.to_string(), data.data_type.clone());
            self.out_edges.insert((module_id, *data_id));
        }
        self.modules.insert(
            module_id,
            ModuleNodeSpec {
                name: name.to_string(),
                consumes: consume_ports,
                produces: produce_ports,
                options: ModuleCallOptions::default(),
            },
        );
        Ok(module_id)
    }

    /// Set per-dag default call options on a module node
    pub fn options(&mut self, module_id: ModuleId, options: ModuleCallOptions) -> &mut Self {
        if let Some(module) = self.modules.get_mut(&module_id) {
            module.options = options;
        }
        self
    }

    /// Declare a public output backed by a data node
    pub fn output(&mut self, name: &str, data_id: DataId) -> &mut Self {
        self.declared_outputs.push(name.to_string());
        self.output_bindings.insert(name.to_string(), data_id);
        self
    }

    /// Finish assembly, validating the spec
    pub fn build(self) -> ConstellationResult<DagSpec> {
        let spec = DagSpec {
            metadata: self.metadata,
            modules: self.modules,
            data: self.data,
            in_edges: self.in_edges,
            out_edges: self.out_edges,
            declared_outputs: self.declared_outputs,
            output_bindings: self.output_bindings,
        };
        spec.validate()?;
        Ok(spec)
    }
}
