//! Two-pass configuration parser and the [`System`] arena it populates.
//!
//! Pass one declares every task, storage and flow and assigns it a stable id;
//! pass two resolves edges, failure descriptors and propagation settings
//! against those ids. Splitting the passes is what lets flow A reference
//! sub-flow B before B's own definition has been read — a flow can even
//! reference itself.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::edge::{Edge, Foreach};
use crate::error::{Result, SelinonError};
use crate::failure::FailureGraph;
use crate::ids::{FlowId, NodeRef, StorageId, TaskClassId, TaskId};
use crate::node::{CacheConfig, Flow, Propagation, Storage, Task, TaskClass};
use crate::predicate::{LeafRegistry, NodeNames, Predicate};
use crate::strategy::StrategyBinding;

#[derive(Debug, Deserialize)]
struct RawCache {
    name: String,
    #[serde(rename = "import")]
    import_path: String,
    #[serde(default)]
    options: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RawTask {
    name: String,
    #[serde(rename = "import")]
    import_path: String,
    classname: Option<String>,
    storage: Option<String>,
    #[serde(default)]
    storage_readonly: bool,
    storage_task_name: Option<String>,
    output_schema: Option<String>,
    #[serde(default)]
    max_retry: u32,
    #[serde(default)]
    retry_countdown: u32,
    queue: Option<String>,
    throttling: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawStorage {
    name: String,
    #[serde(rename = "import")]
    import_path: String,
    classname: Option<String>,
    #[serde(default)]
    configuration: serde_json::Value,
    cache: Option<RawCache>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RawGlobal {
    predicates_module: Option<String>,
    default_task_queue: Option<String>,
    default_dispatcher_queue: Option<String>,
    #[serde(default)]
    trace: bool,
}

#[derive(Debug, Deserialize)]
pub struct RawNodesFile {
    /// Required: absence is a `ConfigurationError`, not an empty system.
    tasks: Vec<RawTask>,
    /// Required: the names a `flow-definitions` entry is allowed to fill in.
    /// Pre-declaring names here (rather than inferring them from whichever
    /// flow files happen to be passed) is what lets flow files be split,
    /// reordered, or merged without changing meaning.
    flows: Vec<String>,
    #[serde(default)]
    storages: Vec<RawStorage>,
    #[serde(default)]
    global: Option<RawGlobal>,
    /// Unmatched top-level keys. The spec only promotes these to a warning,
    /// not a `ConfigurationError` — see [`System::load`].
    #[serde(flatten)]
    extra: serde_yaml::Mapping,
}

#[derive(Debug, Deserialize)]
struct RawForeach {
    function: String,
    #[serde(rename = "import")]
    import_path: String,
    #[serde(default)]
    propagate_result: bool,
}

#[derive(Debug, Deserialize)]
struct RawEdge {
    #[serde(default, rename = "from")]
    nodes_from: Vec<String>,
    #[serde(rename = "to")]
    nodes_to: Vec<String>,
    condition: Option<serde_yaml::Value>,
    foreach: Option<RawForeach>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawFallback {
    FlowFails(bool),
    Nodes(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct RawFailure {
    nodes: Vec<String>,
    fallback: RawFallback,
    #[serde(default)]
    propagate_failure: bool,
}

#[derive(Debug, Deserialize)]
struct RawStrategy {
    name: String,
    #[serde(default)]
    args: serde_json::Map<String, serde_json::Value>,
}

/// A single entry of a `flow-definitions:` list. One YAML file passed via
/// `-flow-definition` may declare several of these.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFlowDef {
    name: String,
    #[serde(default)]
    edges: Vec<RawEdge>,
    #[serde(default)]
    failures: Vec<RawFailure>,
    #[serde(default)]
    nowait: Vec<String>,
    #[serde(default)]
    node_args_from_first: bool,
    queue: Option<String>,
    strategy: Option<RawStrategy>,
    cache: Option<RawCache>,
    #[serde(default)]
    max_retry: u32,
    #[serde(default)]
    retry_countdown: u32,
    throttling: Option<f64>,
    /// Accepted but not modeled by this library: scoped to the in-process
    /// simulator / dispatcher sampling rate, which lives outside the compiler.
    sampling: Option<serde_yaml::Value>,
    #[serde(default)]
    propagate_node_args: serde_yaml::Value,
    #[serde(default)]
    propagate_parent: serde_yaml::Value,
    #[serde(default)]
    propagate_parent_failures: serde_yaml::Value,
    #[serde(default)]
    propagate_finished: serde_yaml::Value,
    #[serde(default)]
    propagate_compound_finished: serde_yaml::Value,
    #[serde(default)]
    propagate_failures: serde_yaml::Value,
    #[serde(default)]
    propagate_compound_failures: serde_yaml::Value,
}

#[derive(Debug, Deserialize, Default)]
pub struct RawFlowFile {
    #[serde(rename = "flow-definitions")]
    flow_definitions: Vec<RawFlowDef>,
}

/// Owns every task, flow, storage and task-class as a flat, indexable arena.
/// Cross-references between entities are [`NodeRef`]/`*Id` values resolved
/// against this table, never pointers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct System {
    pub tasks: Vec<Task>,
    pub flows: Vec<Flow>,
    pub storages: Vec<Storage>,
    pub task_classes: Vec<TaskClass>,
    /// The `global:` section of the nodes file, re-shaped per the design
    /// notes as a plain value rather than a process-wide mutable singleton.
    pub global: Option<GlobalConfig>,
    pub(crate) task_names: HashMap<String, TaskId>,
    pub(crate) flow_names: HashMap<String, FlowId>,
    pub(crate) storage_names: HashMap<String, StorageId>,
}

/// `global:` section: ambient defaults that apply across the whole
/// configuration rather than to one task, flow or storage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub predicates_module: Option<String>,
    pub default_task_queue: Option<String>,
    pub default_dispatcher_queue: Option<String>,
    pub trace: bool,
}

/// Resolves a raw `propagate_*` YAML value into a [`Propagation`]. The value
/// is `false`/`true`/absent or a list of sub-flow names; list entries are
/// resolved through `resolve` the same way `nowait`/edge node names are, and
/// must name a flow (propagating into a task makes no sense).
fn parse_propagation(
    value: serde_yaml::Value,
    resolve: &impl Fn(&str) -> Result<NodeRef>,
    flow_name: &str,
) -> Result<Propagation> {
    match value {
        serde_yaml::Value::Null => Ok(Propagation::False),
        serde_yaml::Value::Bool(b) => Ok(if b { Propagation::True } else { Propagation::False }),
        serde_yaml::Value::Sequence(items) => {
            let mut flows = Vec::with_capacity(items.len());
            for item in items {
                let name = item.as_str().ok_or_else(|| {
                    SelinonError::config_in(flow_name, "<propagation>", "list entries must be flow name strings")
                })?;
                match resolve(name)? {
                    NodeRef::Flow(id) => flows.push(id),
                    NodeRef::Task(_) => {
                        return Err(SelinonError::config_in(
                            flow_name,
                            name,
                            "propagation lists may only name flows, not tasks",
                        ));
                    }
                }
            }
            Ok(Propagation::List(flows))
        }
        other => Err(SelinonError::config_in(
            flow_name,
            "<propagation>",
            format!("expected a bool or a list of flow names, got {other:?}"),
        )),
    }
}

impl System {
    pub fn task(&self, id: TaskId) -> &Task {
        &self.tasks[id.index()]
    }

    pub fn flow(&self, id: FlowId) -> &Flow {
        &self.flows[id.index()]
    }

    pub fn storage(&self, id: StorageId) -> &Storage {
        &self.storages[id.index()]
    }

    pub fn flow_by_name(&self, name: &str) -> Result<FlowId> {
        self.flow_names
            .get(name)
            .copied()
            .ok_or_else(|| SelinonError::UnknownFlow(name.to_string()))
    }

    pub fn task_by_name(&self, name: &str) -> Result<TaskId> {
        self.task_names
            .get(name)
            .copied()
            .ok_or_else(|| SelinonError::UnknownTask(name.to_string()))
    }

    pub fn node_by_name(&self, name: &str) -> Result<NodeRef> {
        if let Some(id) = self.task_names.get(name) {
            return Ok(NodeRef::Task(*id));
        }
        if let Some(id) = self.flow_names.get(name) {
            return Ok(NodeRef::Flow(*id));
        }
        Err(SelinonError::UnknownTask(name.to_string()))
    }

    pub fn node_name(&self, node: NodeRef) -> &str {
        match node {
            NodeRef::Task(id) => &self.task(id).name,
            NodeRef::Flow(id) => &self.flow(id).name,
        }
    }

    pub fn is_storage_readonly(&self, node: NodeRef) -> bool {
        match node {
            NodeRef::Task(id) => self.task(id).storage_readonly,
            NodeRef::Flow(_) => false,
        }
    }

    /// Reads `nodes_path` and every path in `flow_paths`, parses them, and
    /// builds a fully validated `System`.
    pub fn load(nodes_path: &Path, flow_paths: &[std::path::PathBuf], registry: &LeafRegistry) -> Result<Self> {
        let nodes_raw: RawNodesFile = serde_yaml::from_str(&std::fs::read_to_string(nodes_path)?)?;
        let mut flow_raws = Vec::with_capacity(flow_paths.len());
        for path in flow_paths {
            let raw: RawFlowFile = serde_yaml::from_str(&std::fs::read_to_string(path)?)?;
            flow_raws.push(raw);
        }
        Self::build(nodes_raw, flow_raws, registry)
    }

    /// Builds a `System` from already-parsed nodes/flow DTOs. Exposed mainly
    /// for callers that parse YAML themselves (tests, benches); [`System::load`]
    /// is the usual entry point.
    pub fn build(nodes: RawNodesFile, flow_files: Vec<RawFlowFile>, registry: &LeafRegistry) -> Result<Self> {
        let mut system = System::default();

        const KNOWN_TOP_LEVEL_KEYS: &[&str] = &["tasks", "storages", "global"];
        for key in nodes.extra.keys() {
            let key_name = key.as_str().unwrap_or("<non-string key>");
            if !KNOWN_TOP_LEVEL_KEYS.contains(&key_name) {
                tracing::warn!(key = key_name, "unknown top-level key in nodes definition file");
            }
        }
        system.global = nodes.global.map(|g| GlobalConfig {
            predicates_module: g.predicates_module,
            default_task_queue: g.default_task_queue,
            default_dispatcher_queue: g.default_dispatcher_queue,
            trace: g.trace,
        });

        let flow_defs: Vec<RawFlowDef> = flow_files.into_iter().flat_map(|f| f.flow_definitions).collect();

        // Pass 1a: storages.
        for raw in nodes.storages {
            let cache_config = raw.cache.map(|c| CacheConfig {
                name: c.name,
                import_path: c.import_path,
                options: c.options,
                entity_name: raw.name.clone(),
            });
            let id = StorageId(system.storages.len() as u32);
            let storage = Storage::new(raw.name.clone(), raw.import_path, raw.classname, raw.configuration, cache_config)?;
            if system.storage_names.insert(raw.name.clone(), id).is_some() {
                return Err(SelinonError::Configuration(format!("duplicate storage name '{}'", raw.name)));
            }
            system.storages.push(storage);
        }

        // Pass 1b: tasks (may reference storages, already known).
        for raw in nodes.tasks {
            if system.task_names.contains_key(&raw.name) {
                return Err(SelinonError::Configuration(format!("duplicate task name '{}'", raw.name)));
            }
            let storage = match &raw.storage {
                Some(name) => Some(
                    *system
                        .storage_names
                        .get(name)
                        .ok_or_else(|| SelinonError::UnknownStorage(name.clone()))?,
                ),
                None => None,
            };
            let queue = raw.queue.or_else(|| {
                system
                    .global
                    .as_ref()
                    .and_then(|g| g.default_task_queue.clone())
            });
            let queue = queue.map(|q| crate::envvar::expand(&q)).transpose()?;
            let id = TaskId(system.tasks.len() as u32);
            let task = Task::new(
                raw.name.clone(),
                raw.classname,
                raw.import_path,
                storage,
                raw.storage_readonly,
                raw.storage_task_name,
                raw.output_schema,
                raw.max_retry,
                raw.retry_countdown,
                queue,
                raw.throttling.map(Duration::from_secs_f64),
            )?;
            system.task_names.insert(raw.name, id);
            if let Some(storage_id) = storage {
                system.storages[storage_id.index()].register_task(id);
            }
            system.tasks.push(task);
        }

        // Pass 1c: declare every flow named in the nodes file's `flows:` list
        // up front, so forward/circular references between flow definition
        // files resolve regardless of file order.
        for name in nodes.flows {
            if system.task_names.contains_key(&name) {
                return Err(SelinonError::Configuration(format!(
                    "'{name}' is declared as both a task and a flow"
                )));
            }
            if system.flow_names.contains_key(&name) {
                return Err(SelinonError::Configuration(format!("duplicate flow name '{name}'")));
            }
            let id = FlowId(system.flows.len() as u32);
            system.flow_names.insert(name.clone(), id);
            system.flows.push(Flow::new(name)?);
        }

        // Pass 2: fill in each flow's edges, failures and propagation
        // settings. A flow-definitions entry naming a flow absent from the
        // nodes file's `flows:` list is an unknown-flow error, not an
        // implicit declaration.
        let mut defined: std::collections::HashSet<FlowId> = std::collections::HashSet::new();
        for raw in flow_defs {
            let flow_id = system.flow_by_name(&raw.name)?;
            if !defined.insert(flow_id) {
                return Err(SelinonError::Configuration(format!(
                    "flow '{}' is defined more than once",
                    raw.name
                )));
            }
            system.fill_flow(flow_id, raw, registry)?;
        }

        system.build_task_classes();
        system.post_parse_check(registry)?;
        Ok(system)
    }

    fn fill_flow(&mut self, flow_id: FlowId, raw: RawFlowDef, registry: &LeafRegistry) -> Result<()> {
        let resolve = |name: &str| self.node_by_name(name);

        let mut edges = Vec::with_capacity(raw.edges.len());
        for raw_edge in raw.edges {
            let nodes_from = raw_edge
                .nodes_from
                .iter()
                .map(|n| resolve(n))
                .collect::<Result<Vec<_>>>()?;
            let nodes_to = raw_edge
                .nodes_to
                .iter()
                .map(|n| resolve(n))
                .collect::<Result<Vec<_>>>()?;
            let predicate = match &raw_edge.condition {
                Some(tree) => Predicate::construct(tree, &nodes_from, flow_id, registry, &resolve)?,
                None => Predicate::AlwaysTrue,
            };
            let foreach = raw_edge.foreach.map(|f| Foreach {
                function: f.function,
                import_path: f.import_path,
                propagate_result: f.propagate_result,
            });
            edges.push(Edge::new(nodes_from, nodes_to, predicate, flow_id, foreach)?);
        }

        let mut failures = FailureGraph::new();
        for raw_failure in raw.failures {
            let nodes = raw_failure
                .nodes
                .iter()
                .map(|n| resolve(n))
                .collect::<Result<Vec<_>>>()?;
            let fallback = match raw_failure.fallback {
                RawFallback::FlowFails(true) => crate::failure::Fallback::FlowFails,
                RawFallback::FlowFails(false) => crate::failure::Fallback::Nodes(Vec::new()),
                RawFallback::Nodes(names) => crate::failure::Fallback::Nodes(
                    names.iter().map(|n| resolve(n)).collect::<Result<Vec<_>>>()?,
                ),
            };
            failures.insert(&nodes, fallback, raw_failure.propagate_failure)?;
        }

        let nowait_nodes = raw
            .nowait
            .iter()
            .map(|n| resolve(n))
            .collect::<Result<BTreeSet<_>>>()?;

        let strategy = raw.strategy.map(|s| StrategyBinding {
            function: s.name,
            args: s.args,
        });

        let cache_config = raw.cache.map(|c| CacheConfig {
            name: c.name,
            import_path: c.import_path,
            options: c.options,
            entity_name: raw.name.clone(),
        });

        let flow = &mut self.flows[flow_id.index()];
        flow.edges = edges;
        flow.failures = if failures.all_waiting_nodes().is_empty() {
            None
        } else {
            Some(failures)
        };
        flow.nowait_nodes = nowait_nodes;
        flow.node_args_from_first = raw.node_args_from_first;
        let dispatcher_queue = raw.queue.or_else(|| {
            self.global
                .as_ref()
                .and_then(|g| g.default_dispatcher_queue.clone())
        });
        flow.queue_name = dispatcher_queue.map(|q| crate::envvar::expand(&q)).transpose()?;
        flow.strategy = strategy;
        flow.cache_config = cache_config;
        flow.max_retry = raw.max_retry;
        flow.retry_countdown = raw.retry_countdown;
        flow.throttling = raw.throttling.map(Duration::from_secs_f64);
        flow.propagate_node_args = parse_propagation(raw.propagate_node_args, &resolve, &raw.name)?;
        flow.propagate_parent = parse_propagation(raw.propagate_parent, &resolve, &raw.name)?;
        flow.propagate_parent_failures = parse_propagation(raw.propagate_parent_failures, &resolve, &raw.name)?;
        flow.propagate_finished = parse_propagation(raw.propagate_finished, &resolve, &raw.name)?;
        flow.propagate_compound_finished = parse_propagation(raw.propagate_compound_finished, &resolve, &raw.name)?;
        flow.propagate_failures = parse_propagation(raw.propagate_failures, &resolve, &raw.name)?;
        flow.propagate_compound_failures = parse_propagation(raw.propagate_compound_failures, &resolve, &raw.name)?;

        Ok(())
    }

    fn build_task_classes(&mut self) {
        let mut index: BTreeMap<(String, String), TaskClassId> = BTreeMap::new();
        for i in 0..self.tasks.len() {
            let key = TaskClass::key(&self.tasks[i].class_name, &self.tasks[i].import_path);
            let class_id = *index.entry(key.clone()).or_insert_with(|| {
                let id = TaskClassId(self.task_classes.len() as u32);
                self.task_classes.push(TaskClass {
                    class_name: key.0.clone(),
                    import_path: key.1.clone(),
                    tasks: Vec::new(),
                });
                id
            });
            self.task_classes[class_id.index()].tasks.push(TaskId(i as u32));
            self.tasks[i].task_class = Some(class_id);
        }
    }

    /// Per-flow invariants that need the full arena: propagation
    /// disjointness and the edge-level cross-cutting rules.
    fn post_parse_check(&self, registry: &LeafRegistry) -> Result<()> {
        for flow in &self.flows {
            if flow.edges.is_empty() {
                return Err(SelinonError::Configuration(format!("flow '{}' has no edges", flow.name)));
            }
            if flow.starting_edges().next().is_none() {
                return Err(SelinonError::Configuration(format!(
                    "flow '{}' has no starting edge (an edge with an empty 'from')",
                    flow.name
                )));
            }
            flow.check_propagation_disjointness()?;
            for edge in &flow.edges {
                edge.check(registry, |node| self.is_storage_readonly(node))?;
                edge.predicate.check(registry)?;
            }
        }
        Ok(())
    }
}

impl NodeNames for System {
    fn flow_name(&self, flow: FlowId) -> &str {
        &self.flow(flow).name
    }

    fn node_name(&self, node: NodeRef) -> &str {
        System::node_name(self, node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn registry() -> LeafRegistry {
        let mut reg = LeafRegistry::new();
        reg.register(
            "alwaysTrue",
            crate::predicate::LeafSignature::default(),
            Some(Arc::new(|_| true)),
        );
        reg
    }

    fn nodes_yaml(flow_names: &[&str]) -> RawNodesFile {
        let flows: String = flow_names.iter().map(|f| format!("  - {f}\n")).collect();
        serde_yaml::from_str(&format!(
            "tasks:\n  - name: Task1\n    import: mypkg.tasks\n  - name: Task2\n    import: mypkg.tasks\nstorages: []\nflows:\n{flows}"
        ))
        .unwrap()
    }

    fn flow_yaml(flow: &str, edges: &str) -> RawFlowFile {
        let indented: String = edges.lines().map(|l| format!("    {l}\n")).collect();
        serde_yaml::from_str(&format!("flow-definitions:\n  - name: {flow}\n    edges:\n{indented}")).unwrap()
    }

    #[test]
    fn builds_a_simple_two_task_flow() {
        let flows = vec![flow_yaml(
            "flow1",
            "  - from: []\n    to: [Task1]\n  - from: [Task1]\n    to: [Task2]\n",
        )];
        let system = System::build(nodes_yaml(&["flow1"]), flows, &registry()).unwrap();
        assert_eq!(system.tasks.len(), 2);
        assert_eq!(system.flows.len(), 1);
        let flow = &system.flows[0];
        assert_eq!(flow.edges.len(), 2);
        assert!(flow.starting_edges().count() == 1);
    }

    #[test]
    fn flows_may_reference_each_other_circularly() {
        let flows = vec![
            flow_yaml("flowA", "  - from: []\n    to: [flowB]\n"),
            flow_yaml("flowB", "  - from: []\n    to: [flowA]\n"),
        ];
        let system = System::build(nodes_yaml(&["flowA", "flowB"]), flows, &registry()).unwrap();
        assert_eq!(system.flows.len(), 2);
        assert!(system.flow_by_name("flowA").is_ok());
        assert!(system.flow_by_name("flowB").is_ok());
    }

    #[test]
    fn unknown_node_reference_is_rejected() {
        let flows = vec![flow_yaml("flow1", "  - from: []\n    to: [NoSuchTask]\n")];
        assert!(System::build(nodes_yaml(&["flow1"]), flows, &registry()).is_err());
    }

    #[test]
    fn duplicate_task_name_is_rejected() {
        let mut nodes = nodes_yaml(&[]);
        let dup = RawTask {
            name: "Task1".to_string(),
            import_path: "mypkg.tasks".to_string(),
            classname: None,
            storage: None,
            storage_readonly: false,
            storage_task_name: None,
            output_schema: None,
            max_retry: 0,
            retry_countdown: 0,
            queue: None,
            throttling: None,
        };
        nodes.tasks.push(dup);
        assert!(System::build(nodes, vec![], &registry()).is_err());
    }

    #[test]
    fn task_queue_falls_back_to_global_default_and_expands_env_vars() {
        std::env::set_var("SELINONLIB_TEST_SYSTEM_QUEUE_ENV", "prod");
        let mut nodes: RawNodesFile = serde_yaml::from_str(
            "tasks:\n  - name: Task1\n    import: mypkg.tasks\n  - name: Task2\n    import: mypkg.tasks\n    queue: explicit_{SELINONLIB_TEST_SYSTEM_QUEUE_ENV}\nstorages: []\nflows: []\nglobal:\n  default_task_queue: fallback_{SELINONLIB_TEST_SYSTEM_QUEUE_ENV}\n",
        )
        .unwrap();
        nodes.tasks.truncate(2);
        let system = System::build(nodes, vec![], &registry()).unwrap();
        std::env::remove_var("SELINONLIB_TEST_SYSTEM_QUEUE_ENV");

        let task1 = &system.tasks[system.task_names.get("Task1").unwrap().index()];
        let task2 = &system.tasks[system.task_names.get("Task2").unwrap().index()];
        assert_eq!(task1.queue_name.as_deref(), Some("fallback_prod"));
        assert_eq!(task2.queue_name.as_deref(), Some("explicit_prod"));
    }

    #[test]
    fn task_queue_with_unset_env_var_is_a_configuration_error() {
        std::env::remove_var("SELINONLIB_TEST_SYSTEM_QUEUE_ENV_MISSING");
        let nodes: RawNodesFile = serde_yaml::from_str(
            "tasks:\n  - name: Task1\n    import: mypkg.tasks\n    queue: queue_{SELINONLIB_TEST_SYSTEM_QUEUE_ENV_MISSING}\nstorages: []\nflows: []\n",
        )
        .unwrap();
        assert!(System::build(nodes, vec![], &registry()).is_err());
    }

    #[test]
    fn propagation_flags_accept_bool_and_subflow_name_list() {
        let nodes = nodes_yaml(&["parent", "child"]);
        let flows = vec![
            flow_yaml("parent", "  - from: []\n    to: [child]\n"),
            RawFlowFile {
                flow_definitions: vec![serde_yaml::from_str(
                    "name: child\nedges: []\npropagate_finished: true\npropagate_failures: [parent]\n",
                )
                .unwrap()],
            },
        ];
        let system = System::build(nodes, flows, &registry()).unwrap();
        let child = &system.flows[system.flow_names["child"].index()];
        assert!(child.propagate_finished.is_true());
        assert_eq!(child.propagate_failures.list(), &[system.flow_names["parent"]]);
        assert!(matches!(child.propagate_node_args, Propagation::False));
    }

    #[test]
    fn propagation_list_entry_naming_a_task_is_rejected() {
        let nodes = nodes_yaml(&["flow1"]);
        let flows = vec![RawFlowFile {
            flow_definitions: vec![serde_yaml::from_str(
                "name: flow1\nedges: []\npropagate_finished: [Task1]\n",
            )
            .unwrap()],
        }];
        assert!(System::build(nodes, flows, &registry()).is_err());
    }
}
