//! Task, Storage, TaskClass and Flow: the typed, validated configuration
//! entities produced by the declaration pass.
//!
//! Each concrete node enforces its own invariants on construction and exposes
//! `is_task()` / `is_flow()` discriminators via [`NodeRef`](crate::ids::NodeRef) —
//! no downcasting is required beyond that.

use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::edge::Edge;
use crate::error::{Result, SelinonError};
use crate::ident::check_identifier;
use crate::ids::{FlowId, NodeRef, StorageId, TaskClassId, TaskId};

/// `(name, import_path, options, entity_name)` — selects and instantiates a
/// cache class. `entity_name` is the owning storage or flow name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub name: String,
    pub import_path: String,
    #[serde(default)]
    pub options: serde_json::Value,
    pub entity_name: String,
}

/// A propagation flag is `false`, `true`, or a list of sub-flow nodes that should
/// receive the propagated information.
///
/// Config YAML for this shape is a plain bool or a list of flow-name strings —
/// neither round-trips through an untagged derive (a literal `true`/`false`
/// scalar never matches a unit variant, and a name list isn't a list of ids),
/// and resolving names to [`FlowId`] needs the system's name table anyway. So
/// parsing from raw config goes through [`crate::system`]'s
/// `parse_propagation`, not this type's own `Deserialize` impl; the derive
/// here only supports round-tripping an already-resolved `Flow`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum Propagation {
    #[default]
    False,
    True,
    List(Vec<FlowId>),
}

impl Propagation {
    pub fn is_true(&self) -> bool {
        matches!(self, Propagation::True)
    }

    pub fn list(&self) -> &[FlowId] {
        match self {
            Propagation::List(v) => v,
            _ => &[],
        }
    }

    /// Two propagation flags (plain vs compound) are disjoint iff at most one is
    /// `true` and their list forms share no sub-flow.
    pub fn disjoint_with(&self, other: &Propagation) -> bool {
        if self.is_true() && other.is_true() {
            return false;
        }
        let a: BTreeSet<_> = self.list().iter().collect();
        let b: BTreeSet<_> = other.list().iter().collect();
        a.is_disjoint(&b)
    }
}

/// Immutable after validation. See the data model section for the full
/// invariant list; this struct enforces the ones that are local to a single task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    pub class_name: String,
    pub import_path: String,
    pub storage: Option<StorageId>,
    pub storage_readonly: bool,
    pub storage_task_name: String,
    pub output_schema: Option<String>,
    pub max_retry: u32,
    pub retry_countdown: u32,
    pub queue_name: Option<String>,
    pub throttling: Option<Duration>,
    pub task_class: Option<TaskClassId>,
}

impl Task {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        class_name: Option<String>,
        import_path: String,
        storage: Option<StorageId>,
        storage_readonly: bool,
        storage_task_name: Option<String>,
        output_schema: Option<String>,
        max_retry: u32,
        retry_countdown: u32,
        queue_name: Option<String>,
        throttling: Option<Duration>,
    ) -> Result<Self> {
        check_identifier(&name)?;
        let class_name = class_name.unwrap_or_else(|| name.clone());
        check_identifier(&class_name)?;
        let storage_task_name = storage_task_name.unwrap_or_else(|| name.clone());
        check_identifier(&storage_task_name)?;

        if storage_readonly && storage.is_none() {
            return Err(SelinonError::Configuration(format!(
                "task '{name}': storage_readonly requires a storage"
            )));
        }
        if storage_task_name != name && storage.is_none() {
            return Err(SelinonError::Configuration(format!(
                "task '{name}': storage_task_name requires a storage"
            )));
        }
        if retry_countdown > 0 && max_retry == 0 {
            tracing::warn!(task = %name, "retry_countdown set but max_retry is 0");
        }

        Ok(Self {
            name,
            class_name,
            import_path,
            storage,
            storage_readonly,
            storage_task_name,
            output_schema,
            max_retry,
            retry_countdown,
            queue_name,
            throttling,
            task_class: None,
        })
    }

    pub fn is_task(&self) -> bool {
        true
    }

    pub fn is_flow(&self) -> bool {
        false
    }
}

/// Attributes: `name`, `import_path`, `class_name`, `configuration`,
/// `cache_config`, and the set of tasks that self-registered against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Storage {
    pub name: String,
    pub import_path: String,
    pub class_name: String,
    #[serde(default)]
    pub configuration: serde_json::Value,
    pub cache_config: Option<CacheConfig>,
    #[serde(default)]
    pub tasks: BTreeSet<TaskId>,
}

impl Storage {
    pub fn new(
        name: String,
        import_path: String,
        class_name: Option<String>,
        configuration: serde_json::Value,
        cache_config: Option<CacheConfig>,
    ) -> Result<Self> {
        check_identifier(&name)?;
        let class_name = class_name.unwrap_or_else(|| name.clone());
        Ok(Self {
            name,
            import_path,
            class_name,
            configuration,
            cache_config,
            tasks: BTreeSet::new(),
        })
    }

    /// Registers `task` as backed by this storage. Called during task
    /// construction; the membership key downstream is `(class_name, import_path)`.
    pub fn register_task(&mut self, task: TaskId) {
        self.tasks.insert(task);
    }
}

/// Tasks sharing the same `(class_name, import_path)` pair. Membership is keyed
/// by that pair, not by identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskClass {
    pub class_name: String,
    pub import_path: String,
    pub tasks: Vec<TaskId>,
}

impl TaskClass {
    pub fn key(class_name: &str, import_path: &str) -> (String, String) {
        (class_name.to_string(), import_path.to_string())
    }
}

/// A named DAG of edges. See [`crate::edge::Edge`] for the edge shape and
/// [`crate::failure::FailureGraph`] for `failures`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    pub name: String,
    pub edges: Vec<Edge>,
    pub failures: Option<crate::failure::FailureGraph>,
    #[serde(default)]
    pub nowait_nodes: BTreeSet<NodeRef>,
    #[serde(default)]
    pub node_args_from_first: bool,
    pub queue_name: Option<String>,
    pub strategy: Option<crate::strategy::StrategyBinding>,
    pub cache_config: Option<CacheConfig>,
    #[serde(default)]
    pub max_retry: u32,
    #[serde(default)]
    pub retry_countdown: u32,
    pub throttling: Option<Duration>,
    #[serde(default)]
    pub propagate_node_args: Propagation,
    #[serde(default)]
    pub propagate_parent: Propagation,
    #[serde(default)]
    pub propagate_parent_failures: Propagation,
    #[serde(default)]
    pub propagate_finished: Propagation,
    #[serde(default)]
    pub propagate_compound_finished: Propagation,
    #[serde(default)]
    pub propagate_failures: Propagation,
    #[serde(default)]
    pub propagate_compound_failures: Propagation,
}

impl Flow {
    pub fn new(name: String) -> Result<Self> {
        check_identifier(&name)?;
        Ok(Self {
            name,
            edges: Vec::new(),
            failures: None,
            nowait_nodes: BTreeSet::new(),
            node_args_from_first: false,
            queue_name: None,
            strategy: None,
            cache_config: None,
            max_retry: 0,
            retry_countdown: 0,
            throttling: None,
            propagate_node_args: Propagation::False,
            propagate_parent: Propagation::False,
            propagate_parent_failures: Propagation::False,
            propagate_finished: Propagation::False,
            propagate_compound_finished: Propagation::False,
            propagate_failures: Propagation::False,
            propagate_compound_failures: Propagation::False,
        })
    }

    /// The disjointness invariant from the data model: for each (plain,
    /// compound) pair at most one is `true`, and the list forms are pointwise
    /// disjoint.
    pub fn check_propagation_disjointness(&self) -> Result<()> {
        if !self
            .propagate_finished
            .disjoint_with(&self.propagate_compound_finished)
        {
            return Err(SelinonError::Configuration(format!(
                "flow '{}': propagate_finished and propagate_compound_finished are not disjoint",
                self.name
            )));
        }
        if !self
            .propagate_failures
            .disjoint_with(&self.propagate_compound_failures)
        {
            return Err(SelinonError::Configuration(format!(
                "flow '{}': propagate_failures and propagate_compound_failures are not disjoint",
                self.name
            )));
        }
        Ok(())
    }

    pub fn starting_edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(|e| e.nodes_from.is_empty())
    }

    pub fn is_task(&self) -> bool {
        false
    }

    pub fn is_flow(&self) -> bool {
        true
    }

    /// Union of every node appearing in some edge's `nodes_to`, used by the
    /// static checker's reachability rule and by the `nowait_nodes` bound.
    pub fn all_destination_nodes(&self) -> HashSet<NodeRef> {
        self.edges
            .iter()
            .flat_map(|e| e.nodes_to.iter().copied())
            .collect()
    }

    /// Union of every node appearing in some edge's `nodes_from`.
    pub fn all_source_nodes(&self) -> HashSet<NodeRef> {
        self.edges
            .iter()
            .flat_map(|e| e.nodes_from.iter().copied())
            .collect()
    }
}
