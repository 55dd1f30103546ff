//! Plan emitter: turns a checked [`System`] into the artifact the runtime
//! actually dispatches against.
//!
//! The artifact is plain, serializable data — no closures, no trait objects —
//! so it round-trips through JSON and is safe to diff between two compiles of
//! the same configuration. Predicate bodies are carried as the rendered
//! [`crate::predicate::SourceExpr`] text so the runtime never needs to parse
//! YAML or walk the predicate tree again.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::failure::Fallback;
use crate::ids::NodeRef;
use crate::node::{CacheConfig, Propagation};
use crate::predicate::LeafRegistry;
use crate::system::System;

/// A propagation flag as emitted in a plan artifact: always one of these
/// three shapes, regardless of whether the source YAML spelled it as a bare
/// bool or a list of sub-flow names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanPropagation {
    False,
    True,
    List(Vec<String>),
}

fn plan_propagation(system: &System, p: &Propagation) -> PlanPropagation {
    match p {
        Propagation::False => PlanPropagation::False,
        Propagation::True => PlanPropagation::True,
        Propagation::List(flows) => {
            PlanPropagation::List(flows.iter().map(|f| system.flow(*f).name.clone()).collect())
        }
    }
}

/// The seven propagation flag maps from §3/§4.H, carried per flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanPropagationFlags {
    pub propagate_node_args: PlanPropagation,
    pub propagate_parent: PlanPropagation,
    pub propagate_parent_failures: PlanPropagation,
    pub propagate_finished: PlanPropagation,
    pub propagate_compound_finished: PlanPropagation,
    pub propagate_failures: PlanPropagation,
    pub propagate_compound_failures: PlanPropagation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanHeader {
    pub format_version: u32,
    pub tool_version: String,
    /// ISO8601 UTC. Supplied by the caller — this module never reads the
    /// clock, so the same `System` always emits the same body.
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanForeach {
    pub function: String,
    pub import_path: String,
    pub propagate_result: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanEdge {
    pub nodes_from: Vec<String>,
    pub nodes_to: Vec<String>,
    pub condition_source: String,
    pub foreach: Option<PlanForeach>,
}

/// `storage2storage_cache` / `async_result_cache` entry: which cache class
/// backs a given storage or flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanCacheConfig {
    pub name: String,
    pub import_path: String,
    pub options: serde_json::Value,
    pub entity_name: String,
}

fn plan_cache_config(c: &CacheConfig) -> PlanCacheConfig {
    PlanCacheConfig {
        name: c.name.clone(),
        import_path: c.import_path.clone(),
        options: c.options.clone(),
        entity_name: c.entity_name.clone(),
    }
}

/// Mirrors [`crate::failure::Fallback`] in plan-artifact (string-keyed) form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanFallback {
    Nodes(Vec<String>),
    FlowFails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanFailureEntry {
    pub failed: Vec<String>,
    pub fallback: PlanFallback,
    pub propagate_failure: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanFlow {
    pub name: String,
    pub edges: Vec<PlanEdge>,
    pub failures: Vec<PlanFailureEntry>,
    pub nowait_nodes: Vec<String>,
    pub node_args_from_first: bool,
    pub queue_name: Option<String>,
    pub strategy: Option<crate::strategy::StrategyBinding>,
    pub max_retry: u32,
    pub retry_countdown: u32,
    pub throttling_secs: Option<f64>,
    pub propagation: PlanPropagationFlags,
    pub cache_config: Option<PlanCacheConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanTask {
    pub name: String,
    pub class_name: String,
    pub import_path: String,
    pub storage: Option<String>,
    pub storage_readonly: bool,
    pub storage_task_name: String,
    pub output_schema: Option<String>,
    pub max_retry: u32,
    pub retry_countdown: u32,
    pub queue_name: Option<String>,
    pub throttling_secs: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStorage {
    pub name: String,
    pub class_name: String,
    pub import_path: String,
    pub configuration: serde_json::Value,
    pub cache_config: Option<PlanCacheConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanArtifact {
    pub header: PlanHeader,
    pub flows: Vec<PlanFlow>,
    pub tasks: Vec<PlanTask>,
    pub storages: Vec<PlanStorage>,
}

fn node_names(system: &System, nodes: &[NodeRef]) -> Vec<String> {
    nodes.iter().map(|n| system.node_name(*n).to_string()).collect()
}

/// Compiles `system` into a serializable plan. Call after [`crate::check::check_system`].
pub fn emit(
    system: &System,
    registry: &LeafRegistry,
    tool_version: impl Into<String>,
    generated_at: impl Into<String>,
) -> Result<PlanArtifact> {
    let mut flows = Vec::with_capacity(system.flows.len());
    for flow in &system.flows {
        let mut edges = Vec::with_capacity(flow.edges.len());
        for edge in &flow.edges {
            let foreach = edge.foreach.as_ref().map(|f| PlanForeach {
                function: f.function.clone(),
                import_path: f.import_path.clone(),
                propagate_result: f.propagate_result,
            });
            edges.push(PlanEdge {
                nodes_from: node_names(system, &edge.nodes_from),
                nodes_to: node_names(system, &edge.nodes_to),
                condition_source: edge.predicate.to_source(system, registry),
                foreach,
            });
        }

        let failures = flow
            .failures
            .as_ref()
            .map(|g| {
                g.iter_entries()
                    .into_iter()
                    .map(|(failed, fallback, propagate_failure)| PlanFailureEntry {
                        failed: node_names(system, &failed),
                        fallback: match fallback {
                            Fallback::Nodes(nodes) => PlanFallback::Nodes(node_names(system, &nodes)),
                            Fallback::FlowFails => PlanFallback::FlowFails,
                        },
                        propagate_failure,
                    })
                    .collect()
            })
            .unwrap_or_default();

        flows.push(PlanFlow {
            name: flow.name.clone(),
            edges,
            failures,
            nowait_nodes: node_names(system, &flow.nowait_nodes.iter().copied().collect::<Vec<_>>()),
            node_args_from_first: flow.node_args_from_first,
            queue_name: flow.queue_name.clone(),
            strategy: flow.strategy.clone(),
            max_retry: flow.max_retry,
            retry_countdown: flow.retry_countdown,
            throttling_secs: flow.throttling.map(|d| d.as_secs_f64()),
            propagation: PlanPropagationFlags {
                propagate_node_args: plan_propagation(system, &flow.propagate_node_args),
                propagate_parent: plan_propagation(system, &flow.propagate_parent),
                propagate_parent_failures: plan_propagation(system, &flow.propagate_parent_failures),
                propagate_finished: plan_propagation(system, &flow.propagate_finished),
                propagate_compound_finished: plan_propagation(system, &flow.propagate_compound_finished),
                propagate_failures: plan_propagation(system, &flow.propagate_failures),
                propagate_compound_failures: plan_propagation(system, &flow.propagate_compound_failures),
            },
            cache_config: flow.cache_config.as_ref().map(plan_cache_config),
        });
    }

    let tasks = system
        .tasks
        .iter()
        .map(|t| PlanTask {
            name: t.name.clone(),
            class_name: t.class_name.clone(),
            import_path: t.import_path.clone(),
            storage: t.storage.map(|s| system.storage(s).name.clone()),
            storage_readonly: t.storage_readonly,
            storage_task_name: t.storage_task_name.clone(),
            output_schema: t.output_schema.clone(),
            max_retry: t.max_retry,
            retry_countdown: t.retry_countdown,
            queue_name: t.queue_name.clone(),
            throttling_secs: t.throttling.map(|d| d.as_secs_f64()),
        })
        .collect();

    let storages = system
        .storages
        .iter()
        .map(|s| PlanStorage {
            name: s.name.clone(),
            class_name: s.class_name.clone(),
            import_path: s.import_path.clone(),
            configuration: s.configuration.clone(),
            cache_config: s.cache_config.as_ref().map(plan_cache_config),
        })
        .collect();

    Ok(PlanArtifact {
        header: PlanHeader {
            format_version: 1,
            tool_version: tool_version.into(),
            generated_at: generated_at.into(),
        },
        flows,
        tasks,
        storages,
    })
}

impl PlanArtifact {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The artifact with a blanked header, for comparing two compiles of the
    /// same configuration byte-for-byte.
    pub fn body_only(&self) -> Self {
        let mut copy = self.clone();
        copy.header.generated_at = String::new();
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::LeafRegistry;
    use crate::system::{RawFlowFile, RawNodesFile, System};

    fn build_system() -> System {
        let nodes: RawNodesFile = serde_yaml::from_str(
            "tasks:\n  - name: Task1\n    import: mypkg\nstorages: []\nflows:\n  - flow1\n",
        )
        .unwrap();
        let flow: RawFlowFile = serde_yaml::from_str(
            "flow-definitions:\n  - name: flow1\n    edges:\n      - from: []\n        to: [Task1]\n",
        )
        .unwrap();
        System::build(nodes, vec![flow], &LeafRegistry::new()).unwrap()
    }

    #[test]
    fn emitting_twice_produces_identical_bodies() {
        let system = build_system();
        let registry = LeafRegistry::new();
        let a = emit(&system, &registry, "0.1.0", "2026-01-01T00:00:00Z").unwrap();
        let b = emit(&system, &registry, "0.1.0", "2026-06-01T00:00:00Z").unwrap();
        assert_eq!(a.body_only().to_json().unwrap(), b.body_only().to_json().unwrap());
    }

    #[test]
    fn storage_cache_config_is_carried_into_the_plan() {
        let nodes: RawNodesFile = serde_yaml::from_str(
            "tasks:\n  - name: Task1\n    import: mypkg\n    storage: db\nstorages:\n  - name: db\n    import: mypkg.storages\n    classname: Db\n    cache:\n      name: LRU\n      import: selinon.caches\nflows:\n  - flow1\n",
        )
        .unwrap();
        let flow: RawFlowFile = serde_yaml::from_str(
            "flow-definitions:\n  - name: flow1\n    edges:\n      - from: []\n        to: [Task1]\n",
        )
        .unwrap();
        let system = System::build(nodes, vec![flow], &LeafRegistry::new()).unwrap();
        let artifact = emit(&system, &LeafRegistry::new(), "0.1.0", "2026-01-01T00:00:00Z").unwrap();
        let cache = artifact.storages[0].cache_config.as_ref().unwrap();
        assert_eq!(cache.name, "LRU");
        assert_eq!(cache.entity_name, "db");
    }
}
