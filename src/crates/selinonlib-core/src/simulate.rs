//! A deterministic, in-process stand-in for the real dispatcher.
//!
//! The emitted plan artifact only carries source text for its edge
//! conditions (`to_source`, §4.H) — the target dispatcher is what actually
//! evaluates them. This module runs the same validated [`System`] a plan is
//! built from directly, using the still-executable [`Predicate`] tree, so a
//! test can drive a flow to completion without a broker or workers. A
//! [`TaskOracle`] stands in for "a worker ran this task".

use std::collections::BTreeSet;
use std::time::Duration;

use crate::error::{Result, SelinonError};
use crate::failure::{Fallback, FailureNode};
use crate::ids::{FlowId, NodeRef};
use crate::predicate::{LeafRegistry, MemoryDb};
use crate::strategy::{self, StrategyInput};
use crate::system::System;

/// What a worker would have reported back for one task.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Finished(serde_json::Value),
    Failed,
    /// The task asked to be retried after `countdown`; not a failure.
    Retry { countdown: Duration },
}

/// Supplies task outcomes during a simulation run. Implemented by tests;
/// never by production code, which talks to a real broker instead.
pub trait TaskOracle {
    fn run(&self, task_name: &str, node_args: Option<&serde_json::Value>) -> TaskOutcome;
}

/// How the flow ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    Completed,
    Failed { propagated: bool },
}

/// One round of the simulation loop: which edges fired and what the strategy
/// said the next tick delay should be.
#[derive(Debug, Clone)]
pub struct SimulationTick {
    pub fired_edges: Vec<usize>,
    pub next_delay: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub ticks: Vec<SimulationTick>,
    pub outcome: FlowOutcome,
}

struct RunState {
    finished: BTreeSet<NodeRef>,
    failed: BTreeSet<NodeRef>,
    active: BTreeSet<NodeRef>,
    /// Nodes already handed to the oracle. The oracle is consulted exactly
    /// once per node — a `Finished`/`Failed` outcome is final, and a `Retry`
    /// leaves the node `active` without asking again, since this simulator
    /// has no clock to decide when a retry countdown has elapsed.
    attempted: BTreeSet<NodeRef>,
    new_started: usize,
    new_fallback: usize,
}

/// Hard cap on dispatcher ticks. Nothing in a well-formed flow should need
/// more than a handful; this only guards against a pathological strategy
/// binding (or a test oracle that always retries) spinning forever.
const MAX_TICKS: usize = 10_000;

/// Drives `flow_name` in `system` to completion against `oracle`, evaluating
/// edge predicates with `registry` and recording, in order, which edges
/// fired each round. Returns [`SelinonError::UnknownFlow`] if `flow_name`
/// isn't declared, mirroring the `RequestError` taxonomy entry (§7) for
/// "asked to operate on a flow that was never declared".
pub fn run(
    system: &System,
    flow_name: &str,
    node_args: Option<&serde_json::Value>,
    registry: &LeafRegistry,
    oracle: &dyn TaskOracle,
) -> Result<SimulationReport> {
    let flow_id = system.flow_by_name(flow_name)?;
    let flow = system.flow(flow_id);

    let mut db = MemoryDb::new();
    let mut state = RunState {
        finished: BTreeSet::new(),
        failed: BTreeSet::new(),
        active: BTreeSet::new(),
        attempted: BTreeSet::new(),
        new_started: 0,
        new_fallback: 0,
    };
    let mut ticks = Vec::new();
    let mut previous_retry: Option<Duration> = None;

    for _ in 0..MAX_TICKS {
        let mut fired = Vec::new();
        for (idx, edge) in flow.edges.iter().enumerate() {
            if !edge_ready(edge.nodes_from.iter().copied(), &state.finished) {
                continue;
            }
            if edge.nodes_to.iter().all(|n| state.attempted.contains(n)) {
                continue;
            }
            let fires = edge.predicate.evaluate(&db, node_args, registry, system)?;
            if !fires {
                continue;
            }
            fired.push(idx);
            for &to in &edge.nodes_to {
                if state.attempted.contains(&to) {
                    continue;
                }
                state.active.insert(to);
                state.attempted.insert(to);
                state.new_started += 1;
                run_node(system, to, node_args, oracle, &mut db, flow_id, &mut state)?;
            }
        }

        if let Some(failures) = &flow.failures {
            if let Some((fallback, propagate)) = lookup_with_propagate(&failures.root, &state.failed) {
                match fallback {
                    Fallback::FlowFails => {
                        return Ok(finish(ticks, FlowOutcome::Failed { propagated: propagate }));
                    }
                    Fallback::Nodes(nodes) => {
                        if propagate {
                            return Ok(finish(ticks, FlowOutcome::Failed { propagated: true }));
                        }
                        for &n in nodes {
                            if state.attempted.contains(&n) {
                                continue;
                            }
                            state.active.insert(n);
                            state.attempted.insert(n);
                            state.new_fallback += 1;
                            run_node(system, n, node_args, oracle, &mut db, flow_id, &mut state)?;
                        }
                    }
                }
            }
        }

        let input = StrategyInput {
            active_nodes: state.active.len(),
            failed_nodes: state.failed.len(),
            new_started_nodes: state.new_started,
            new_fallback_nodes: state.new_fallback,
            previous_retry,
        };
        let delay = match &flow.strategy {
            Some(binding) => strategy::evaluate(binding, input)?,
            None => {
                if input.active_nodes == 0 {
                    None
                } else {
                    Some(Duration::from_secs(2))
                }
            }
        };
        ticks.push(SimulationTick {
            fired_edges: fired.clone(),
            next_delay: delay,
        });

        state.new_started = 0;
        state.new_fallback = 0;
        previous_retry = delay;

        if delay.is_none() {
            let outcome = if state.failed.is_empty() {
                FlowOutcome::Completed
            } else {
                FlowOutcome::Failed { propagated: false }
            };
            return Ok(finish(ticks, outcome));
        }
        if fired.is_empty() && state.active.is_empty() {
            return Ok(finish(ticks, FlowOutcome::Completed));
        }
    }

    Err(SelinonError::Request(format!(
        "flow '{flow_name}' did not settle within {MAX_TICKS} simulated ticks"
    )))
}

fn edge_ready(mut nodes_from: impl Iterator<Item = NodeRef>, finished: &BTreeSet<NodeRef>) -> bool {
    nodes_from.all(|n| finished.contains(&n))
}

/// Same traversal as `FailureGraph::lookup`, but also surfaces the matched
/// node's `propagate_failure` flag, which `lookup` doesn't expose since the
/// plan emitter (its only other caller) reads it separately via `iter_entries`.
fn lookup_with_propagate<'a>(
    root: &'a FailureNode,
    failed: &BTreeSet<NodeRef>,
) -> Option<(&'a Fallback, bool)> {
    let mut node = root;
    for n in failed {
        node = node.children.get(n)?;
    }
    node.fallback.as_ref().map(|f| (f, node.propagate_failure))
}

#[allow(clippy::too_many_arguments)]
fn run_node(
    system: &System,
    node: NodeRef,
    node_args: Option<&serde_json::Value>,
    oracle: &dyn TaskOracle,
    db: &mut MemoryDb,
    flow_id: FlowId,
    state: &mut RunState,
) -> Result<()> {
    match node {
        NodeRef::Flow(sub_flow) => {
            // A sub-flow node is itself the start of another flow; this
            // simulator only drives one flow's edge table at a time, so a
            // sub-flow is modeled as an opaque task from the oracle's point
            // of view, keyed by its flow name.
            let name = system.flow(sub_flow).name.clone();
            apply_outcome(oracle.run(&name, node_args), node, db, system.flow(flow_id).name.as_str(), &name, state)
        }
        NodeRef::Task(task_id) => {
            let task = system.task(task_id);
            let outcome = oracle.run(&task.name, node_args);
            let flow_name = system.flow(flow_id).name.clone();
            let task_name = task.name.clone();
            apply_outcome(outcome, node, db, &flow_name, &task_name, state)
        }
    }
}

fn apply_outcome(
    outcome: TaskOutcome,
    node: NodeRef,
    db: &mut MemoryDb,
    flow_name: &str,
    node_name: &str,
    state: &mut RunState,
) -> Result<()> {
    match outcome {
        TaskOutcome::Finished(value) => {
            db.set(flow_name, node_name, value);
            state.active.remove(&node);
            state.finished.insert(node);
        }
        TaskOutcome::Failed => {
            state.active.remove(&node);
            state.failed.insert(node);
        }
        TaskOutcome::Retry { .. } => {
            // Stays active; the next tick will see it neither finished nor
            // failed and the oracle may return a different outcome then.
        }
    }
    Ok(())
}

fn finish(ticks: Vec<SimulationTick>, outcome: FlowOutcome) -> SimulationReport {
    SimulationReport { ticks, outcome }
}

/// `SelinonError::Request` helper for "asked to simulate a flow/task combination
/// the oracle doesn't know how to answer" — left to callers to raise from
/// their own `TaskOracle` implementations.
pub fn unknown_task(name: &str) -> SelinonError {
    SelinonError::Request(format!("simulator oracle has no outcome for task '{name}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::LeafSignature;
    use crate::system::{RawFlowFile, RawNodesFile};
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn registry() -> LeafRegistry {
        let mut reg = LeafRegistry::new();
        reg.register("alwaysTrue", LeafSignature::default(), Some(Arc::new(|_| true)));
        reg
    }

    struct ScriptedOracle {
        outcomes: RefCell<HashMap<String, TaskOutcome>>,
    }

    impl TaskOracle for ScriptedOracle {
        fn run(&self, task_name: &str, _node_args: Option<&serde_json::Value>) -> TaskOutcome {
            self.outcomes
                .borrow_mut()
                .remove(task_name)
                .unwrap_or(TaskOutcome::Finished(serde_json::Value::Null))
        }
    }

    fn build_system(nodes_yaml: &str, flow_yaml: &str) -> System {
        let nodes: RawNodesFile = serde_yaml::from_str(nodes_yaml).unwrap();
        let flows: RawFlowFile = serde_yaml::from_str(flow_yaml).unwrap();
        System::build(nodes, vec![flows], &registry()).unwrap()
    }

    #[test]
    fn two_task_chain_completes() {
        let system = build_system(
            "tasks:\n  - name: Task1\n    import: x.y\n  - name: Task2\n    import: x.y\nstorages: []\nflows:\n  - flow1\n",
            "flow-definitions:\n  - name: flow1\n    edges:\n      - from: []\n        to: [Task1]\n      - from: [Task1]\n        to: [Task2]\n",
        );
        let oracle = ScriptedOracle { outcomes: RefCell::new(HashMap::new()) };
        let report = run(&system, "flow1", None, &registry(), &oracle).unwrap();
        assert_eq!(report.outcome, FlowOutcome::Completed);
        assert!(report.ticks.iter().any(|t| t.fired_edges.contains(&0)));
        assert!(report.ticks.iter().any(|t| t.fired_edges.contains(&1)));
    }

    #[test]
    fn failing_task_without_fallback_fails_the_flow() {
        let system = build_system(
            "tasks:\n  - name: Task1\n    import: x.y\nstorages: []\nflows:\n  - flow1\n",
            "flow-definitions:\n  - name: flow1\n    edges:\n      - from: []\n        to: [Task1]\n",
        );
        let mut outcomes = HashMap::new();
        outcomes.insert("Task1".to_string(), TaskOutcome::Failed);
        let oracle = ScriptedOracle { outcomes: RefCell::new(outcomes) };
        let report = run(&system, "flow1", None, &registry(), &oracle).unwrap();
        assert_eq!(report.outcome, FlowOutcome::Failed { propagated: false });
    }

    #[test]
    fn unknown_flow_name_is_rejected() {
        let system = build_system(
            "tasks:\n  - name: Task1\n    import: x.y\nstorages: []\nflows:\n  - flow1\n",
            "flow-definitions:\n  - name: flow1\n    edges:\n      - from: []\n        to: [Task1]\n",
        );
        let oracle = ScriptedOracle { outcomes: RefCell::new(HashMap::new()) };
        assert!(run(&system, "no_such_flow", None, &registry(), &oracle).is_err());
    }
}
