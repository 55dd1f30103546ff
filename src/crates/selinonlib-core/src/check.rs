//! Static checks that need the full [`System`] in scope, as opposed to the
//! local checks each entity performs on construction (see [`crate::edge`],
//! [`crate::node`]).

use std::collections::{HashSet, VecDeque};

use crate::error::{Result, SelinonError};
use crate::ids::NodeRef;
use crate::system::System;

/// Runs every whole-system invariant. Call after [`System::load`] (which
/// already runs the per-flow checks that don't need cross-flow context) and
/// before planning.
pub fn check_system(system: &System) -> Result<()> {
    for flow in &system.flows {
        check_reachable(system, flow)?;
        check_nowait_subset(flow)?;
        check_foreach_propagation(system, flow)?;
        check_node_args_from_first(system, flow)?;
        check_propagation_list_membership(system, flow)?;
        check_propagate_failures_has_descriptor(system, flow)?;
        check_task_sources_are_produced(system, flow)?;
    }
    check_task_class_divergence(system);
    Ok(())
}

/// Every node that appears as an edge destination must be reachable by
/// following edges forward from a starting edge — otherwise it can never
/// fire and is dead configuration.
fn check_reachable(system: &System, flow: &crate::node::Flow) -> Result<()> {
    let mut reachable: HashSet<NodeRef> = HashSet::new();
    let mut queue: VecDeque<NodeRef> = VecDeque::new();
    for edge in flow.starting_edges() {
        for &to in &edge.nodes_to {
            if reachable.insert(to) {
                queue.push_back(to);
            }
        }
    }
    while let Some(node) = queue.pop_front() {
        for edge in &flow.edges {
            if edge.nodes_from.contains(&node) {
                for &to in &edge.nodes_to {
                    if reachable.insert(to) {
                        queue.push_back(to);
                    }
                }
            }
        }
    }

    for node in flow.all_destination_nodes() {
        if !reachable.contains(&node) {
            return Err(SelinonError::Configuration(format!(
                "flow '{}': node '{}' is never reachable from a starting edge",
                flow.name,
                system.node_name(node)
            )));
        }
    }
    Ok(())
}

/// `nowait_nodes ⊆ all_destination_nodes(flow)` and
/// `nowait_nodes ∩ all_source_nodes(flow) = ∅` — a node the dispatcher must
/// wait on as someone else's input can't simultaneously be "fire and forget".
fn check_nowait_subset(flow: &crate::node::Flow) -> Result<()> {
    let destinations = flow.all_destination_nodes();
    let sources = flow.all_source_nodes();
    for node in &flow.nowait_nodes {
        if !destinations.contains(node) {
            return Err(SelinonError::Configuration(format!(
                "flow '{}': nowait node is not a destination of any edge",
                flow.name
            )));
        }
        if sources.contains(node) {
            return Err(SelinonError::Configuration(format!(
                "flow '{}': nowait node is also a source of another edge",
                flow.name
            )));
        }
    }
    Ok(())
}

/// `node_args_from_first = true` requires exactly one starting edge whose
/// `nodes_to` contains exactly one Task.
fn check_node_args_from_first(_system: &System, flow: &crate::node::Flow) -> Result<()> {
    if !flow.node_args_from_first {
        return Ok(());
    }
    let starting: Vec<_> = flow.starting_edges().collect();
    if starting.len() != 1 || starting[0].nodes_to.len() != 1 || !starting[0].nodes_to[0].is_task() {
        return Err(SelinonError::Configuration(format!(
            "flow '{}': node_args_from_first requires exactly one starting edge with exactly one task destination",
            flow.name
        )));
    }
    Ok(())
}

/// For every propagation flag in list form, every listed sub-flow must both
/// be started by this flow (appear as some edge's destination) and be
/// referenced in some edge's `nodes_from`, so there's a point in the flow's
/// own dispatch where its arguments can actually be delivered.
fn check_propagation_list_membership(system: &System, flow: &crate::node::Flow) -> Result<()> {
    let destinations = flow.all_destination_nodes();
    let sources = flow.all_source_nodes();
    let flags: [(&str, &crate::node::Propagation); 7] = [
        ("propagate_node_args", &flow.propagate_node_args),
        ("propagate_parent", &flow.propagate_parent),
        ("propagate_parent_failures", &flow.propagate_parent_failures),
        ("propagate_finished", &flow.propagate_finished),
        ("propagate_compound_finished", &flow.propagate_compound_finished),
        ("propagate_failures", &flow.propagate_failures),
        ("propagate_compound_failures", &flow.propagate_compound_failures),
    ];
    for (flag_name, flag) in flags {
        for &sub_flow in flag.list() {
            let node = NodeRef::Flow(sub_flow);
            if !destinations.contains(&node) || !sources.contains(&node) {
                return Err(SelinonError::Configuration(format!(
                    "flow '{}': {flag_name} lists sub-flow '{}', which is not both started and referenced by this flow",
                    flow.name,
                    system.flow(sub_flow).name
                )));
            }
        }
    }
    Ok(())
}

/// If `propagate_failures` lists a node, there must be a failure descriptor
/// that can catch its failure.
fn check_propagate_failures_has_descriptor(system: &System, flow: &crate::node::Flow) -> Result<()> {
    if flow.propagate_failures.list().is_empty() {
        return Ok(());
    }
    let waiting = flow
        .failures
        .as_ref()
        .map(|g| g.all_waiting_nodes())
        .unwrap_or_default();
    for &sub_flow in flow.propagate_failures.list() {
        let node = NodeRef::Flow(sub_flow);
        if !waiting.contains(&node) {
            return Err(SelinonError::Configuration(format!(
                "flow '{}': propagate_failures names '{}', which no failure descriptor catches",
                flow.name,
                system.flow(sub_flow).name
            )));
        }
    }
    Ok(())
}

/// Every task that is read as an edge source or waited on by a failure
/// descriptor must itself be produced somewhere in the flow — as an edge
/// destination, a `nowait_nodes` member, or a fallback node — otherwise
/// nothing ever causes it to run. Sub-flows are exempt: a sub-flow referenced
/// as a source may be started entirely outside this flow.
fn check_task_sources_are_produced(system: &System, flow: &crate::node::Flow) -> Result<()> {
    let destinations = flow.all_destination_nodes();
    let waiting = flow
        .failures
        .as_ref()
        .map(|g| g.all_waiting_nodes())
        .unwrap_or_default();
    let fallbacks = flow
        .failures
        .as_ref()
        .map(|g| g.all_fallback_nodes())
        .unwrap_or_default();

    let referenced = flow.all_source_nodes().into_iter().chain(waiting);
    for node in referenced {
        if !node.is_task() {
            continue;
        }
        if !destinations.contains(&node) && !flow.nowait_nodes.contains(&node) && !fallbacks.contains(&node) {
            return Err(SelinonError::Configuration(format!(
                "flow '{}': task '{}' is read but never produced by this flow",
                flow.name,
                system.node_name(node)
            )));
        }
    }
    Ok(())
}

/// Across tasks sharing a TaskClass, divergent `output_schema`, `max_retry`
/// or `retry_countdown` is a soft issue: the target class is the same, but
/// execution semantics diverge by task name.
fn check_task_class_divergence(system: &System) {
    for class in &system.task_classes {
        let mut tasks = class.tasks.iter().map(|&id| system.task(id));
        let Some(first) = tasks.next() else { continue };
        for task in tasks {
            if task.output_schema != first.output_schema {
                tracing::warn!(
                    class = class.class_name,
                    task = task.name,
                    "output_schema diverges across tasks sharing this TaskClass"
                );
            }
            if task.max_retry != first.max_retry {
                tracing::warn!(
                    class = class.class_name,
                    task = task.name,
                    "max_retry diverges across tasks sharing this TaskClass"
                );
            }
            if task.retry_countdown != first.retry_countdown {
                tracing::warn!(
                    class = class.class_name,
                    task = task.name,
                    "retry_countdown diverges across tasks sharing this TaskClass"
                );
            }
        }
    }
}

/// The sibling half of the `foreach.propagate_result` rule from
/// [`crate::edge::Edge::check`]: a sub-flow fed by a `propagate_result`
/// foreach must not also receive propagated node args, in either the global
/// or per-flow list form, since the two propagation sources would conflict
/// over who seeds the sub-flow's arguments.
fn check_foreach_propagation(system: &System, flow: &crate::node::Flow) -> Result<()> {
    for edge in &flow.edges {
        let Some(foreach) = &edge.foreach else { continue };
        if !foreach.propagate_result {
            continue;
        }
        for &to in &edge.nodes_to {
            let NodeRef::Flow(target_flow) = to else {
                continue;
            };
            if flow.propagate_node_args.is_true() || flow.propagate_node_args.list().contains(&target_flow) {
                return Err(SelinonError::Configuration(format!(
                    "flow '{}': sub-flow '{}' receives both foreach.propagate_result and propagate_node_args",
                    flow.name,
                    system.flow(target_flow).name
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::Edge;
    use crate::ids::{FlowId, TaskId};
    use crate::node::Flow;
    use crate::predicate::Predicate;

    fn simple_system_with_edges(edges: Vec<Edge>) -> System {
        let mut flow = Flow::new("flow1".to_string()).unwrap();
        flow.edges = edges;
        System {
            tasks: vec![],
            flows: vec![flow],
            storages: vec![],
            task_classes: vec![],
            ..Default::default()
        }
    }

    #[test]
    fn unreachable_node_is_rejected() {
        let t0 = NodeRef::Task(TaskId(0));
        let t1 = NodeRef::Task(TaskId(1));
        // t1 only appears as a destination of an edge whose source (t0) is
        // never itself a destination of anything, so t1 is unreachable.
        let edges = vec![Edge::new(vec![t0], vec![t1], Predicate::AlwaysTrue, FlowId(0), None).unwrap()];
        let system = simple_system_with_edges(edges);
        assert!(check_reachable(&system, &system.flows[0]).is_err());
    }

    #[test]
    fn starting_edge_makes_destination_reachable() {
        let t0 = NodeRef::Task(TaskId(0));
        let edges = vec![Edge::new(vec![], vec![t0], Predicate::AlwaysTrue, FlowId(0), None).unwrap()];
        let system = simple_system_with_edges(edges);
        assert!(check_reachable(&system, &system.flows[0]).is_ok());
    }
}
