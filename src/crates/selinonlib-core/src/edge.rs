//! Edge model: a transition from a set of source nodes to a set of target
//! nodes, gated by a predicate and optionally iterated by a `foreach` producer.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SelinonError};
use crate::ids::{FlowId, NodeRef};
use crate::predicate::{LeafRegistry, Predicate};

/// `{function, import_path, propagate_result}` — an iterator that turns one
/// firing of the edge into N parallel launches of its `nodes_to`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Foreach {
    pub function: String,
    pub import_path: String,
    #[serde(default)]
    pub propagate_result: bool,
}

/// `nodes_from = ∅` marks a **starting edge**: it fires once when the flow
/// begins. Every node in `nodes_from`/`nodes_to` must be defined in the
/// enclosing system — that cross-reference check happens in
/// [`crate::system::System`] at construction time, since it needs the full
/// node table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub nodes_from: Vec<NodeRef>,
    pub nodes_to: Vec<NodeRef>,
    pub predicate: Predicate,
    pub flow: FlowId,
    pub foreach: Option<Foreach>,
}

impl Edge {
    pub fn new(
        nodes_from: Vec<NodeRef>,
        nodes_to: Vec<NodeRef>,
        predicate: Predicate,
        flow: FlowId,
        foreach: Option<Foreach>,
    ) -> Result<Self> {
        if nodes_to.is_empty() {
            return Err(SelinonError::Configuration(
                "edge must have a non-empty nodes_to".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for n in &nodes_from {
            if !seen.insert(*n) {
                return Err(SelinonError::Configuration(
                    "a task may not appear more than once in an edge's nodes_from".to_string(),
                ));
            }
        }
        Ok(Self {
            nodes_from,
            nodes_to,
            predicate,
            flow,
            foreach,
        })
    }

    pub fn is_starting(&self) -> bool {
        self.nodes_from.is_empty()
    }

    /// Enforces the two cross-cutting rules from the design:
    ///
    /// 1. If `foreach.propagate_result` is set, every destination must be a
    ///    sub-flow, and `propagate_node_args` must not be set (globally or in
    ///    list form) for any of them.
    /// 2. If a leaf in the predicate requires a message and the task it reads
    ///    is readonly-storage, reject.
    ///
    /// `storage_readonly` is a closure so this module stays independent from
    /// the `System`'s storage table. The sibling rule — that a sub-flow
    /// targeted by a `propagate_result` foreach must not also receive
    /// `propagate_node_args` — needs the owning `Flow` in scope and is
    /// enforced by the static checker instead.
    pub fn check(&self, registry: &LeafRegistry, storage_readonly: impl Fn(NodeRef) -> bool) -> Result<()> {
        if let Some(foreach) = &self.foreach {
            if foreach.propagate_result {
                for &to in &self.nodes_to {
                    if to.is_task() {
                        return Err(SelinonError::Configuration(
                            "foreach.propagate_result requires every nodes_to entry to be a flow"
                                .to_string(),
                        ));
                    }
                }
            }
        }

        if self.predicate.requires_message_with(registry)? {
            for node in self.predicate.nodes_used() {
                if storage_readonly(node) {
                    return Err(SelinonError::Configuration(
                        "predicate reads a message from a node using readonly storage".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }
}
