//! Fallback lattice: maps a set of currently-failed nodes to the fallback
//! nodes that should run in their place.
//!
//! Represented as a sparse trie keyed by the *sorted* failed-node set rather
//! than a dense table over all subsets, so the cost of both construction and
//! lookup is proportional to the number of failure descriptors actually
//! declared, not to 2^|nodes|. Sorting the key before insertion/lookup makes
//! the lattice permutation-invariant: `{A, B}` and `{B, A}` land on the same
//! trie path.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SelinonError};
use crate::ids::NodeRef;

/// A failure descriptor's fallback: either a concrete list of nodes to run in
/// compensation, or the sentinel `true` meaning "the flow as a whole fails".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Fallback {
    Nodes(Vec<NodeRef>),
    FlowFails,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailureNode {
    pub fallback: Option<Fallback>,
    /// Set from the owning failure descriptor; annotates whether the dispatcher
    /// should keep propagating this failure upward after running the fallback.
    #[serde(default)]
    pub propagate_failure: bool,
    pub children: BTreeMap<NodeRef, FailureNode>,
}

/// The fallback lattice for a single flow. Empty by default — a flow with no
/// `failures:` block simply has no fallback for any failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailureGraph {
    pub root: FailureNode,
}

impl FailureGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers that, when exactly `failed` (order-independent, no
    /// duplicates) are the failed nodes, `fallback` should run. Returns an
    /// error if a descriptor for the same set was already registered with a
    /// different fallback, or if `fallback` is the "flow fails" sentinel
    /// together with `propagate_failure` (the combination is a contradiction:
    /// there is nothing left to propagate to once the whole flow has failed).
    pub fn insert(&mut self, failed: &[NodeRef], fallback: Fallback, propagate_failure: bool) -> Result<()> {
        if failed.is_empty() {
            return Err(SelinonError::Configuration(
                "a failure descriptor must name at least one failed node".to_string(),
            ));
        }
        let sorted: BTreeSet<NodeRef> = failed.iter().copied().collect();
        if sorted.len() != failed.len() {
            return Err(SelinonError::Configuration(
                "a failure descriptor must not repeat a failed node".to_string(),
            ));
        }
        if matches!(fallback, Fallback::FlowFails) && propagate_failure {
            return Err(SelinonError::Configuration(
                "a failure descriptor cannot both fail the whole flow and propagate_failure".to_string(),
            ));
        }

        let mut node = &mut self.root;
        for n in sorted {
            node = node.children.entry(n).or_default();
        }

        match &node.fallback {
            Some(existing) if *existing != fallback => {
                return Err(SelinonError::Configuration(
                    "conflicting fallback registered for the same failed-node set".to_string(),
                ));
            }
            _ => {}
        }
        node.fallback = Some(fallback);
        node.propagate_failure = propagate_failure;
        Ok(())
    }

    /// Looks up the fallback for exactly this set of currently-failed nodes.
    /// `O(|failed|)`: one BTreeMap lookup per element, walked in sorted order.
    pub fn lookup(&self, failed: &BTreeSet<NodeRef>) -> Option<&Fallback> {
        let mut node = &self.root;
        for n in failed {
            node = node.children.get(n)?;
        }
        node.fallback.as_ref()
    }

    /// Every node that appears in some failure descriptor's failed set —
    /// the nodes the flow must wait on before a fallback decision is possible.
    pub fn all_waiting_nodes(&self) -> BTreeSet<NodeRef> {
        let mut out = BTreeSet::new();
        Self::collect_keys(&self.root, &mut out);
        out
    }

    fn collect_keys(node: &FailureNode, out: &mut BTreeSet<NodeRef>) {
        for (k, child) in &node.children {
            out.insert(*k);
            Self::collect_keys(child, out);
        }
    }

    /// Every node that appears in some registered fallback list.
    pub fn all_fallback_nodes(&self) -> BTreeSet<NodeRef> {
        let mut out = BTreeSet::new();
        Self::collect_fallbacks(&self.root, &mut out);
        out
    }

    fn collect_fallbacks(node: &FailureNode, out: &mut BTreeSet<NodeRef>) {
        if let Some(Fallback::Nodes(nodes)) = &node.fallback {
            out.extend(nodes.iter().copied());
        }
        for child in node.children.values() {
            Self::collect_fallbacks(child, out);
        }
    }

    /// Flattens the lattice into `(failed_set, fallback, propagate_failure)`
    /// entries, in a deterministic order, for the plan emitter to serialize.
    pub fn iter_entries(&self) -> Vec<(Vec<NodeRef>, Fallback, bool)> {
        let mut out = Vec::new();
        let mut path = Vec::new();
        Self::walk(&self.root, &mut path, &mut out);
        out
    }

    fn walk(node: &FailureNode, path: &mut Vec<NodeRef>, out: &mut Vec<(Vec<NodeRef>, Fallback, bool)>) {
        if let Some(fallback) = &node.fallback {
            out.push((path.clone(), fallback.clone(), node.propagate_failure));
        }
        for (k, child) in &node.children {
            path.push(*k);
            Self::walk(child, path, out);
            path.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::TaskId;

    fn t(n: u32) -> NodeRef {
        NodeRef::Task(TaskId(n))
    }

    #[test]
    fn lookup_is_permutation_invariant() {
        let mut g = FailureGraph::new();
        g.insert(&[t(1), t(2)], Fallback::Nodes(vec![t(3)]), false).unwrap();

        let forward: BTreeSet<_> = [t(1), t(2)].into_iter().collect();
        let reverse: BTreeSet<_> = [t(2), t(1)].into_iter().collect();
        assert_eq!(g.lookup(&forward), Some(&Fallback::Nodes(vec![t(3)])));
        assert_eq!(g.lookup(&reverse), Some(&Fallback::Nodes(vec![t(3)])));
    }

    #[test]
    fn lookup_requires_exact_match() {
        let mut g = FailureGraph::new();
        g.insert(&[t(1), t(2)], Fallback::Nodes(vec![t(3)]), false).unwrap();

        let partial: BTreeSet<_> = [t(1)].into_iter().collect();
        assert_eq!(g.lookup(&partial), None);
    }

    #[test]
    fn conflicting_fallback_rejected() {
        let mut g = FailureGraph::new();
        g.insert(&[t(1)], Fallback::Nodes(vec![t(2)]), false).unwrap();
        assert!(g.insert(&[t(1)], Fallback::Nodes(vec![t(3)]), false).is_err());
        assert!(g.insert(&[t(1)], Fallback::Nodes(vec![t(2)]), false).is_ok());
    }

    #[test]
    fn duplicate_failed_node_rejected() {
        let mut g = FailureGraph::new();
        assert!(g.insert(&[t(1), t(1)], Fallback::Nodes(vec![t(2)]), false).is_err());
    }

    #[test]
    fn flow_fails_and_propagate_failure_is_contradictory() {
        let mut g = FailureGraph::new();
        assert!(g.insert(&[t(1)], Fallback::FlowFails, true).is_err());
    }

    #[test]
    fn waiting_and_fallback_node_sets() {
        let mut g = FailureGraph::new();
        g.insert(&[t(1), t(2)], Fallback::Nodes(vec![t(3)]), false).unwrap();
        g.insert(&[t(4)], Fallback::Nodes(vec![t(5)]), false).unwrap();

        assert_eq!(
            g.all_waiting_nodes(),
            [t(1), t(2), t(4)].into_iter().collect()
        );
        assert_eq!(g.all_fallback_nodes(), [t(3), t(5)].into_iter().collect());
    }
}
