//! Diffs two compiled plans into a [`Migration`]: a per-flow translation
//! table from old edge index to new edge index, `None` when an edge was
//! removed outright.
//!
//! Edges have no stable identity of their own, so they are matched across
//! plans in two passes: first by exact structural signature (sorted
//! `nodes_from`/`nodes_to` name sets), then — for edges still unmatched —
//! by `nodes_from` alone, which covers "same origin, different target".
//! Identity mappings (an edge that kept its index) are omitted from the
//! written table; only edges that actually moved or disappeared need an
//! entry.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use selinonlib_core::plan::{PlanEdge, PlanFlow, PlanPropagation, PlanPropagationFlags};

fn empty_propagation() -> PlanPropagationFlags {
    PlanPropagationFlags {
        propagate_node_args: PlanPropagation::False,
        propagate_parent: PlanPropagation::False,
        propagate_parent_failures: PlanPropagation::False,
        propagate_finished: PlanPropagation::False,
        propagate_compound_finished: PlanPropagation::False,
        propagate_failures: PlanPropagation::False,
        propagate_compound_failures: PlanPropagation::False,
    }
}

fn from_only(edge: &PlanEdge) -> Vec<String> {
    let mut from = edge.nodes_from.clone();
    from.sort();
    from
}

fn signature(edge: &PlanEdge) -> (Vec<String>, Vec<String>) {
    let mut to = edge.nodes_to.clone();
    to.sort();
    (from_only(edge), to)
}

/// `_meta.selinonlib_version`, `_meta.host`, `_meta.datetime`, `_meta.user`
/// per the on-disk migration file shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationMeta {
    pub selinonlib_version: String,
    pub host: String,
    pub datetime: String,
    pub user: Option<String>,
}

/// A single `{N}.json` migration file: `{ "_meta": {...}, "migration": {
/// flow_name: { old_edge_index_str: new_edge_index|null } } }`. Flows with no
/// changed edge and edges that kept their index are omitted entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Migration {
    /// The `{N}` this migration is filed under. Not part of the JSON body —
    /// the filename is authoritative — so it's never (de)serialized; callers
    /// that read a `Migration` back from disk restore it from the filename.
    #[serde(skip)]
    pub version: usize,
    #[serde(rename = "_meta")]
    pub meta: MigrationMeta,
    pub migration: BTreeMap<String, BTreeMap<String, Option<usize>>>,
}

/// Diffs one flow's edges into a sparse `old_idx (as string) -> new_idx|null`
/// map, omitting any entry where the edge kept its index.
pub fn diff_flow(old: &PlanFlow, new: &PlanFlow) -> BTreeMap<String, Option<usize>> {
    let mut claimed = vec![false; new.edges.len()];
    let mut resolved: Vec<Option<usize>> = vec![None; old.edges.len()];

    // Step 2: exact (from, to) signature match.
    for (old_idx, edge) in old.edges.iter().enumerate() {
        let sig = signature(edge);
        if let Some(new_idx) = new
            .edges
            .iter()
            .enumerate()
            .find(|(i, e)| !claimed[*i] && signature(e) == sig)
            .map(|(i, _)| i)
        {
            claimed[new_idx] = true;
            resolved[old_idx] = Some(new_idx);
        }
    }

    // Step 3: same origin, different target — match remaining by `from` alone.
    for (old_idx, edge) in old.edges.iter().enumerate() {
        if resolved[old_idx].is_some() {
            continue;
        }
        let from = from_only(edge);
        if let Some(new_idx) = new
            .edges
            .iter()
            .enumerate()
            .find(|(i, e)| !claimed[*i] && from_only(e) == from)
            .map(|(i, _)| i)
        {
            claimed[new_idx] = true;
            resolved[old_idx] = Some(new_idx);
        }
    }

    resolved
        .into_iter()
        .enumerate()
        .filter(|&(old_idx, new_idx)| new_idx != Some(old_idx))
        .map(|(old_idx, new_idx)| (old_idx.to_string(), new_idx))
        .collect()
}

/// Diffs every flow present in `old`. Flows added in `new` need no migration
/// (nothing is waiting on them yet); flows removed from `new` entirely map
/// every surviving old edge to `None`. A flow whose edges are unchanged
/// contributes no entry to `migration` at all.
#[allow(clippy::too_many_arguments)]
pub fn diff_plans(
    old_flows: &[PlanFlow],
    new_flows: &[PlanFlow],
    version: usize,
    selinonlib_version: impl Into<String>,
    host: impl Into<String>,
    datetime: impl Into<String>,
    user: Option<String>,
) -> Migration {
    let new_by_name: HashMap<&str, &PlanFlow> = new_flows.iter().map(|f| (f.name.as_str(), f)).collect();
    let empty = PlanFlow {
        name: String::new(),
        edges: Vec::new(),
        failures: Vec::new(),
        nowait_nodes: Vec::new(),
        node_args_from_first: false,
        queue_name: None,
        strategy: None,
        max_retry: 0,
        retry_countdown: 0,
        throttling_secs: None,
        propagation: empty_propagation(),
        cache_config: None,
    };

    let migration = old_flows
        .iter()
        .filter_map(|old_flow| {
            let new_flow = new_by_name.get(old_flow.name.as_str()).copied().unwrap_or(&empty);
            let map = diff_flow(old_flow, new_flow);
            if map.is_empty() {
                None
            } else {
                Some((old_flow.name.clone(), map))
            }
        })
        .collect();

    Migration {
        version,
        meta: MigrationMeta {
            selinonlib_version: selinonlib_version.into(),
            host: host.into(),
            datetime: datetime.into(),
            user,
        },
        migration,
    }
}

impl Migration {
    /// `true` if no flow has any recorded edge change — i.e. nothing
    /// observable changed and the migration isn't worth writing.
    pub fn is_noop(&self) -> bool {
        self.migration.values().all(BTreeMap::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(from: &[&str], to: &[&str]) -> PlanEdge {
        PlanEdge {
            nodes_from: from.iter().map(|s| s.to_string()).collect(),
            nodes_to: to.iter().map(|s| s.to_string()).collect(),
            condition_source: "true".to_string(),
            foreach: None,
        }
    }

    fn flow(name: &str, edges: Vec<PlanEdge>) -> PlanFlow {
        PlanFlow {
            name: name.to_string(),
            edges,
            failures: Vec::new(),
            nowait_nodes: Vec::new(),
            node_args_from_first: false,
            queue_name: None,
            strategy: None,
            max_retry: 0,
            retry_countdown: 0,
            throttling_secs: None,
            propagation: empty_propagation(),
            cache_config: None,
        }
    }

    #[test]
    fn identical_flows_produce_no_entries() {
        let old = flow("f", vec![edge(&[], &["A"]), edge(&["A"], &["B"])]);
        let new = flow("f", vec![edge(&[], &["A"]), edge(&["A"], &["B"])]);
        let m = diff_flow(&old, &new);
        assert!(m.is_empty());
    }

    #[test]
    fn reordered_edges_still_match_by_signature() {
        let old = flow("f", vec![edge(&[], &["A"]), edge(&["A"], &["B"])]);
        let new = flow("f", vec![edge(&["A"], &["B"]), edge(&[], &["A"])]);
        let m = diff_flow(&old, &new);
        assert_eq!(m.get("0"), Some(&Some(1)));
        assert_eq!(m.get("1"), Some(&Some(0)));
    }

    #[test]
    fn removed_edge_maps_to_none() {
        let old = flow("f", vec![edge(&[], &["A"]), edge(&["A"], &["B"])]);
        let new = flow("f", vec![edge(&[], &["A"])]);
        let m = diff_flow(&old, &new);
        assert_eq!(m.get("1"), Some(&None));
        assert!(!m.contains_key("0"));
    }

    #[test]
    fn retargeted_edge_matches_by_from_alone() {
        let old = flow("f", vec![edge(&["A"], &["B"])]);
        let new = flow("f", vec![edge(&["A"], &["C"])]);
        let m = diff_flow(&old, &new);
        assert_eq!(m.get("0"), Some(&Some(0)));
    }

    #[test]
    fn whole_flow_removed_maps_every_edge_to_none() {
        let old_flows = vec![flow("f", vec![edge(&[], &["A"])])];
        let migration = diff_plans(&old_flows, &[], 1, "0.1.0", "host", "2026-01-01T00:00:00Z", None);
        assert_eq!(migration.migration["f"].get("0"), Some(&None));
    }

    #[test]
    fn unchanged_plan_is_a_noop() {
        let old_flows = vec![flow("f", vec![edge(&[], &["A"])])];
        let new_flows = vec![flow("f", vec![edge(&[], &["A"])])];
        let migration = diff_plans(&old_flows, &new_flows, 1, "0.1.0", "host", "2026-01-01T00:00:00Z", None);
        assert!(migration.is_noop());
    }
}
