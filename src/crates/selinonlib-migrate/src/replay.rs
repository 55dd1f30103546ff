//! Replays a chain of migrations against a persisted runtime `Message`.

use serde::{Deserialize, Serialize};

use crate::diff::Migration;
use crate::error::{MigrateError, Result};

/// The slice of dispatcher-persisted state that a config change can
/// invalidate: which edges a flow instance is still waiting on, expressed as
/// indices into that flow's edge list at the config version the message was
/// last compiled against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub flow: String,
    pub config_version: usize,
    pub waiting_edges: Vec<usize>,
}

/// Applies `migrations` (already filtered to versions after `message`'s) in
/// order, remapping or dropping waiting edge indices at each step. An edge
/// index with no entry in a migration's table is left unchanged (identity
/// mappings are never written out); a `null` entry drops the edge, logged at
/// `warn` — the task it was waiting on no longer exists in the new
/// configuration. A flow absent from the migration entirely is left as-is.
pub fn replay(message: &mut Message, migrations: &[Migration]) -> Result<()> {
    for migration in migrations {
        if migration.version <= message.config_version {
            return Err(MigrateError::Skew(format!(
                "migration {} is not newer than message's config_version {}",
                migration.version, message.config_version
            )));
        }
        let spec = migration.migration.get(&message.flow);

        let mut next_waiting = Vec::with_capacity(message.waiting_edges.len());
        for &old_idx in &message.waiting_edges {
            match spec.and_then(|s| s.get(&old_idx.to_string())) {
                Some(Some(new_idx)) => next_waiting.push(*new_idx),
                Some(None) => {
                    tracing::warn!(
                        flow = %message.flow,
                        edge_index = old_idx,
                        "dropping waiting edge removed by migration {}",
                        migration.version
                    );
                }
                None => next_waiting.push(old_idx),
            }
        }
        message.waiting_edges = next_waiting;
        message.config_version = migration.version;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::MigrationMeta;
    use std::collections::BTreeMap;

    fn migration(version: usize, flow_map: BTreeMap<String, Option<usize>>) -> Migration {
        let mut migration = BTreeMap::new();
        migration.insert("flow1".to_string(), flow_map);
        Migration {
            version,
            meta: MigrationMeta {
                selinonlib_version: "0.1.0".to_string(),
                host: "host".to_string(),
                datetime: "2026-01-01T00:00:00Z".to_string(),
                user: None,
            },
            migration,
        }
    }

    fn map(entries: &[(usize, Option<usize>)]) -> BTreeMap<String, Option<usize>> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn replay_remaps_surviving_edges() {
        let mut msg = Message {
            flow: "flow1".to_string(),
            config_version: 1,
            waiting_edges: vec![0, 1],
        };
        let migrations = vec![migration(2, map(&[(0, Some(1)), (1, Some(0))]))];
        replay(&mut msg, &migrations).unwrap();
        assert_eq!(msg.waiting_edges, vec![1, 0]);
        assert_eq!(msg.config_version, 2);
    }

    #[test]
    fn replay_drops_removed_edges() {
        let mut msg = Message {
            flow: "flow1".to_string(),
            config_version: 1,
            waiting_edges: vec![0, 1],
        };
        let migrations = vec![migration(2, map(&[(0, None), (1, Some(0))]))];
        replay(&mut msg, &migrations).unwrap();
        assert_eq!(msg.waiting_edges, vec![0]);
    }

    #[test]
    fn replay_leaves_unmapped_edges_as_identity() {
        let mut msg = Message {
            flow: "flow1".to_string(),
            config_version: 1,
            waiting_edges: vec![0, 5],
        };
        // Only edge 0 moved; edge 5 has no entry, i.e. kept its index.
        let migrations = vec![migration(2, map(&[(0, Some(1))]))];
        replay(&mut msg, &migrations).unwrap();
        assert_eq!(msg.waiting_edges, vec![1, 5]);
    }

    #[test]
    fn replay_leaves_flows_absent_from_migration_untouched() {
        let mut msg = Message {
            flow: "other_flow".to_string(),
            config_version: 1,
            waiting_edges: vec![0, 1],
        };
        let migrations = vec![migration(2, map(&[(0, Some(1))]))];
        replay(&mut msg, &migrations).unwrap();
        assert_eq!(msg.waiting_edges, vec![0, 1]);
        assert_eq!(msg.config_version, 2);
    }

    #[test]
    fn replay_chains_multiple_migrations() {
        let mut msg = Message {
            flow: "flow1".to_string(),
            config_version: 1,
            waiting_edges: vec![0],
        };
        let migrations = vec![
            migration(2, map(&[(0, Some(1)), (1, Some(0))])),
            migration(3, map(&[(0, Some(0)), (1, None)])),
        ];
        replay(&mut msg, &migrations).unwrap();
        // v1->v2: index 0 becomes 1. v2->v3: index 1 maps to null, dropped.
        assert_eq!(msg.waiting_edges, Vec::<usize>::new());
        assert_eq!(msg.config_version, 3);
    }

    #[test]
    fn replay_rejects_out_of_order_migration() {
        let mut msg = Message {
            flow: "flow1".to_string(),
            config_version: 5,
            waiting_edges: vec![0],
        };
        let migrations = vec![migration(2, map(&[(0, Some(0))]))];
        assert!(replay(&mut msg, &migrations).is_err());
    }
}
