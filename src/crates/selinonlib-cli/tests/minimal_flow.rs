//! End-to-end smoke test mirroring scenario S1 from the specification: a
//! single task, a single starting edge, compiled through the same
//! `System::load` → `check_system` → `plan::emit` pipeline the binary drives.

use std::io::Write;

use selinonlib_core::check;
use selinonlib_core::plan;
use selinonlib_core::predicate::LeafRegistry;
use selinonlib_core::system::System;

fn write(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::File::create(&path).unwrap().write_all(contents.as_bytes()).unwrap();
    path
}

#[test]
fn minimal_flow_compiles_to_one_edge() {
    let dir = tempfile::tempdir().unwrap();
    let nodes_path = write(
        &dir,
        "nodes.yaml",
        "tasks:\n  - name: Task1\n    import: x.y\nflows:\n  - flow1\nstorages: []\n",
    );
    let flow_path = write(
        &dir,
        "flow1.yaml",
        "flow-definitions:\n  - name: flow1\n    edges:\n      - from: []\n        to: [Task1]\n",
    );

    let registry = LeafRegistry::permissive();
    let system = System::load(&nodes_path, &[flow_path], &registry).unwrap();
    check::check_system(&system).unwrap();

    let artifact = plan::emit(&system, &registry, "test", "2026-01-01T00:00:00Z").unwrap();
    assert_eq!(artifact.flows.len(), 1);
    let flow = &artifact.flows[0];
    assert_eq!(flow.edges.len(), 1);
    assert!(flow.edges[0].nodes_from.is_empty());
    assert_eq!(flow.edges[0].nodes_to, vec!["Task1".to_string()]);
    assert_eq!(flow.edges[0].condition_source.trim(), "true");
}

#[test]
fn flow_referencing_undeclared_flow_name_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let nodes_path = write(
        &dir,
        "nodes.yaml",
        "tasks:\n  - name: Task1\n    import: x.y\nflows: []\nstorages: []\n",
    );
    let flow_path = write(
        &dir,
        "flow1.yaml",
        "flow-definitions:\n  - name: flow1\n    edges:\n      - from: []\n        to: [Task1]\n",
    );

    let registry = LeafRegistry::permissive();
    assert!(System::load(&nodes_path, &[flow_path], &registry).is_err());
}
