use criterion::{criterion_group, criterion_main, Criterion};
use selinonlib_core::plan;
use selinonlib_core::predicate::LeafRegistry;
use selinonlib_core::system::{RawFlowFile, RawNodesFile, System};

fn build_system(num_tasks: usize) -> System {
    let mut tasks_yaml = String::new();
    let mut edges_yaml = String::from("      - from: []\n        to: [Task0]\n");
    for i in 0..num_tasks {
        tasks_yaml.push_str(&format!("  - name: Task{i}\n    import: mypkg\n"));
        if i + 1 < num_tasks {
            edges_yaml.push_str(&format!("      - from: [Task{i}]\n        to: [Task{}]\n", i + 1));
        }
    }
    let nodes_raw = format!("tasks:\n{tasks_yaml}storages: []\nflows:\n  - bench_flow\n");
    let flow_raw = format!("flow-definitions:\n  - name: bench_flow\n    edges:\n{edges_yaml}");

    let nodes: RawNodesFile = serde_yaml::from_str(&nodes_raw).unwrap();
    let flow: RawFlowFile = serde_yaml::from_str(&flow_raw).unwrap();
    System::build(nodes, vec![flow], &LeafRegistry::new()).unwrap()
}

fn bench_plan_emit(c: &mut Criterion) {
    let system = build_system(200);
    let registry = LeafRegistry::new();
    c.bench_function("plan_emit_200_tasks", |b| {
        b.iter(|| plan::emit(&system, &registry, "0.1.0", "2026-01-01T00:00:00Z").unwrap())
    });
}

criterion_group!(benches, bench_plan_emit);
criterion_main!(benches);
