//! Renders a `System`'s flows as a dependency graph for `--graph`.

use clap::ValueEnum;
use selinonlib_core::system::System;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum GraphFormat {
    Dot,
    Mermaid,
}

impl GraphFormat {
    pub fn extension(self) -> &'static str {
        match self {
            GraphFormat::Dot => "dot",
            GraphFormat::Mermaid => "mmd",
        }
    }
}

/// One diagram per flow, named `{flow_name}.{ext}`, ready to be written under
/// the caller's `--graph OUT_DIR`. Rendering an actual SVG is out of scope —
/// this emits the source format the operator's own graphviz/mermaid toolchain
/// consumes, so selinonlib itself carries no rendering dependency.
pub fn render(system: &System, format: GraphFormat) -> Vec<(String, String)> {
    system
        .flows
        .iter()
        .map(|flow| {
            let body = match format {
                GraphFormat::Dot => render_dot(system, flow),
                GraphFormat::Mermaid => render_mermaid(system, flow),
            };
            (flow.name.clone(), body)
        })
        .collect()
}

fn render_dot(system: &System, flow: &selinonlib_core::node::Flow) -> String {
    let mut out = format!("digraph \"{}\" {{\n", flow.name);
    for edge in &flow.edges {
        let sources: Vec<&str> = edge.nodes_from.iter().map(|n| system.node_name(*n)).collect();
        let targets: Vec<&str> = edge.nodes_to.iter().map(|n| system.node_name(*n)).collect();
        if sources.is_empty() {
            for to in &targets {
                out.push_str(&format!("  \"__start\" -> \"{to}\";\n"));
            }
        } else {
            for from in &sources {
                for to in &targets {
                    out.push_str(&format!("  \"{from}\" -> \"{to}\";\n"));
                }
            }
        }
    }
    out.push_str("}\n");
    out
}

fn render_mermaid(system: &System, flow: &selinonlib_core::node::Flow) -> String {
    let mut out = String::from("flowchart TD\n");
    for edge in &flow.edges {
        let sources: Vec<&str> = edge.nodes_from.iter().map(|n| system.node_name(*n)).collect();
        let targets: Vec<&str> = edge.nodes_to.iter().map(|n| system.node_name(*n)).collect();
        if sources.is_empty() {
            for to in &targets {
                out.push_str(&format!("  start((start)) --> {to}\n"));
            }
        } else {
            for from in &sources {
                for to in &targets {
                    out.push_str(&format!("  {from} --> {to}\n"));
                }
            }
        }
    }
    out
}
