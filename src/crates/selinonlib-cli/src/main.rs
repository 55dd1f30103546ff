//! # selinonlib
//!
//! Compiles a set of YAML flow definitions into a validated plan, and
//! answers a handful of operational questions about the result (task
//! queues, dispatcher queues, a rendered dependency graph) without needing a
//! second tool.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use selinonlib_core::check;
use selinonlib_core::plan;
use selinonlib_core::predicate::LeafRegistry;
use selinonlib_core::system::System;

mod graph;

#[derive(Parser)]
#[command(name = "selinonlib")]
#[command(about = "Compile and validate selinonlib task-flow configurations", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the nodes definition file (tasks and storages).
    #[arg(long = "nodes-definition")]
    nodes_definition: PathBuf,

    /// Path to a flow definition file. Repeatable.
    #[arg(long = "flow-definition", required = true)]
    flow_definition: Vec<PathBuf>,

    /// Optional top-level config file, reserved for global dispatcher
    /// settings not yet modeled here.
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Skip the whole-system static checks after parsing.
    #[arg(long = "no-check")]
    no_check: bool,

    /// Write the compiled plan artifact as JSON to this path.
    #[arg(long = "dump")]
    dump: Option<PathBuf>,

    /// Directory to write one dependency-graph file per flow into.
    #[arg(long = "graph")]
    graph: Option<PathBuf>,

    /// Format for `--graph`.
    #[arg(long = "graph-format", default_value = "dot")]
    graph_format: graph::GraphFormat,

    /// Print every distinct task queue name referenced by the configuration.
    #[arg(long = "list-task-queues")]
    list_task_queues: bool,

    /// Print every distinct dispatcher (flow) queue name.
    #[arg(long = "list-dispatcher-queue")]
    list_dispatcher_queue: bool,

    /// Increase log verbosity. May be repeated (`-vv`, `-vvv`).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

/// `0` success. `1` is reserved for "no mode selected" (help printed, per the
/// original CLI's convention). Everything else non-zero is an error: `2`
/// configuration could not be loaded or failed the static checker, `3` an
/// output (`--dump`/`--graph`) could not be written.
fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::from(2)
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> anyhow::Result<ExitCode> {
    let registry = LeafRegistry::permissive();

    let system = match System::load(&cli.nodes_definition, &cli.flow_definition, &registry) {
        Ok(system) => system,
        Err(err) => {
            tracing::error!("failed to load configuration: {err}");
            return Ok(ExitCode::from(2));
        }
    };

    if !cli.no_check {
        if let Err(err) = check::check_system(&system) {
            tracing::error!("static check failed: {err}");
            return Ok(ExitCode::from(2));
        }
    }

    tracing::info!(
        tasks = system.tasks.len(),
        flows = system.flows.len(),
        storages = system.storages.len(),
        "configuration loaded"
    );

    let mut some_work = false;

    if cli.list_task_queues {
        for task in &system.tasks {
            println!("{}:{}", task.name, task.queue_name.as_deref().unwrap_or(""));
        }
        some_work = true;
    }

    if cli.list_dispatcher_queue {
        let queue = system
            .global
            .as_ref()
            .and_then(|g| g.default_dispatcher_queue.as_deref())
            .unwrap_or("");
        println!("dispatcher:{queue}");
        some_work = true;
    }

    if let Some(graph_dir) = &cli.graph {
        if let Err(err) = std::fs::create_dir_all(graph_dir) {
            tracing::error!("failed to create {}: {err}", graph_dir.display());
            return Ok(ExitCode::from(3));
        }
        for (flow_name, body) in graph::render(&system, cli.graph_format) {
            let path = graph_dir.join(format!("{flow_name}.{}", cli.graph_format.extension()));
            if let Err(err) = std::fs::write(&path, body) {
                tracing::error!("failed to write graph to {}: {err}", path.display());
                return Ok(ExitCode::from(3));
            }
        }
        some_work = true;
    }

    if let Some(dump_path) = &cli.dump {
        let artifact = plan::emit(
            &system,
            &registry,
            env!("CARGO_PKG_VERSION"),
            chrono::Utc::now().to_rfc3339(),
        )?;
        let body = artifact.to_json()?;
        if let Err(err) = std::fs::write(dump_path, body) {
            tracing::error!("failed to write plan to {}: {err}", dump_path.display());
            return Ok(ExitCode::from(3));
        }
        some_work = true;
    }

    if !some_work {
        Cli::command().print_help().ok();
        println!();
        return Ok(ExitCode::from(1));
    }

    Ok(ExitCode::SUCCESS)
}
