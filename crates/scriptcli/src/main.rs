// crates/scriptcli/src/main.rs

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use scriptcore::{ExecutionEvent, NodeEvent, NodeSpec, ScriptGraph, Value};
use scriptruntime::{lint, RuntimeConfig, ScriptRuntime, Severity};
use scriptnodes::flow::{BRANCH_FALSE, BRANCH_TRUE};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::Receiver;

#[derive(Parser)]
#[command(name = "script")]
#[command(about = "Visual script engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a graph file until it finishes or the tick budget is spent
    Run {
        /// Path to graph JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Maximum number of ticks
        #[arg(short, long, default_value_t = 1000)]
        ticks: u64,

        /// Seconds per tick
        #[arg(long, default_value_t = 1.0 / 60.0)]
        dt: f64,

        /// Host variable as name=json, may repeat
        #[arg(long = "var", value_name = "NAME=JSON")]
        vars: Vec<String>,

        /// Print the delivery trace after the run
        #[arg(long)]
        trace: bool,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a graph file
    Validate {
        /// Path to graph JSON file
        file: PathBuf,
    },

    /// List available node types
    Nodes,

    /// Create an example graph
    Init {
        /// Output file path
        #[arg(short, long, default_value = "graph.json")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            ticks,
            dt,
            vars,
            trace,
            verbose,
        } => {
            tracing_subscriber::fmt()
                .with_max_level(if verbose {
                    tracing::Level::DEBUG
                } else {
                    tracing::Level::INFO
                })
                .init();

            run_graph(&file, ticks, dt, &vars, trace)?;
        }

        Commands::Validate { file } => {
            validate_graph(&file)?;
        }

        Commands::Nodes => {
            list_nodes();
        }

        Commands::Init { output } => {
            create_example_graph(&output)?;
        }
    }

    Ok(())
}

fn load_graph(file: &Path) -> Result<ScriptGraph> {
    ScriptGraph::from_json_file(file).with_context(|| format!("loading {}", file.display()))
}

fn standard_runtime(record_trace: bool) -> ScriptRuntime {
    ScriptRuntime::with_registry(
        Arc::new(scriptnodes::standard_registry()),
        RuntimeConfig {
            record_trace,
            ..RuntimeConfig::default()
        },
    )
}

/// Parse `name=json`; values that are not valid JSON are taken as strings
fn parse_var(raw: &str) -> Result<(String, Value)> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("variable '{}' must look like name=value", raw))?;
    let value = serde_json::from_str::<serde_json::Value>(value)
        .map(Value::from_json)
        .unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((name.to_string(), value))
}

fn run_graph(file: &Path, max_ticks: u64, dt: f64, vars: &[String], trace: bool) -> Result<()> {
    println!("Loading graph from: {}", file.display());
    let graph = load_graph(file)?;

    println!("Graph: {}", graph.name);
    println!("   Nodes: {}", graph.nodes.len());
    println!("   Connections: {}", graph.connections.len());
    println!();

    let runtime = standard_runtime(trace);
    let mut events = runtime.subscribe_events();
    let mut instance = runtime.instantiate_graph(&graph)?;

    for raw in vars {
        let (name, value) = parse_var(raw)?;
        instance.set_variable(name, value);
    }

    let started = instance.start()?;
    if started.is_empty() {
        return Err(anyhow!("graph has no entry node"));
    }

    while !instance.is_finished() && instance.ticks() < max_ticks {
        let summary = instance.tick(dt);
        tracing::debug!(
            "tick {}: delivered {}, spawned {}, live {}",
            summary.tick,
            summary.delivered,
            summary.spawned,
            summary.live_tokens
        );
        print_events(&mut events);
    }

    println!();
    println!("Summary:");
    println!("   Instance: {}", instance.id());
    println!("   Status: {:?}", instance.status());
    println!("   Ticks: {}", instance.ticks());
    println!("   Live tokens: {}", instance.live_tokens());

    for join in instance.waiting_joins() {
        println!(
            "   Waiting join {} activation {}: {:?} of {:?} for {} ticks",
            join.node, join.activation, join.arrived, join.expected, join.waiting_ticks
        );
    }
    for join in instance.stalled_joins() {
        println!(
            "   Stalled join {} activation {}: {:?} of {:?}",
            join.node, join.activation, join.arrived, join.expected
        );
    }

    if trace {
        println!();
        println!("Trace:");
        for entry in instance.trace() {
            println!(
                "   t{} #{} {} pin {} act {} -> {:?} out {:?}",
                entry.tick,
                entry.seq,
                entry.node,
                entry.pin,
                entry.activation,
                entry.outcome,
                entry.outputs
            );
        }
    }

    Ok(())
}

fn print_events(events: &mut Receiver<ExecutionEvent>) {
    while let Ok(event) = events.try_recv() {
        match event {
            ExecutionEvent::InstanceStarted { instance_id, .. } => {
                println!("Instance {} started", instance_id);
            }
            ExecutionEvent::NodeCompleted {
                node_type,
                node_id,
                activation,
                outputs,
                tick,
                ..
            } => {
                println!(
                    "  [t{}] {} ({}) activation {} fired {:?}",
                    tick, node_type, node_id, activation, outputs
                );
            }
            ExecutionEvent::JoinStalled {
                node_id,
                activation,
                ..
            } => {
                println!("  Join {} stalled in activation {}", node_id, activation);
            }
            ExecutionEvent::JoinTimedOut {
                node_id,
                waited_ticks,
                ..
            } => {
                println!("  Join {} waiting for {} ticks", node_id, waited_ticks);
            }
            ExecutionEvent::NodeEvent { node_id, event, .. } => match event {
                NodeEvent::Info { message } => println!("     [{}] {}", node_id, message),
                NodeEvent::Warning { message } => println!("     [{}] warning: {}", node_id, message),
            },
            ExecutionEvent::InstanceFinished { ticks, .. } => {
                println!("Instance finished after {} ticks", ticks);
            }
            ExecutionEvent::InstanceAborted {
                discarded_tokens, ..
            } => {
                println!("Instance aborted, {} tokens discarded", discarded_tokens);
            }
        }
    }
}

fn validate_graph(file: &Path) -> Result<()> {
    println!("Validating graph: {}", file.display());

    let graph = load_graph(file)?;
    let runtime = standard_runtime(false);
    let compiled = runtime.compile(&graph)?;

    println!("Graph is valid:");
    println!("   Name: {}", compiled.name());
    println!("   Nodes: {}", compiled.node_count());
    println!("   Entry nodes: {}", compiled.entries().len());

    let diagnostics = lint(&compiled);
    for diagnostic in &diagnostics {
        let level = match diagnostic.severity() {
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        println!("   {}: {}", level, diagnostic);
    }

    Ok(())
}

fn list_nodes() {
    println!("Available Node Types:");
    println!();

    let registry = scriptnodes::standard_registry();
    for node_type in registry.list_node_types() {
        if let Some(metadata) = registry.get_metadata(&node_type) {
            println!("  • {} ({})", node_type, metadata.category);
            println!("    {}", metadata.description);
        } else {
            println!("  • {}", node_type);
        }
    }
}

fn create_example_graph(output: &Path) -> Result<()> {
    use scriptnodes::{data, flow};

    let mut graph = ScriptGraph::new("Fork and join");
    graph.description =
        Some("Forks three flows, joins two branch outcomes and stops the third".to_string());

    let start = graph.add_node(NodeSpec::new(flow::START).with_position(0.0, 100.0));
    let fork = graph.add_node(NodeSpec::new(flow::FORK).with_position(150.0, 100.0));
    let yes = graph.add_node(
        NodeSpec::new(data::LITERAL)
            .with_config("value", true)
            .with_position(150.0, 0.0),
    );
    let no = graph.add_node(
        NodeSpec::new(data::LITERAL)
            .with_config("value", false)
            .with_position(150.0, 250.0),
    );
    let branch_a = graph.add_node(NodeSpec::new(flow::BRANCH).with_name("A").with_position(300.0, 0.0));
    let branch_b = graph.add_node(NodeSpec::new(flow::BRANCH).with_name("B").with_position(300.0, 100.0));
    let stop_c = graph.add_node(NodeSpec::new(flow::STOP).with_name("C").with_position(300.0, 200.0));
    let join = graph.add_node(NodeSpec::new(flow::MERGE_ALL).with_position(450.0, 50.0));
    let done = graph.add_node(NodeSpec::new(flow::STOP).with_position(600.0, 50.0));

    graph.connect(start, 0, fork, 0);
    graph.connect(fork, 1, branch_a, 0);
    graph.connect(fork, 2, branch_b, 0);
    graph.connect(fork, 3, stop_c, 0);
    graph.connect(yes, 0, branch_a, 1);
    graph.connect(no, 0, branch_b, 1);
    graph.connect(branch_a, 2 + BRANCH_TRUE, join, 0);
    graph.connect(branch_b, 2 + BRANCH_FALSE, join, 1);
    graph.connect(join, 3, done, 0);

    let json = graph.to_json_pretty()?;
    std::fs::write(output, json)?;

    println!("Created example graph: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  script run --file {} --trace", output.display());

    Ok(())
}
