use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dagflow_core::config::AppConfig;
use dagflow_core::event::EventBus;
use dagflow_core::types::{NodeStatus, RunEvent, RunResult, RunStatus};
use dagflow_engine::cycle::validate_acyclic;
use dagflow_engine::scheduler::{levels, topological_order};
use dagflow_engine::{load_definition, Graph, GraphExecutor, RunConfig, UnitRegistry};
use dagflow_gateway::GatewayServer;
use dagflow_store::SqliteStore;

#[derive(Parser)]
#[command(name = "dagflow", version, about = "Deterministic DAG workflow engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "dagflow.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a graph file once and print the result
    Run {
        /// Graph definition (.json or .toml)
        file: PathBuf,
        /// Run configuration (.json or .toml)
        #[arg(long)]
        run_config: Option<PathBuf>,
        /// Print the full run result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check that a graph file builds and is acyclic
    Validate {
        /// Graph definition (.json or .toml)
        file: PathBuf,
    },
    /// Print the execution order of a graph file
    Order {
        /// Graph definition (.json or .toml)
        file: PathBuf,
        /// Run configuration (.json or .toml)
        #[arg(long)]
        run_config: Option<PathBuf>,
    },
    /// Print the nodes of a graph file grouped by level
    Levels {
        /// Graph definition (.json or .toml)
        file: PathBuf,
        /// Run configuration (.json or .toml)
        #[arg(long)]
        run_config: Option<PathBuf>,
    },
    /// Start the HTTP API server
    Serve,
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("dagflow=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "dagflow", &mut std::io::stdout());
        return Ok(());
    }

    let config = if cli.config.exists() {
        AppConfig::load(&cli.config)?
    } else {
        info!(path = %cli.config.display(), "No config file found, using defaults");
        AppConfig::default()
    };
    let registry = Arc::new(UnitRegistry::with_builtins());

    match cli.command {
        Commands::Run {
            file,
            run_config,
            json,
        } => {
            let graph = build_graph(&file, &registry)?;
            let run_config = load_run_config(run_config.as_deref())?;
            let result = run_graph(&config, &graph, &run_config, json).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_summary(&result);
            }
            if !result.succeeded() {
                anyhow::bail!("run {} {}", result.run_id, result.status);
            }
        }
        Commands::Validate { file } => {
            let graph = build_graph(&file, &registry)?;
            validate_acyclic(&graph)?;
            println!(
                "{}: ok ({} nodes, {} edges, roots: {}, leaves: {})",
                file.display(),
                graph.node_count(),
                graph.edge_count(),
                graph.roots().join(", "),
                graph.leaves().join(", "),
            );
        }
        Commands::Order { file, run_config } => {
            let graph = build_graph(&file, &registry)?;
            let run_config = load_run_config(run_config.as_deref())?;
            run_config.validate(&graph)?;
            for node in topological_order(&graph)?
                .into_iter()
                .filter(|n| run_config.is_enabled(n))
            {
                println!("{node}");
            }
        }
        Commands::Levels { file, run_config } => {
            let graph = build_graph(&file, &registry)?;
            let run_config = load_run_config(run_config.as_deref())?;
            run_config.validate(&graph)?;
            for (i, level) in levels(&graph, &|n| run_config.is_enabled(n))?
                .iter()
                .enumerate()
            {
                println!("{i}: {}", level.join(" "));
            }
        }
        Commands::Serve => {
            let gateway_config = config.gateway.clone().unwrap_or_default();
            let store_path = config.store_path();
            let store = Arc::new(SqliteStore::open(&store_path)?);
            info!(bind = %gateway_config.bind, store = %store_path.display(), "Starting gateway");

            let server = GatewayServer::new(
                gateway_config,
                config.engine.clone(),
                registry,
                store,
                Arc::new(EventBus::default()),
            );
            let cancel = CancellationToken::new();
            let cancel_clone = cancel.clone();

            // Graceful shutdown on Ctrl-C
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Shutting down gateway...");
                cancel_clone.cancel();
            });

            server.run(cancel).await?;
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Completions { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}

fn build_graph(file: &Path, registry: &UnitRegistry) -> anyhow::Result<Graph> {
    let definition = load_definition(file)?;
    Ok(Graph::from_definition(&definition, registry)?)
}

fn load_run_config(path: Option<&Path>) -> anyhow::Result<RunConfig> {
    match path {
        Some(path) => Ok(RunConfig::load(path)?),
        None => Ok(RunConfig::default()),
    }
}

/// Execute one run. Ctrl-C cancels it between nodes; node progress goes to
/// stderr unless the result is printed as JSON.
async fn run_graph(
    config: &AppConfig,
    graph: &Graph,
    run_config: &RunConfig,
    quiet: bool,
) -> anyhow::Result<RunResult> {
    let event_bus = Arc::new(EventBus::default());
    let executor = GraphExecutor::new(config.engine.clone()).with_event_bus(event_bus.clone());

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Cancelling run...");
        cancel_clone.cancel();
    });

    let mut rx = event_bus.subscribe();
    let progress = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(RunEvent::NodeFinished { node, status, .. }) if !quiet => {
                    eprintln!("  {:<24} {}", node, status_label(&status));
                }
                Ok(RunEvent::InputOverwritten { event, .. }) if !quiet => {
                    eprintln!(
                        "  overwrite {}.{}: {} -> {} ({:?})",
                        event.node, event.slot, event.old_value, event.new_value, event.resolution
                    );
                }
                Ok(RunEvent::RunFinished { .. }) | Err(RecvError::Closed) => break,
                Ok(_) | Err(RecvError::Lagged(_)) => {}
            }
        }
    });

    let result = executor.execute(graph, run_config, &cancel).await;
    // Closing the channel ends the progress task even if the run never started.
    drop(executor);
    drop(event_bus);
    progress.await.ok();
    Ok(result?)
}

fn status_label(status: &NodeStatus) -> String {
    match status {
        NodeStatus::Pending => "pending".to_string(),
        NodeStatus::Succeeded => "ok".to_string(),
        NodeStatus::Failed => "FAILED".to_string(),
        NodeStatus::Skipped { reason } => format!("skipped ({reason:?})"),
    }
}

fn print_summary(result: &RunResult) {
    let marker = match result.status {
        RunStatus::Completed => "completed",
        _ if result.cancelled => "cancelled",
        _ => "failed",
    };
    println!("run {} {}", result.run_id, marker);

    for error in &result.errors {
        println!("  error {}: {}", error.node, error.message);
    }
    for (node, outputs) in result.leaf_outputs() {
        for (slot, value) in outputs {
            println!("  {node}.{slot} = {value}");
        }
    }
}
