use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use strand_core::config::AppConfig;
use strand_core::event::EventBus;
use strand_core::pricing::PriceTable;
use strand_core::traits::ChatClient;
use strand_core::types::{FlowEvent, LogLevel, NodeState};

use strand_flow::expr::{self, DummyScope};
use strand_flow::{
    available_values, ExecutionContext, FlowDocument, FlowExecutor, FlowGraph, NodeRegistry,
    RunLogger, ThreadMaintainer,
};

#[derive(Parser)]
#[command(name = "strand", version, about = "Flow orchestration engine for chat-completion pipelines")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "strand.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a flow file and print its final context
    Run {
        /// Flow document ({nodes, edges} JSON)
        flow: PathBuf,
        /// Initial execution context (JSON object); repeat to layer files,
        /// later ones overriding earlier keys
        #[arg(long)]
        context: Vec<PathBuf>,
        /// Write the final execution context to this file
        #[arg(long)]
        context_out: Option<PathBuf>,
        /// Use the fake chat client instead of the configured provider
        #[arg(long)]
        fake: bool,
    },
    /// Check that a statement parses
    Validate {
        statement: String,
    },
    /// Evaluate a statement against a JSON context
    Eval {
        statement: String,
        /// Context file (JSON); placeholders resolve against it
        #[arg(long)]
        context: Option<PathBuf>,
    },
    /// Recompute thread tags for a flow file
    Threads {
        flow: PathBuf,
        /// Write the retagged flow back to the file
        #[arg(long)]
        write: bool,
    },
    /// List the placeholders available to a node
    Values {
        flow: PathBuf,
        node_id: String,
    },
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
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("strand=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Commands that need no config
    match &cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "strand", &mut std::io::stdout());
            return Ok(());
        }
        Commands::Validate { statement } => return validate(statement),
        Commands::Eval { statement, context } => return eval(statement, context.as_deref()),
        _ => {}
    }

    let mut config = load_config(&cli.config)?;

    match cli.command {
        Commands::Run {
            flow,
            context,
            context_out,
            fake,
        } => {
            if fake {
                config.model.provider = "fake".to_string();
            }
            run_flow(&config, &flow, &context, context_out.as_deref()).await?;
        }
        Commands::Threads { flow, write } => {
            let registry = build_registry(&config)?;
            let mut graph = FlowGraph::from_document(FlowDocument::load(&flow)?)?;
            let change = ThreadMaintainer::new(registry).rebuild(&mut graph);

            for node in graph.nodes() {
                println!(
                    "{:<24} {:<14} thread={:<12} parent={}",
                    node.id,
                    node.kind.as_str(),
                    node.thread(),
                    node.parent_id().unwrap_or("-")
                );
            }
            for edge in &change.removed_edges {
                println!("removed edge {} ({} -> {})", edge.id, edge.source, edge.target);
            }
            if write {
                graph.to_document().save(&flow)?;
                info!(path = %flow.display(), "Flow file updated");
            }
        }
        Commands::Values { flow, node_id } => {
            let registry = build_registry(&config)?;
            let graph = FlowGraph::from_document(FlowDocument::load(&flow)?)?;
            for placeholder in available_values(&graph, &registry, &node_id)? {
                println!("{}", placeholder);
            }
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Completions { .. } | Commands::Validate { .. } | Commands::Eval { .. } => {}
    }

    Ok(())
}

fn validate(statement: &str) -> anyhow::Result<()> {
    match expr::evaluate(statement, &DummyScope) {
        Ok(_) => {
            println!("valid");
            Ok(())
        }
        Err(e) => anyhow::bail!("invalid statement: {}", e),
    }
}

fn eval(statement: &str, context: Option<&Path>) -> anyhow::Result<()> {
    let scope = match context {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => serde_json::Value::Object(Default::default()),
    };
    let value = expr::evaluate(statement, &scope)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

async fn run_flow(
    config: &AppConfig,
    flow: &Path,
    context: &[PathBuf],
    context_out: Option<&Path>,
) -> anyhow::Result<()> {
    let graph = FlowGraph::from_document(FlowDocument::load(flow)?)?;
    let initial = ExecutionContext::load(context)?;

    let registry = build_registry(config)?;
    let event_bus = Arc::new(EventBus::default());
    let cancel = CancellationToken::new();

    let flow_name = flow
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "flow".to_string());

    let logger = config
        .engine
        .log
        .as_ref()
        .filter(|log| log.enabled)
        .map(|log| {
            RunLogger::new(log.dir(), log.level).spawn(&event_bus, flow_name.clone(), cancel.clone())
        });

    // Event printer
    let mut rx = event_bus.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                FlowEvent::NodeStateChanged { node_id, state } => {
                    if matches!(state, NodeState::Completed | NodeState::Failed) {
                        eprintln!("[{}: {}]", node_id, state);
                    }
                }
                FlowEvent::NodeLog(log) => {
                    let payload = log.payload.map(|p| p.to_string()).unwrap_or_default();
                    match log.level {
                        LogLevel::Error => eprintln!("[{}: ERROR] {} {}", log.id, log.title, payload),
                        _ => eprintln!("[{}] {} {}", log.id, log.title, truncate(&payload, 200)),
                    }
                }
                FlowEvent::RunStopped { .. } => break,
                _ => {}
            }
        }
    });

    // Ctrl-C stops entering new nodes
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            ctrl_c_cancel.cancel();
        }
    });

    let executor = FlowExecutor::new(registry, config.engine.clone(), event_bus.clone());
    let report = executor.run_with_cancel(&graph, initial, cancel).await;

    printer.await.ok();
    if let Some(handle) = logger {
        handle.await.ok();
    }

    if report.run_id.is_none() {
        eprintln!("Flow has no start node, nothing ran.");
        return Ok(());
    }

    println!("{}", serde_json::to_string_pretty(&report.context.clone().into_value())?);
    eprintln!(
        "\n[{} | {} in / {} out tokens | {}]",
        report.summary.duration_display(),
        report.summary.in_tokens,
        report.summary.out_tokens,
        report.summary.amount_display()
    );

    if let Some(path) = context_out {
        std::fs::write(path, serde_json::to_string_pretty(&report.context.clone().into_value())?)?;
        info!(path = %path.display(), "Context written");
    }

    let failed = report.failed_nodes();
    if !failed.is_empty() {
        anyhow::bail!("{} node(s) failed: {}", failed.len(), failed.join(", "));
    }
    Ok(())
}

fn build_registry(config: &AppConfig) -> anyhow::Result<Arc<NodeRegistry>> {
    let client: Arc<dyn ChatClient> = Arc::from(strand_llm::create_retrying_client(config)?);
    Ok(Arc::new(NodeRegistry::with_builtins(
        client,
        config.model.clone(),
        PriceTable::new(config.pricing.clone()),
    )))
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }

    // Check for config in the home directory
    if let Some(home_config) = dirs_home().map(|h| h.join(".strand").join("config.toml")) {
        if home_config.exists() {
            info!(path = %home_config.display(), "Loading config from home directory");
            return Ok(AppConfig::load(&home_config)?);
        }
    }

    eprintln!("Warning: No config file found. Set OPENAI_API_KEY or create strand.toml");
    Ok(create_env_config())
}

/// Minimal config from the environment: OpenAI when a key is set, otherwise
/// the fake provider.
fn create_env_config() -> AppConfig {
    let mut config = AppConfig::default();
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) => config.model.api_key = Some(key),
        Err(_) => config.model.provider = "fake".to_string(),
    }
    config
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
