//! `conductor`: talk to, inspect and cancel runs from the terminal.

mod config;

use clap::{Parser, Subcommand};
use conductor_agent::{ModelConfig, OpenAiCompatibleProvider, ReasoningProvider, RetryingProvider};
use conductor_builtins::register_builtins;
use conductor_core::{ConductorError, Message, Role};
use conductor_orchestrator::{Gateway, NodeProviders, NodeRegistry, Orchestrator};
use conductor_security::{AuditLog, SafetyClassifier};
use conductor_session::{
    CheckpointStore, FileCheckpointStore, FileTranscriptStore, RunOutcome, RunState,
    SqliteCheckpointStore, StateStore,
};
use conductor_tools::{ToolExecutor, ToolRegistry};
use config::{ConductorConfig, StorageBackend};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "conductor", about = "Conductor: multi-agent runs with a human in the loop")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "conductor.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Talk to a run; every line is one submission
    Chat {
        /// Resume an existing run instead of starting a new one
        #[arg(long)]
        run: Option<Uuid>,
    },
    /// Print the state and event log of a run
    Show { run: Uuid },
    /// List persisted runs
    List,
    /// Cancel a run
    Cancel { run: Uuid },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let logs = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.json_logs {
        logs.json().init();
    } else {
        logs.init();
    }

    let config = ConductorConfig::load(&cli.config).await?;
    let gateway = build_gateway(config).await?;

    match cli.command {
        Commands::Chat { run } => chat(&gateway, run).await?,
        Commands::Show { run } => show(&gateway, run).await?,
        Commands::List => {
            let runs = gateway.runs().await?;
            if runs.is_empty() {
                println!("No runs yet.");
            }
            for run_id in runs {
                let snapshot = gateway.state(run_id).await?;
                println!(
                    "{run_id}  {:<16}  v{:<4}  {}",
                    format!("{:?}", snapshot.state.status()),
                    snapshot.version,
                    snapshot.state.updated_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        Commands::Cancel { run } => {
            gateway.cancel(run).await?;
            println!("Run {run} cancelled.");
        }
    }

    Ok(())
}

async fn build_gateway(config: ConductorConfig) -> anyhow::Result<Gateway> {
    let data_dir = config.storage.data_dir.clone();
    tokio::fs::create_dir_all(&data_dir).await?;

    let checkpoints: Arc<dyn CheckpointStore> = match config.storage.backend {
        StorageBackend::Sqlite => Arc::new(SqliteCheckpointStore::open(data_dir.join("runs.db"))?),
        StorageBackend::File => Arc::new(FileCheckpointStore::new(data_dir.join("runs")).await?),
    };
    let store = Arc::new(StateStore::new(checkpoints));

    let mut providers = NodeProviders::new(provider(config.model)?);
    for (node, model) in config.nodes {
        info!(node = %node, model = %model.model_id, "Node model override");
        providers = providers.with(node, provider(model)?);
    }

    let mut registry = ToolRegistry::new();
    register_builtins(&mut registry, &config.tools)?;
    let tools = ToolExecutor::new(Arc::new(registry), config.engine.tool_timeout());

    let mut classifier = SafetyClassifier::with_defaults();
    classifier.extend(config.safety);

    let nodes = NodeRegistry::standard(&providers, tools, Arc::new(classifier), &config.engine)?;
    let transcripts = Arc::new(FileTranscriptStore::new(data_dir.join("transcripts")).await?);
    let audit = Arc::new(AuditLog::new(data_dir.join("audit")));

    let orchestrator = Orchestrator::new(store, nodes, config.engine)
        .with_transcripts(transcripts)
        .with_audit(audit);
    Ok(Gateway::new(Arc::new(orchestrator)))
}

fn provider(model: ModelConfig) -> anyhow::Result<Arc<dyn ReasoningProvider>> {
    let policy = model.retry_policy.clone();
    let backend = OpenAiCompatibleProvider::new(model)?;
    Ok(Arc::new(RetryingProvider::new(Arc::new(backend), policy)))
}

async fn chat(gateway: &Gateway, run: Option<Uuid>) -> anyhow::Result<()> {
    let run_id = match run {
        Some(run_id) => {
            gateway.state(run_id).await?;
            run_id
        }
        None => gateway.create_run().await?,
    };
    println!("Run {run_id}. Type a message, or an empty line to quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        match gateway.submit(run_id, line).await {
            Ok(outcome) => print_outcome(&outcome),
            Err(ConductorError::StaleRun { .. }) => {
                println!("The run moved on while this message was sent; send it again.");
            }
            Err(ConductorError::Cancelled(_)) => {
                println!("Run {run_id} is cancelled.");
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn print_outcome(outcome: &RunOutcome) {
    for msg in outcome
        .transcript_delta
        .iter()
        .filter(|m| m.role != Role::User)
    {
        println!("{}", render(msg));
    }
    if outcome.paused {
        println!("(waiting for your reply)");
    } else {
        println!("({:?})", outcome.status);
    }
}

fn render(msg: &Message) -> String {
    let speaker = msg.name.as_deref().unwrap_or(match msg.role {
        Role::Tool => "tool",
        _ => "assistant",
    });
    format!("[{speaker}] {}", msg.content)
}

async fn show(gateway: &Gateway, run_id: Uuid) -> anyhow::Result<()> {
    let snapshot = gateway.state(run_id).await?;
    print_state(&snapshot.state, snapshot.version);

    let events = gateway.events(run_id).await?;
    if !events.is_empty() {
        println!("\nEvents:");
        for entry in events {
            println!("  [{}] {:?}", entry.superstep, entry.event);
        }
    }
    Ok(())
}

fn print_state(state: &RunState, version: u64) {
    println!("Run:     {}", state.run_id);
    println!("Version: {version}");
    println!("Status:  {:?} ({:?})", state.status(), state.phase);
    if let Some(plan) = &state.plan {
        println!("Plan:    {plan} (revision {})", state.plan_revision);
    }
    for (i, subtask) in state.subtasks.iter().enumerate() {
        let mark = if i < state.next_subtask_index { "x" } else { " " };
        println!("  [{mark}] {} ({})", subtask.description, subtask.owner);
    }
    if !state.pending_tool_calls.is_empty() {
        let tools: Vec<&str> = state
            .pending_tool_calls
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        println!("Awaiting approval for: {}", tools.join(", "));
    }
    if let Some(answer) = &state.final_answer {
        println!("\n{answer}");
    }
}
