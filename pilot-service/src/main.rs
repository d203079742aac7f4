//! Agentpilot runtime service
//!
//! - `serve`: loads enabled agents into the scheduler and runs until Ctrl-C
//! - `run`: executes one agent kind ad hoc, without a run record
//! - `execute-agent` / `execute-run`: one recorded execution, result printed as JSON

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use pilot_agents::{builtin_agent_descriptors, AgentDispatcher};
use pilot_core::{AgentId, RunId, Settings};
use pilot_executor::Executor;
use pilot_plugins::{register_default_plugins, CapabilityRegistry};
use pilot_scheduler::AgentScheduler;
use pilot_state_store::SqliteStore;

/// Crates logged at `info` unless RUST_LOG says otherwise
const DEFAULT_LOG_TARGETS: &[&str] = &[
    "pilot_service",
    "pilot_core",
    "pilot_plugins",
    "pilot_agents",
    "pilot_state_store",
    "pilot_executor",
    "pilot_scheduler",
];

#[derive(Parser, Debug)]
#[command(name = "agentpilot")]
#[command(about = "Scheduled agent runtime")]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    /// TOML settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Database URL (overrides settings)
    #[arg(long)]
    database_url: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the scheduler until interrupted (default)
    Serve,
    /// Run an agent kind once with an inline config, without recording a run
    Run {
        #[arg(long)]
        kind: String,
        /// Agent config document (JSON)
        #[arg(long, default_value = "{}")]
        config: String,
    },
    /// Execute a stored agent once, recording a run
    ExecuteAgent { id: AgentId },
    /// Execute an existing queued run
    ExecuteRun { id: RunId },
    /// List the built-in agent kinds
    Kinds,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from /etc/agentpilot/environment (if exists)
    let env_file = pilot_core::config::load_environment();

    let args = Args::parse();

    let mut settings = Settings::load(args.config.as_deref()).context("loading settings")?;
    if let Some(url) = args.database_url {
        settings.database_url = url;
    }

    init_tracing(args.json_logs || settings.logging.json)?;
    if let Some(path) = env_file {
        info!("Loaded environment from {}", path);
    }
    info!(env = %settings.env, "Settings loaded");

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(&settings).await,
        Commands::Run { kind, config } => {
            let config: Value =
                serde_json::from_str(&config).context("--config must be a JSON document")?;
            let dispatcher = build_dispatcher(&settings).await;
            let result = dispatcher.run_agent(&kind, config).await?;
            print_json(&result)
        }
        Commands::ExecuteAgent { id } => {
            let (_, executor) = build_executor(&settings).await?;
            let result = executor.execute_agent_by_id(id).await?;
            print_json(&result)
        }
        Commands::ExecuteRun { id } => {
            let (_, executor) = build_executor(&settings).await?;
            let result = executor.execute_run(id).await?;
            print_json(&result)
        }
        Commands::Kinds => print_json(&serde_json::to_value(builtin_agent_descriptors())?),
    }
}

fn log_filter() -> Result<tracing_subscriber::EnvFilter> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("sqlx=warn".parse()?);
    DEFAULT_LOG_TARGETS
        .iter()
        .try_fold(filter, |filter, target| {
            Ok(filter.add_directive(format!("{}=info", target).parse()?))
        })
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = log_filter()?;

    // Logs go to stderr so command output on stdout stays machine-readable
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

async fn build_dispatcher(settings: &Settings) -> Arc<AgentDispatcher> {
    let registry = Arc::new(CapabilityRegistry::new());
    register_default_plugins(&registry, &settings.plugins).await;
    let dispatcher = AgentDispatcher::with_builtin_agents(registry);
    info!(kinds = ?dispatcher.kinds(), "Initialized agent dispatcher");
    Arc::new(dispatcher)
}

async fn build_executor(settings: &Settings) -> Result<(Arc<SqliteStore>, Executor)> {
    let dispatcher = build_dispatcher(settings).await;
    let store = Arc::new(
        SqliteStore::new(&settings.database_url)
            .await
            .with_context(|| format!("opening store at {}", settings.database_url))?,
    );
    let executor = Executor::new(store.clone(), dispatcher)?;
    Ok((store, executor))
}

async fn serve(settings: &Settings) -> Result<()> {
    info!("Starting agentpilot runtime...");
    let (store, executor) = build_executor(settings).await?;

    let scheduler = Arc::new(AgentScheduler::new(
        Arc::new(executor.clone()),
        settings.scheduler.overlap_policy,
    ));
    let loaded = scheduler.load_jobs(store.as_ref()).await?;
    scheduler.start().await?;

    let reconcile_secs = settings.scheduler.reconcile_interval_secs;
    if reconcile_secs > 0 {
        scheduler
            .spawn_reconciler(store.clone(), Duration::from_secs(reconcile_secs))
            .await?;
        info!(every_secs = reconcile_secs, "Job reconciliation enabled");
    }
    info!(jobs = loaded, policy = ?scheduler.policy(), "Scheduler running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    // In-flight runs are not awaited; each commits its own record
    scheduler.shutdown().await;

    let metrics = executor.metrics().snapshot();
    if metrics.active > 0 {
        warn!(active = metrics.active, "Exiting with runs still in flight");
    }
    info!(
        started = metrics.started,
        succeeded = metrics.succeeded,
        failed = metrics.failed,
        "agentpilot runtime stopped"
    );
    Ok(())
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
