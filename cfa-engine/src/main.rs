//! cfa-engine - Consensus Forecast Aggregator
//!
//! Polls forecasting providers on an interval, stores every observation,
//! and maintains one weighted consensus snapshot per event behind a
//! read-only HTTP API.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use cfa_common::config::{load_toml_config, resolve_config_path};
use cfa_common::db::init_database;
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use cfa_engine::adapters::AdapterRegistry;
use cfa_engine::config::StartupConfig;
use cfa_engine::ingestion::{run_scheduler, CycleOutcome, IngestionCoordinator};
use cfa_engine::{build_router, seed, AppState};

/// Command-line arguments for cfa-engine
#[derive(Parser, Debug)]
#[command(name = "cfa-engine")]
#[command(about = "Consensus forecast aggregation engine")]
#[command(version)]
struct Args {
    /// Root folder holding cfa.db
    #[arg(long, global = true)]
    root_folder: Option<PathBuf>,

    /// Path to cfa.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the query API and the ingestion scheduler
    Serve,
    /// Run exactly one ingestion cycle and print its report
    Ingest,
    /// Create default sources and optionally import events
    Seed {
        /// TOML file with [[events]] entries
        #[arg(long)]
        events: Option<PathBuf>,
    },
    /// List markets offered by one source (event discovery)
    Markets {
        /// Source key, e.g. "polymarket"
        source: String,
    },
    /// Mark an event resolved with its outcome
    Resolve { event_id: i64, outcome: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let toml = load_toml_config(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&toml.logging.level)),
        )
        .init();

    info!(
        "Starting cfa-engine v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let startup = StartupConfig::prepare(args.root_folder, config_path, toml)
        .context("Failed to initialize root folder")?;
    info!("Database: {}", startup.database_path.display());

    let pool = init_database(&startup.database_path).await?;

    match args.command {
        Command::Serve => serve(startup, pool).await,
        Command::Ingest => {
            let coordinator = build_coordinator(&startup, pool)?;
            match coordinator.run_cycle().await? {
                CycleOutcome::Completed(report) => {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                CycleOutcome::AlreadyRunning => println!("Ingestion cycle already running"),
            }
            Ok(())
        }
        Command::Seed { events } => {
            let file = events.as_deref().map(seed::load_seed_file).transpose()?;
            let summary = seed::seed(&pool, file.as_ref()).await?;
            println!(
                "Sources created: {}, events created: {}, events already present: {}",
                summary.sources_created, summary.events_created, summary.events_existing
            );
            Ok(())
        }
        Command::Markets { source } => {
            let registry = AdapterRegistry::from_config(&startup.toml.sources, startup.adapter_timeout())?;
            let Some(adapter) = registry.get(&source) else {
                bail!("Unknown source '{}' (known: {})", source, registry.keys().join(", "));
            };
            let markets = adapter.list_markets().await?;
            println!("{}", serde_json::to_string_pretty(&markets)?);
            Ok(())
        }
        Command::Resolve { event_id, outcome } => {
            let mut conn = pool.acquire().await?;
            cfa_engine::db::resolve_event(&mut *conn, event_id, &outcome).await?;
            println!("Event {} resolved: {}", event_id, outcome);
            Ok(())
        }
    }
}

fn build_coordinator(startup: &StartupConfig, pool: sqlx::SqlitePool) -> Result<IngestionCoordinator> {
    let registry = AdapterRegistry::from_config(&startup.toml.sources, startup.adapter_timeout())?;
    info!(adapters = ?registry.keys(), "Adapters registered");
    Ok(IngestionCoordinator::new(pool, registry, startup.coordinator_settings()))
}

async fn serve(startup: StartupConfig, pool: sqlx::SqlitePool) -> Result<()> {
    let settings = startup.coordinator_settings();
    let state = AppState::new(pool.clone(), settings.bootstrap, settings.bootstrap_seed);
    let coordinator = Arc::new(build_coordinator(&startup, pool)?);

    let cancel_token = CancellationToken::new();
    let scheduler = tokio::spawn(run_scheduler(
        coordinator,
        startup.ingest_interval(),
        state.last_error.clone(),
        cancel_token.clone(),
    ));

    let app = build_router(state);
    let bind = &startup.toml.server.bind;
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind to {}", bind))?;
    info!("Listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel_token.clone()))
        .await
        .context("Server error")?;

    cancel_token.cancel();
    if let Err(e) = scheduler.await {
        error!(error = %e, "Scheduler task ended abnormally");
    }

    info!("Shutdown complete");
    Ok(())
}

/// Wait for Ctrl-C, then cancel background work
async fn shutdown_signal(cancel_token: CancellationToken) {
    tokio::select! {
        result = signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Received Ctrl+C, shutting down"),
                Err(e) => error!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
            }
        }
        _ = cancel_token.cancelled() => {}
    }
    cancel_token.cancel();
}
