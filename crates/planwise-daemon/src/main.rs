//! Planwise Daemon - Background synchronization service
//!
//! This binary runs as a user service and handles:
//! - Draining queued schedule mutations to the remote document store
//! - Pulling remote updates and surfacing conflicts
//! - Watching network interfaces to gate sync on connectivity quality
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! `run` wires the sync stack from configuration, starts the network
//! observer, and hands control to the `SyncScheduler`. Everything is
//! stopped through a `CancellationToken` that is triggered on receipt of
//! SIGTERM or SIGINT; a pass that is already running is allowed to finish.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use planwise_core::config::Config;
use planwise_core::domain::PassResult;
use planwise_sync::{PassOptions, SyncSummary};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod daemon;
mod local_store;
mod network;

use daemon::DaemonService;

#[derive(Debug, Parser)]
#[command(name = "planwised", version, about = "Planwise offline-first sync daemon")]
struct Cli {
    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the scheduler until interrupted (default)
    Run,
    /// Run a single sync pass and print its result
    Sync(SyncArgs),
    /// Show queue, conflict and connectivity status
    Status(StatusArgs),
}

#[derive(Debug, Args)]
struct SyncArgs {
    /// Sync on any connection, ignoring the quality threshold
    #[arg(long)]
    force: bool,

    /// Also list the remote store and adopt entities not tracked locally
    #[arg(long)]
    full_refresh: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct StatusArgs {
    /// Print the status as JSON
    #[arg(long)]
    json: bool,
}

// ============================================================================
// Configuration and logging
// ============================================================================

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load_or_default(&Config::default_path()),
    };

    let errors = config.validate();
    if !errors.is_empty() {
        let list: Vec<String> = errors.iter().map(ToString::to_string).collect();
        bail!("Invalid configuration:\n  {}", list.join("\n  "));
    }
    Ok(config)
}

/// `RUST_LOG` wins; otherwise `-v` flags, otherwise `logging.level`
fn init_tracing(config: &Config, verbose: u8) {
    let level = match verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}

// ============================================================================
// Graceful shutdown signal handler
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

// ============================================================================
// Output
// ============================================================================

fn print_pass_result(result: &PassResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    let mark = if result.is_clean() { "\u{2713}" } else { "\u{26a0}" };
    println!(
        "{} Pass {} in {} ms",
        mark,
        if result.completed { "completed" } else { "ended early" },
        result.duration_ms
    );
    println!("  Synced:    {}", result.synced);
    println!("  Failed:    {}", result.failed);
    println!("  Pulled:    {}", result.pulled);
    println!("  Conflicts: {}", result.conflicts);
    println!("  Skipped:   {}", result.skipped);
    for error in &result.errors {
        println!("  - {}", error);
    }
    Ok(())
}

fn print_summary(summary: &SyncSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    let last_sync = summary
        .last_sync
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "never".to_string());
    println!("Connectivity: {}", summary.connectivity);
    println!("Last sync:    {}", last_sync);
    println!("Pending:      {}", summary.pending);
    println!("Conflicts:    {}", summary.conflicts);
    println!("Errors:       {}", summary.errors);
    Ok(())
}

// ============================================================================
// Main entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    init_tracing(&config, cli.verbose);

    let service = DaemonService::new(config).await?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            info!("Planwise daemon starting (planwised)");

            let shutdown_token = CancellationToken::new();
            let signal_token = shutdown_token.clone();
            tokio::spawn(async move {
                shutdown_signal(signal_token).await;
            });

            let result = service.run(shutdown_token).await;
            match &result {
                Ok(()) => info!("Planwise daemon shut down gracefully"),
                Err(e) => error!(error = %e, "Planwise daemon exiting with error"),
            }
            result
        }
        Commands::Sync(args) => {
            let options = PassOptions {
                force: args.force,
                full_refresh: args.full_refresh,
            };
            let result = service.sync_once(options).await?;
            print_pass_result(&result, args.json)
        }
        Commands::Status(args) => {
            let summary = service.summary().await?;
            print_summary(&summary, args.json)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
