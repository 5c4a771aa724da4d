//! OnAir Scheduler (onair-sched) - Main entry point
//!
//! Opens the shared database, keeps the channel's schedule advancing and
//! serves the now-playing and queue endpoints.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use onair_common::config::{database_path, ensure_root_folder, resolve_root_folder};
use onair_common::db::init_database;
use onair_common::time::now_ms;
use onair_sched::api::{self, AppContext};
use onair_sched::config::DEFAULT_CHANNEL;
use onair_sched::db::{init_settings_defaults, load_scheduler_config};
use onair_sched::schedule::{run_advancement_loop, Scheduler};

/// Command-line arguments for onair-sched
#[derive(Parser, Debug)]
#[command(name = "onair-sched")]
#[command(about = "Broadcast scheduler for OnAir")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5750", env = "ONAIR_PORT")]
    port: u16,

    /// Root folder holding the shared database
    #[arg(short, long, env = "ONAIR_ROOT_FOLDER")]
    root_folder: Option<String>,

    /// Broadcast channel to schedule
    #[arg(short, long, default_value = DEFAULT_CHANNEL, env = "ONAIR_CHANNEL")]
    channel: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "onair_sched=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!(
        "Starting OnAir Scheduler v{} ({}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = resolve_root_folder(
        args.root_folder.as_deref(),
        "ONAIR_ROOT_FOLDER",
        Some("root_folder"),
    )
    .context("Failed to resolve root folder")?;
    ensure_root_folder(&root_folder).context("Root folder is not usable")?;
    info!("Root folder: {}", root_folder.display());

    let pool = init_database(&database_path(&root_folder))
        .await
        .context("Failed to open database")?;
    init_settings_defaults(&pool)
        .await
        .context("Failed to initialize settings")?;
    let config = load_scheduler_config(&pool)
        .await
        .context("Failed to load scheduler settings")?;
    info!("Scheduling channel '{}' with {:?}", args.channel, config);

    let scheduler = Arc::new(Scheduler::new(pool, args.channel.clone(), config));

    // Settle the schedule before the first listener arrives
    match scheduler.tick(now_ms()).await {
        Ok(outcome) => info!("Startup tick: {:?}", outcome),
        Err(e) => warn!("Startup tick failed, the loop will retry: {}", e),
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let advancement = tokio::spawn(run_advancement_loop(Arc::clone(&scheduler), shutdown_rx));

    api::run(AppContext::new(scheduler), args.port, async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    })
    .await
    .context("HTTP server failed")?;

    advancement
        .await
        .context("Advancement loop panicked")?;

    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
