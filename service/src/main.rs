// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Satchel Custody Daemon
//!
//! Entry point for the `satchel-service` binary. Parses CLI arguments,
//! initializes logging and metrics, opens the account store, wires the
//! wallet daemon client, and serves the dispatcher-facing HTTP API.
//!
//! The binary supports three subcommands:
//!
//! - `run`     — start the custody daemon
//! - `status`  — query a running instance's status endpoint
//! - `version` — print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use satchel_ledger::daemon::WalletDaemonClient;
use satchel_ledger::{AccountStore, Ledger};

use cli::{Commands, SatchelCli};
use logging::LogFormat;
use metrics::ServiceMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = SatchelCli::parse();

    match cli.command {
        Commands::Run(args) => run_service(args).await,
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the full custody daemon: API server and metrics endpoint.
async fn run_service(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        "satchel_service=info,satchel_ledger=info,tower_http=debug",
        LogFormat::from_str_lossy(&args.log_format),
    );

    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        rpc_url = %args.rpc_url,
        data_dir = %args.data_dir.display(),
        "starting satchel-service"
    );

    // --- Persistent account store ---
    let db_path = args.data_dir.join("accounts");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create data directory: {}", db_path.display()))?;

    let store = Arc::new(
        AccountStore::open(&db_path)
            .with_context(|| format!("failed to open account store at {}", db_path.display()))?,
    );
    tracing::info!(
        path = %db_path.display(),
        accounts = store.account_count(),
        "account store opened"
    );

    // --- Wallet daemon client ---
    if args.rpc_password.is_none() {
        tracing::warn!("no wallet daemon password configured; set SATCHEL_RPC_PASSWORD");
    }
    let daemon = WalletDaemonClient::new(args.rpc_url, args.rpc_user, args.rpc_password)
        .context("failed to build wallet daemon client")?;

    // --- Ledger core ---
    let ledger = Arc::new(Ledger::new(store, Arc::new(daemon)));

    // --- Metrics ---
    let service_metrics = Arc::new(ServiceMetrics::new());

    // --- Application state ---
    let app_state = api::AppState {
        version: format!(
            "{} (ledger {})",
            env!("CARGO_PKG_VERSION"),
            satchel_ledger::config::LEDGER_VERSION,
        ),
        ledger,
        metrics: Arc::clone(&service_metrics),
        started_at: chrono::Utc::now(),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&service_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    tracing::info!("satchel-service stopped");
    Ok(())
}

/// Queries a running instance's status endpoint and prints the result.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let url = format!("{}/status", args.api_url.trim_end_matches('/'));
    let body = reqwest::get(&url)
        .await
        .with_context(|| format!("failed to reach {}", url))?
        .text()
        .await
        .context("failed to read status body")?;
    println!("{}", body);
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("satchel-service {}", env!("CARGO_PKG_VERSION"));
    println!("ledger          {}", satchel_ledger::config::LEDGER_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
