//! # CLI Interface
//!
//! Defines the command-line argument structure for `satchel-service`
//! using `clap` derive. Supports three subcommands: `run`, `status`,
//! and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Satchel custody daemon.
///
/// Sits between a chat-command dispatcher and a wallet daemon: holds
/// custodial balances, verifies address ownership, moves tips between
/// members, and pays out confirmed withdrawals. Exposes an HTTP API for
/// the dispatcher and Prometheus metrics for operators.
#[derive(Parser, Debug)]
#[command(
    name = "satchel-service",
    about = "Satchel custody daemon",
    version,
    propagate_version = true
)]
pub struct SatchelCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the service binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the custody daemon.
    Run(RunArgs),
    /// Query the status of a running instance via its HTTP API.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the data directory where the account store lives.
    ///
    /// Created on first run if it does not exist.
    #[arg(long, short = 'd', env = "SATCHEL_DATA_DIR", default_value = ".satchel")]
    pub data_dir: PathBuf,

    /// Port for the dispatcher-facing HTTP API.
    #[arg(long, env = "SATCHEL_API_PORT", default_value_t = satchel_ledger::config::DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "SATCHEL_METRICS_PORT", default_value_t = satchel_ledger::config::DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// URL of the wallet daemon's JSON-RPC interface.
    #[arg(long, env = "SATCHEL_RPC_URL", default_value = "http://127.0.0.1:8332/")]
    pub rpc_url: String,

    /// Basic-auth username for the wallet daemon.
    #[arg(long, env = "SATCHEL_RPC_USER", default_value = satchel_ledger::config::DEFAULT_RPC_USERNAME)]
    pub rpc_user: String,

    /// Basic-auth password for the wallet daemon.
    ///
    /// Prefer the environment variable — argv is readable by any `ps`.
    #[arg(long, env = "SATCHEL_RPC_PASSWORD", hide_env_values = true)]
    pub rpc_password: Option<String>,

    /// Log output format: "pretty" or "json".
    #[arg(long, env = "SATCHEL_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// HTTP API endpoint of the running instance.
    #[arg(long, default_value = "http://127.0.0.1:8717")]
    pub api_url: String,
}
