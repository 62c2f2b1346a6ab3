//! # Ledger Configuration & Constants
//!
//! Every magic number in Satchel lives here. If you're hardcoding a constant
//! somewhere else, you're doing it wrong and you owe the team coffee.
//!
//! Most of these values mirror the conventions of the wallet daemon we sit
//! in front of: 8 decimal places, a hard supply ceiling, JSON-RPC 1.0 with
//! basic auth on port 8332.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Currency Parameters
// ---------------------------------------------------------------------------

/// Ticker symbol for the coin the ledger custodies.
pub const COIN_TICKER: &str = "SATCH";

/// Number of grains (the smallest indivisible unit) in one whole coin.
/// 10^8, same convention as Bitcoin's satoshi. Every stored balance is an
/// integer count of grains; decimals exist only at the display boundary.
pub const GRAINS_PER_COIN: u64 = 100_000_000;

/// Number of decimal places in the human-facing representation.
/// Keep in sync with [`GRAINS_PER_COIN`] — `10^AMOUNT_DECIMALS` must equal it.
pub const AMOUNT_DECIMALS: u32 = 8;

/// Hard ceiling on total supply, in grains. 21 million coins.
///
/// No single balance, transfer, or withdrawal may exceed this value. It
/// doubles as an overflow guard: the sum of any two legal balances fits
/// comfortably in a `u64`.
pub const MAX_SUPPLY: u64 = 21_000_000 * GRAINS_PER_COIN;

// ---------------------------------------------------------------------------
// Wallet Daemon RPC
// ---------------------------------------------------------------------------

/// Default TCP port of the wallet daemon's JSON-RPC interface.
pub const DEFAULT_DAEMON_RPC_PORT: u16 = 8332;

/// JSON-RPC protocol version the daemon speaks. 1.0, not 2.0 — the daemon
/// predates the newer spec and rejects a `"2.0"` envelope.
pub const RPC_JSONRPC_VERSION: &str = "1.0";

/// Fixed request id sent with every RPC call. The daemon echoes it back;
/// we never multiplex requests on one connection, so a constant is fine.
pub const RPC_REQUEST_ID: &str = "satchel";

/// Default RPC username for local development daemons.
pub const DEFAULT_RPC_USERNAME: &str = "user";

/// Confirmation target passed to `sendmany` for withdrawal payouts.
/// 1 means the daemon may spend outputs with a single confirmation.
pub const PAYOUT_MIN_CONFIRMATIONS: u32 = 1;

/// How long we wait for the daemon before declaring a call failed.
/// Note that a timeout on `sendmany` is an *ambiguous* outcome, not a
/// failure — the payout may have gone through. See the withdrawal module.
pub const DAEMON_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Service Ports
// ---------------------------------------------------------------------------

/// Default port for the dispatcher-facing HTTP API.
pub const DEFAULT_API_PORT: u16 = 8717;

/// Default port for the Prometheus metrics endpoint.
pub const DEFAULT_METRICS_PORT: u16 = 8718;

// ---------------------------------------------------------------------------
// Versioning
// ---------------------------------------------------------------------------

/// Ledger core version string.
pub const LEDGER_VERSION: &str = env!("CARGO_PKG_VERSION");
