// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Satchel — Custodial Tip Ledger
//!
//! The core library behind the Satchel service: a custodial balance
//! ledger for chat communities. Members hold an internal balance of
//! coin, bind a real wallet address to their identity by proving
//! ownership through a signature the wallet daemon verifies, tip each
//! other, and withdraw to their verified address through the daemon's
//! `sendmany`.
//!
//! ## Architecture
//!
//! Modules mirror the actual concerns of a custody system:
//!
//! - **amount** — Exact fixed-point money. Floats need not apply.
//! - **store** — Transactional account records over sled. The
//!   `atomically` primitive is the only way balances change.
//! - **daemon** — The wallet daemon seam: three JSON-RPC call shapes,
//!   one trait, one HTTP client.
//! - **ops** — The four user operations (verify, transfer, withdraw,
//!   confirm) plus the deposit credit.
//! - **config** — Constants. All of them.
//! - **error** — The failure vocabulary, partitioned into text users see
//!   and faults operators see.
//!
//! ## Design Philosophy
//!
//! 1. Money is never created, destroyed, or double-spent by a code path
//!    in this crate. Internal transfers conserve the total exactly.
//! 2. An irreversible payout never fires without explicit confirmation,
//!    and never shares fate silently with a local debit — see the hold
//!    protocol in [`ops::withdraw`].
//! 3. The wallet daemon is an untrusted oracle: every response is parsed,
//!    every failure is classified.
//! 4. If it touches money, it has tests. Plural.

pub mod amount;
pub mod config;
pub mod daemon;
pub mod error;
pub mod ops;
pub mod store;

pub use amount::{Amount, AmountError};
pub use error::{LedgerError, LedgerResult};
pub use ops::{Ledger, PendingWithdrawal, TransferOutcome, VerifyOutcome, WithdrawOutcome};
pub use store::{Account, AccountId, AccountStore};
