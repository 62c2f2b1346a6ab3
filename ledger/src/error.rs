//! # Ledger Error Types
//!
//! Every operation on the ledger core returns a [`LedgerError`] on failure.
//! The enum is exhaustive over the failure modes of the four operations
//! (verify, transfer, withdraw, confirm).
//!
//! Errors split into two families, and [`LedgerError::is_user_error`] is
//! the partition: validation failures are recovered locally — their
//! `Display` text *is* the message the chat dispatcher forwards to the
//! user — while operational failures (daemon unreachable, storage fault,
//! payout inconsistency) are logged and surfaced as a generic apology.
//! An inconsistency is additionally never allowed to masquerade as
//! success; see the withdrawal module.

use thiserror::Error;
use uuid::Uuid;

use crate::amount::{Amount, AmountError};
use crate::daemon::DaemonError;
use crate::store::account::AccountId;
use crate::store::db::StoreError;

/// Convenience alias used throughout the operations layer.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// How far short a spend falls, for the insufficient-funds message.
fn shortfall(available: &Amount, requested: &Amount) -> Amount {
    Amount::from_grains(requested.grains().saturating_sub(available.grains()))
}

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The wallet daemon reported the claimed address as invalid.
    #[error("invalid address: {address}")]
    InvalidAddress {
        /// The address as the user submitted it.
        address: String,
    },

    /// The wallet daemon did not verify the signature over the identity.
    #[error("invalid cryptographic signature")]
    InvalidSignature,

    /// The requester has no account record yet. Verifying an address is
    /// how one comes into existence.
    #[error("no account for {identity}; verify an address first")]
    NoAccount {
        /// The identity that has no record.
        identity: AccountId,
    },

    /// The requested spend exceeds the spendable balance. The message
    /// states the balance and the exact shortfall.
    #[error(
        "insufficient funds: your balance is {available}, requested {requested} (short by {})",
        shortfall(.available, .requested)
    )]
    InsufficientFunds {
        /// Current spendable balance.
        available: Amount,
        /// The amount that was requested.
        requested: Amount,
    },

    /// A zero amount is a no-op and always rejected.
    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// The requested amount exceeds the total supply ceiling — more coin
    /// than can exist.
    #[error("amount {requested} exceeds the maximum supply")]
    ExceedsSupply {
        /// The offending amount.
        requested: Amount,
    },

    /// Withdrawal requested by an account with no verified address.
    #[error("no verified withdrawal address on file; verify an address first")]
    NoVerifiedAddress,

    /// Confirmation arrived with nothing pending to confirm.
    #[error("no pending withdrawal to confirm")]
    NoPendingWithdrawal,

    /// The account is frozen pending operator reconciliation.
    #[error("account {identity} is frozen pending reconciliation; contact an operator")]
    AccountFrozen {
        /// The frozen identity.
        identity: AccountId,
    },

    /// The amount string could not be parsed.
    #[error(transparent)]
    Amount(#[from] AmountError),

    /// The wallet daemon could not be consulted.
    #[error("wallet daemon error: {0}")]
    Daemon(#[from] DaemonError),

    /// A payout's outcome is unknown after funds were staged — the single
    /// failure this system refuses to paper over. The hold stays in place,
    /// the account is frozen, and an operator must reconcile against the
    /// daemon's transaction list.
    #[error(
        "withdrawal of {amount} for {identity} requires manual reconciliation (attempt {attempt_id})"
    )]
    Inconsistency {
        /// The affected identity.
        identity: AccountId,
        /// The staged amount.
        amount: Amount,
        /// Correlation id embedded in the payout memo, for matching
        /// against the daemon's records.
        attempt_id: Uuid,
    },

    /// The account store failed beneath us.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl LedgerError {
    /// `true` for validation failures whose `Display` text is meant for
    /// the end user; `false` for operational failures that get logged and
    /// replaced with a generic message at the dispatch boundary.
    pub fn is_user_error(&self) -> bool {
        !matches!(
            self,
            LedgerError::Daemon(_) | LedgerError::Inconsistency { .. } | LedgerError::Store(_)
        )
    }

    /// The single line of text the chat dispatcher forwards unmodified.
    pub fn user_message(&self) -> String {
        match self {
            LedgerError::Daemon(_) => {
                "The wallet service is currently unavailable. Please try again later.".to_string()
            }
            LedgerError::Store(_) => {
                "Something went wrong on our side. Please try again later.".to_string()
            }
            LedgerError::Inconsistency { .. } => {
                "Your withdrawal could not be completed cleanly. An operator has been notified; \
                 your funds are safe but on hold until reconciliation."
                    .to_string()
            }
            user_facing => user_facing.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
