//! # Wallet Daemon Interface
//!
//! The ledger never touches keys, signatures, or the chain itself — all of
//! that is delegated to an external wallet daemon over JSON-RPC. Exactly
//! three call shapes are consumed:
//!
//! | Method            | Use                                              |
//! |-------------------|--------------------------------------------------|
//! | `validateaddress` | is the claimed address well-formed for the chain |
//! | `verifymessage`   | does the signature over the identity check out   |
//! | `sendmany`        | broadcast a withdrawal payout                    |
//!
//! [`WalletRpc`] is the seam: the operations layer holds a trait object,
//! the binary wires in the HTTP [`client::WalletDaemonClient`], and the
//! test suites substitute scripted fakes.
//!
//! The daemon is an untrusted oracle. Every response is parsed into a
//! typed result; a missing field, a non-boolean verdict, or a half-closed
//! socket is a [`DaemonError`], never an assumption. For `sendmany` the
//! error's *classification* matters as much as its occurrence — see
//! [`DaemonError::is_definite_failure`].

pub mod client;

use async_trait::async_trait;
use thiserror::Error;

use crate::amount::Amount;

pub use client::WalletDaemonClient;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur talking to the wallet daemon.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// The daemon could not be reached at all — the request never left.
    #[error("wallet daemon unreachable: {0}")]
    Unreachable(String),

    /// The daemon did not answer in time. The request may have been
    /// received and acted upon.
    #[error("wallet daemon timed out")]
    Timeout,

    /// The transport failed after the request may have been sent.
    #[error("wallet daemon transport error: {0}")]
    Transport(String),

    /// The daemon answered with a JSON-RPC error object.
    #[error("wallet daemon rejected the call: {message} (code {code})")]
    Rpc {
        /// Daemon-side error code.
        code: i64,
        /// Daemon-side error message.
        message: String,
    },

    /// The daemon answered, but not in the shape the method promises.
    /// The call may still have been executed daemon-side.
    #[error("malformed wallet daemon response: {0}")]
    MalformedResponse(String),
}

impl DaemonError {
    /// `true` when the call definitively did not execute: the request
    /// never reached the daemon, or the daemon explicitly rejected it.
    ///
    /// Everything else is ambiguous — a `sendmany` that timed out or came
    /// back unparseable may have broadcast real money. The withdrawal
    /// state machine rolls a hold back only on a definite failure and
    /// escalates the rest to reconciliation.
    pub fn is_definite_failure(&self) -> bool {
        matches!(self, DaemonError::Unreachable(_) | DaemonError::Rpc { .. })
    }
}

// ---------------------------------------------------------------------------
// WalletRpc
// ---------------------------------------------------------------------------

/// The three wallet daemon calls the ledger consumes.
#[async_trait]
pub trait WalletRpc: Send + Sync {
    /// `validateaddress`: whether `address` is well-formed for the chain.
    async fn validate_address(&self, address: &str) -> Result<bool, DaemonError>;

    /// `verifymessage`: whether `signature` is a valid signature of
    /// `message` by the key behind `address`.
    async fn verify_message(
        &self,
        address: &str,
        signature: &str,
        message: &str,
    ) -> Result<bool, DaemonError>;

    /// `sendmany`: broadcast a payout of each listed amount to its
    /// address, spending outputs with at least `min_confirmations`
    /// confirmations, with `comment` attached to the daemon-side record.
    /// Returns the broadcast transaction id.
    async fn send_many(
        &self,
        amounts: &[(String, Amount)],
        min_confirmations: u32,
        comment: &str,
    ) -> Result<String, DaemonError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_classification() {
        assert!(DaemonError::Unreachable("refused".into()).is_definite_failure());
        assert!(DaemonError::Rpc {
            code: -6,
            message: "Insufficient funds".into()
        }
        .is_definite_failure());

        assert!(!DaemonError::Timeout.is_definite_failure());
        assert!(!DaemonError::Transport("reset by peer".into()).is_definite_failure());
        assert!(!DaemonError::MalformedResponse("not json".into()).is_definite_failure());
    }
}
