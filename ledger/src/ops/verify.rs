//! # Address Verification
//!
//! Binds a real wallet address to a chat identity by proving ownership:
//! the user signs their own identity string with the address's key, and
//! the wallet daemon checks both the address and the signature. Only
//! after both external verdicts come back positive does the ledger touch
//! any state — the account is then created (if new) and the address and
//! signature recorded in one transaction.
//!
//! Rebinding is always permitted. The identity is the stable anchor of
//! an account; the address is supplementary metadata, so whoever can
//! produce a valid signature for the *new* address gets it, previous
//! binding or not. The response mentions the previous address purely as
//! information.

use crate::error::{LedgerError, LedgerResult};
use crate::store::AccountId;

use super::Ledger;

// ---------------------------------------------------------------------------
// VerifyOutcome
// ---------------------------------------------------------------------------

/// Result of a successful address verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOutcome {
    /// The newly bound address.
    pub address: String,
    /// The address this identity had bound before, if any.
    pub previous_address: Option<String>,
}

impl VerifyOutcome {
    /// The single user-facing line the dispatcher forwards.
    pub fn message(&self) -> String {
        let bound = format!("Your new verified withdrawal address is {}.", self.address);
        match &self.previous_address {
            Some(prev) => format!("Your previous address was {prev}.\n{bound}"),
            None => bound,
        }
    }
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

impl Ledger {
    /// Verifies ownership of `address` for `identity` and binds it.
    ///
    /// Both daemon calls happen before any account lock is acquired; a
    /// negative verdict on either aborts with no ledger mutation.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidAddress`] if the daemon rejects the address,
    /// [`LedgerError::InvalidSignature`] if the signature does not verify,
    /// [`LedgerError::Daemon`] if the daemon cannot be consulted.
    pub async fn verify_address(
        &self,
        identity: &AccountId,
        address: &str,
        signature: &str,
    ) -> LedgerResult<VerifyOutcome> {
        if !self.daemon().validate_address(address).await? {
            return Err(LedgerError::InvalidAddress {
                address: address.to_string(),
            });
        }

        let verified = self
            .daemon()
            .verify_message(address, signature, identity.signing_message())
            .await?;
        if !verified {
            return Err(LedgerError::InvalidSignature);
        }

        let previous_address = self
            .store_arc()
            .atomically(std::slice::from_ref(identity), |txn| {
                let acct = txn.get_or_create(identity)?;
                let previous = acct.verified_address.replace(address.to_string());
                acct.verified_signature = Some(signature.to_string());
                Ok::<_, LedgerError>(previous)
            })
            .await?;

        tracing::info!(
            identity = %identity,
            address,
            rebound = previous_address.is_some(),
            "address verified"
        );

        Ok(VerifyOutcome {
            address: address.to_string(),
            previous_address,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
