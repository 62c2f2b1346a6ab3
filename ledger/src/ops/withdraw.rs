//! # Withdrawal State Machine
//!
//! Converts custodial balance into a real on-chain payout — the one
//! operation in the system that cannot be taken back. It therefore runs
//! in two phases:
//!
//! ```text
//!            request                 confirm
//!   NONE ──────────────▶ PENDING ──────────────▶ NONE (funds left)
//!            ▲               │ newer request
//!            └───────────────┘ (silently replaced)
//! ```
//!
//! A request validates everything but mutates nothing: it parks a
//! [`PendingWithdrawal`] and answers with a preview. Confirmation
//! re-runs the full validity chain — the world may have changed since
//! the request — and only then executes the payout.
//!
//! ## The hold protocol
//!
//! A debit and an external broadcast cannot share a transaction, so the
//! debit is staged as a reversible hold instead:
//!
//! 1. Move the amount from `balance` to `withheld` (committed, lock
//!    released — no lock is ever held across the daemon call).
//! 2. Issue `sendmany`.
//! 3. Daemon confirmed: settle the hold; the grains leave custody.
//!    Daemon definitively rejected or was never reached: release the
//!    hold back to `balance`; nothing moved.
//!    Anything else (timeout, garbled reply): the payout *may* have
//!    broadcast. The hold stays, the account freezes, and the failure is
//!    escalated as an inconsistency for operator reconciliation — never
//!    reported as success, never silently retried.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::amount::Amount;
use crate::config::PAYOUT_MIN_CONFIRMATIONS;
use crate::error::{LedgerError, LedgerResult};
use crate::store::AccountId;

use super::{check_spend, Ledger};

// ---------------------------------------------------------------------------
// PendingWithdrawal
// ---------------------------------------------------------------------------

/// A proposed, unconfirmed withdrawal. At most one per identity; a newer
/// request silently replaces it. Never persisted — a process restart
/// simply means re-requesting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWithdrawal {
    /// The requesting identity.
    pub account_id: AccountId,
    /// The proposed amount.
    pub amount: Amount,
    /// When the request was made.
    pub requested_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// WithdrawOutcome
// ---------------------------------------------------------------------------

/// Result of a withdrawal call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WithdrawOutcome {
    /// The request was recorded and awaits confirmation. Nothing was
    /// debited; `balance_after` is a preview.
    Pending {
        /// Destination address.
        address: String,
        /// Proposed amount.
        amount: Amount,
        /// What the balance will be once confirmed.
        balance_after: Amount,
    },
    /// The payout was broadcast and the balance debited.
    Paid {
        /// Destination address.
        address: String,
        /// Amount withdrawn.
        amount: Amount,
        /// Transaction id reported by the daemon.
        txid: String,
        /// Spendable balance after the debit.
        new_balance: Amount,
    },
}

impl WithdrawOutcome {
    /// The single user-facing line the dispatcher forwards.
    pub fn message(&self) -> String {
        match self {
            WithdrawOutcome::Pending {
                address,
                amount,
                balance_after,
            } => format!(
                "Ready to withdraw {amount} to {address} — confirm to broadcast. \
                 Your balance would be {balance_after}."
            ),
            WithdrawOutcome::Paid {
                address,
                amount,
                txid,
                new_balance,
            } => format!(
                "Withdrew {amount} to {address} (tx {txid}). Your balance is now {new_balance}."
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

impl Ledger {
    /// Requests a withdrawal of `amount` to the caller's verified
    /// address; with `confirm` set, executes it in the same call.
    ///
    /// # Errors
    ///
    /// The shared spend check, [`LedgerError::NoVerifiedAddress`] if no
    /// address is bound, and for confirmed calls everything the payout
    /// path can raise.
    pub async fn withdraw(
        &self,
        identity: &AccountId,
        amount: Amount,
        confirm: bool,
    ) -> LedgerResult<WithdrawOutcome> {
        if confirm {
            return self.execute_payout(identity, amount).await;
        }

        // Request phase: advisory validation, no mutation. The answer is
        // re-checked from scratch at confirmation time.
        let account = self.store().get(identity)?;
        check_spend(identity, account.as_ref(), amount)?;
        let account = account.ok_or_else(|| LedgerError::NoAccount {
            identity: identity.clone(),
        })?;
        let address = account
            .verified_address
            .clone()
            .ok_or(LedgerError::NoVerifiedAddress)?;
        let balance_after =
            account
                .balance
                .checked_sub(amount)
                .ok_or(LedgerError::InsufficientFunds {
                    available: account.balance,
                    requested: amount,
                })?;

        self.pending_map().insert(
            identity.clone(),
            PendingWithdrawal {
                account_id: identity.clone(),
                amount,
                requested_at: Utc::now(),
            },
        );

        tracing::info!(identity = %identity, amount = %amount, "withdrawal pending confirmation");

        Ok(WithdrawOutcome::Pending {
            address,
            amount,
            balance_after,
        })
    }

    /// Confirms the caller's pending withdrawal.
    ///
    /// Consumes the pending entry and re-invokes the withdrawal path with
    /// the stored amount and an implicit confirm. If validation fails
    /// (say the balance dropped since the request), the entry is put
    /// back — it was proposed, not consumed.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NoPendingWithdrawal`] if nothing is pending, plus
    /// everything [`Ledger::withdraw`] can raise.
    pub async fn confirm_withdrawal(&self, identity: &AccountId) -> LedgerResult<WithdrawOutcome> {
        let (_, pending) = self
            .pending_map()
            .remove(identity)
            .ok_or(LedgerError::NoPendingWithdrawal)?;

        match self.withdraw(identity, pending.amount, true).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                // Validation failures leave the proposal standing, unless a
                // newer request already took the slot.
                if err.is_user_error() {
                    self.pending_map()
                        .entry(identity.clone())
                        .or_insert(pending);
                }
                Err(err)
            }
        }
    }

    /// The irreversible half: stage the hold, broadcast, settle.
    async fn execute_payout(
        &self,
        identity: &AccountId,
        amount: Amount,
    ) -> LedgerResult<WithdrawOutcome> {
        // Phase 1 — re-validate and stage the hold, atomically.
        let address = self
            .store_arc()
            .atomically(std::slice::from_ref(identity), |txn| {
                check_spend(identity, txn.get(identity)?, amount)?;
                let acct = txn
                    .get_mut(identity)?
                    .ok_or_else(|| LedgerError::NoAccount {
                        identity: identity.clone(),
                    })?;
                let address = acct
                    .verified_address
                    .clone()
                    .ok_or(LedgerError::NoVerifiedAddress)?;
                acct.hold(amount)?;
                Ok::<_, LedgerError>(address)
            })
            .await?;

        // Phase 2 — broadcast. No ledger lock is held here.
        let attempt_id = Uuid::new_v4();
        let memo = format!("satchel withdrawal for {identity} [{attempt_id}]");
        let payout = self
            .daemon()
            .send_many(
                &[(address.clone(), amount)],
                PAYOUT_MIN_CONFIRMATIONS,
                &memo,
            )
            .await;

        // Phase 3 — settle, release, or escalate.
        match payout {
            Ok(txid) => {
                let new_balance = self
                    .store_arc()
                    .atomically(std::slice::from_ref(identity), |txn| {
                        let acct = txn.get_mut(identity)?.ok_or_else(|| {
                            LedgerError::NoAccount {
                                identity: identity.clone(),
                            }
                        })?;
                        acct.settle_hold(amount)
                            .ok_or(LedgerError::Inconsistency {
                                identity: identity.clone(),
                                amount,
                                attempt_id,
                            })?;
                        Ok::<_, LedgerError>(acct.balance)
                    })
                    .await?;

                self.pending_map().remove(identity);
                tracing::info!(
                    identity = %identity,
                    amount = %amount,
                    txid = %txid,
                    "withdrawal paid out"
                );

                Ok(WithdrawOutcome::Paid {
                    address,
                    amount,
                    txid,
                    new_balance,
                })
            }

            Err(daemon_err) if daemon_err.is_definite_failure() => {
                self.store_arc()
                    .atomically(std::slice::from_ref(identity), |txn| {
                        let acct = txn.get_mut(identity)?.ok_or_else(|| {
                            LedgerError::NoAccount {
                                identity: identity.clone(),
                            }
                        })?;
                        acct.release_hold(amount)
                            .ok_or(LedgerError::Inconsistency {
                                identity: identity.clone(),
                                amount,
                                attempt_id,
                            })?;
                        Ok::<_, LedgerError>(())
                    })
                    .await?;

                tracing::warn!(
                    identity = %identity,
                    amount = %amount,
                    attempt_id = %attempt_id,
                    error = %daemon_err,
                    "payout rejected; hold released"
                );
                Err(LedgerError::Daemon(daemon_err))
            }

            Err(daemon_err) => {
                // The payout may have broadcast. Freeze and escalate;
                // the hold stays exactly as staged.
                self.store_arc()
                    .atomically(std::slice::from_ref(identity), |txn| {
                        let acct = txn.get_mut(identity)?.ok_or_else(|| {
                            LedgerError::NoAccount {
                                identity: identity.clone(),
                            }
                        })?;
                        acct.frozen = true;
                        Ok::<_, LedgerError>(())
                    })
                    .await?;

                tracing::error!(
                    identity = %identity,
                    amount = %amount,
                    attempt_id = %attempt_id,
                    error = %daemon_err,
                    "payout outcome unknown after debit was staged; \
                     account frozen, manual reconciliation required"
                );
                Err(LedgerError::Inconsistency {
                    identity: identity.clone(),
                    amount,
                    attempt_id,
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
