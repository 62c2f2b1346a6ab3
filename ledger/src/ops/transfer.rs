//! # Transfer Engine
//!
//! Moves balance from one identity to another inside a single store
//! transaction: the spend check, the sender debit, and the recipient
//! credit (creating the recipient's record if this is their first tip)
//! all commit together or not at all. The total in custody is conserved
//! exactly.
//!
//! Each invocation performs exactly one transfer — there is no built-in
//! idempotency, and the dispatcher owns not double-submitting. A
//! self-transfer is allowed: it still runs the full spend check and ends
//! balance-neutral.

use crate::amount::Amount;
use crate::error::{LedgerError, LedgerResult};
use crate::store::AccountId;

use super::{check_spend, Ledger};

// ---------------------------------------------------------------------------
// TransferOutcome
// ---------------------------------------------------------------------------

/// Result of a committed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    /// The paying identity.
    pub sender: AccountId,
    /// The receiving identity.
    pub recipient: AccountId,
    /// Amount moved.
    pub amount: Amount,
    /// Sender's balance after the transfer.
    pub sender_balance: Amount,
    /// Recipient's balance after the transfer.
    pub recipient_balance: Amount,
}

impl TransferOutcome {
    /// The single user-facing line the dispatcher forwards.
    pub fn message(&self) -> String {
        format!(
            "Sent {} to {}. Your balance is now {}.",
            self.amount, self.recipient, self.sender_balance
        )
    }
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

impl Ledger {
    /// Transfers `amount` from `sender` to `recipient`.
    ///
    /// Never consults the wallet daemon — tips keep working even when the
    /// daemon is down.
    ///
    /// # Errors
    ///
    /// Whatever the shared spend check reports for the sender; the
    /// recipient cannot fail (their record is created on demand).
    pub async fn transfer(
        &self,
        sender: &AccountId,
        recipient: &AccountId,
        amount: Amount,
    ) -> LedgerResult<TransferOutcome> {
        let ids = [sender.clone(), recipient.clone()];

        let (sender_balance, recipient_balance) = self
            .store_arc()
            .atomically(&ids, |txn| {
                check_spend(sender, txn.get(sender)?, amount)?;

                txn.get_mut(sender)?
                    .ok_or_else(|| LedgerError::NoAccount {
                        identity: sender.clone(),
                    })?
                    .debit(amount)?;
                txn.get_or_create(recipient)?.credit(amount)?;

                // Read back after both mutations — for a self-transfer the
                // two balances are the same record.
                let balance_of = |txn: &crate::store::Txn, id: &AccountId| {
                    txn.get(id)?
                        .map(|a| a.balance)
                        .ok_or_else(|| LedgerError::NoAccount {
                            identity: id.clone(),
                        })
                };
                let sender_balance = balance_of(txn, sender)?;
                let recipient_balance = balance_of(txn, recipient)?;
                Ok::<_, LedgerError>((sender_balance, recipient_balance))
            })
            .await?;

        tracing::info!(
            sender = %sender,
            recipient = %recipient,
            amount = %amount,
            "transfer committed"
        );

        Ok(TransferOutcome {
            sender: sender.clone(),
            recipient: recipient.clone(),
            amount,
            sender_balance,
            recipient_balance,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::testing::NullDaemon;
    use super::*;
    use crate::store::AccountStore;

    async fn funded_ledger(balance: u64) -> (Ledger, AccountId, AccountId) {
        let store = Arc::new(AccountStore::open_temporary().unwrap());
        // NullDaemon: a transfer that consults the daemon is a bug.
        let ledger = Ledger::new(store, Arc::new(NullDaemon));
        let alice = AccountId::from(1u64);
        let bob = AccountId::from(2u64);
        if balance > 0 {
            ledger
                .credit(&alice, Amount::from_grains(balance))
                .await
                .unwrap();
        }
        (ledger, alice, bob)
    }

    #[tokio::test]
    async fn transfer_moves_and_conserves() {
        let (ledger, alice, bob) = funded_ledger(1000).await;

        let outcome = ledger
            .transfer(&alice, &bob, Amount::from_grains(400))
            .await
            .unwrap();

        assert_eq!(outcome.sender_balance, Amount::from_grains(600));
        assert_eq!(outcome.recipient_balance, Amount::from_grains(400));
        assert_eq!(ledger.store().total_grains().unwrap(), 1000);
    }

    #[tokio::test]
    async fn transfer_creates_recipient_lazily() {
        let (ledger, alice, bob) = funded_ledger(500).await;
        assert!(ledger.account_of(&bob).unwrap().is_none());

        ledger
            .transfer(&alice, &bob, Amount::from_grains(200))
            .await
            .unwrap();

        let bob_acct = ledger.account_of(&bob).unwrap().expect("created");
        assert_eq!(bob_acct.balance, Amount::from_grains(200));
        assert!(!bob_acct.is_verified());
    }

    #[tokio::test]
    async fn zero_amount_rejected_without_mutation() {
        let (ledger, alice, bob) = funded_ledger(500).await;

        let err = ledger.transfer(&alice, &bob, Amount::ZERO).await.unwrap_err();
        assert!(matches!(err, LedgerError::ZeroAmount));

        assert_eq!(
            ledger.account_of(&alice).unwrap().unwrap().balance,
            Amount::from_grains(500)
        );
        assert!(ledger.account_of(&bob).unwrap().is_none());
    }

    #[tokio::test]
    async fn insufficient_funds_rejected_without_mutation() {
        let (ledger, alice, bob) = funded_ledger(100).await;

        let err = ledger
            .transfer(&alice, &bob, Amount::from_grains(250))
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        // The message states the balance and the exact shortfall.
        assert!(msg.contains("0.00000100"));
        assert!(msg.contains("0.00000150"));

        assert_eq!(
            ledger.account_of(&alice).unwrap().unwrap().balance,
            Amount::from_grains(100)
        );
        assert!(ledger.account_of(&bob).unwrap().is_none());
    }

    #[tokio::test]
    async fn sender_without_account_rejected() {
        let (ledger, alice, bob) = funded_ledger(0).await;

        let err = ledger
            .transfer(&alice, &bob, Amount::from_grains(10))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NoAccount { .. }));
    }

    #[tokio::test]
    async fn self_transfer_is_checked_and_neutral() {
        let (ledger, alice, _) = funded_ledger(300).await;

        let outcome = ledger
            .transfer(&alice, &alice, Amount::from_grains(100))
            .await
            .unwrap();
        assert_eq!(outcome.sender_balance, Amount::from_grains(300));
        assert_eq!(outcome.recipient_balance, Amount::from_grains(300));

        // Still subject to the spend check.
        let err = ledger
            .transfer(&alice, &alice, Amount::from_grains(9999))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_debits_never_oversell() {
        let (ledger, alice, _) = funded_ledger(500).await;
        let ledger = Arc::new(ledger);

        // Ten concurrent 100-grain transfers against a 500-grain balance:
        // exactly five can succeed under any serialization.
        let tasks: Vec<_> = (0..10)
            .map(|i| {
                let ledger = Arc::clone(&ledger);
                let alice = alice.clone();
                let recipient = AccountId::from(100 + i as u64);
                tokio::spawn(async move {
                    ledger
                        .transfer(&alice, &recipient, Amount::from_grains(100))
                        .await
                })
            })
            .collect();

        let mut ok = 0;
        let mut insufficient = 0;
        for task in tasks {
            match task.await.expect("task") {
                Ok(_) => ok += 1,
                Err(LedgerError::InsufficientFunds { .. }) => insufficient += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(ok, 5);
        assert_eq!(insufficient, 5);
        assert_eq!(
            ledger.account_of(&alice).unwrap().unwrap().balance,
            Amount::ZERO
        );
        assert_eq!(ledger.store().total_grains().unwrap(), 500);
    }
}
