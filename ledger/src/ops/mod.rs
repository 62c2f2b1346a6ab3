//! # Ledger Operations
//!
//! The four user actions the chat dispatcher can invoke — verify,
//! transfer, withdraw, confirm — live here, one module each, all methods
//! on the [`Ledger`] facade. Plus the deposit credit used by the external
//! deposit watcher.
//!
//! Discipline shared by every operation:
//!
//! - Wallet daemon calls complete (or fail) *before* any account lock is
//!   taken. A slow daemon must never stall other accounts' operations.
//! - Validation happens again inside the transaction for anything that
//!   mutates — a check done outside the lock is advisory only.
//! - An operation returns either a typed outcome (whose `message()` is
//!   the single user-facing line) or a [`LedgerError`]; never a partial
//!   result.

pub mod transfer;
pub mod verify;
pub mod withdraw;

use std::sync::Arc;

use dashmap::DashMap;

use crate::amount::Amount;
use crate::daemon::WalletRpc;
use crate::error::{LedgerError, LedgerResult};
use crate::store::{Account, AccountId, AccountStore};

pub use transfer::TransferOutcome;
pub use verify::VerifyOutcome;
pub use withdraw::{PendingWithdrawal, WithdrawOutcome};

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// The account ledger: custodial balances, address verification, and the
/// withdrawal state machine, over a shared [`AccountStore`] and a wallet
/// daemon seam.
pub struct Ledger {
    store: Arc<AccountStore>,
    daemon: Arc<dyn WalletRpc>,
    /// At most one pending withdrawal per identity. Process-local and
    /// transient by design — confirmations are meant to be short-lived,
    /// and a restart simply asks the user to re-request.
    pending: DashMap<AccountId, PendingWithdrawal>,
}

impl Ledger {
    /// Wires the ledger to its storage and daemon collaborators.
    pub fn new(store: Arc<AccountStore>, daemon: Arc<dyn WalletRpc>) -> Self {
        Self {
            store,
            daemon,
            pending: DashMap::new(),
        }
    }

    /// The backing store, for read-only inspection (status endpoints).
    pub fn store(&self) -> &AccountStore {
        &self.store
    }

    /// Number of withdrawals currently awaiting confirmation.
    pub fn pending_withdrawal_count(&self) -> usize {
        self.pending.len()
    }

    /// Pure balance lookup. `None` if the identity has no record yet.
    pub fn account_of(&self, id: &AccountId) -> LedgerResult<Option<Account>> {
        Ok(self.store.get(id)?)
    }

    /// Credits a deposit to an identity, creating the record if absent.
    ///
    /// This is the external deposit path — invoked by the operator or the
    /// chain-watching sidecar, never by a chat command. Returns the new
    /// balance.
    pub async fn credit(&self, id: &AccountId, amount: Amount) -> LedgerResult<Amount> {
        if amount.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }
        if amount.exceeds_supply() {
            return Err(LedgerError::ExceedsSupply { requested: amount });
        }

        let new_balance = self
            .store
            .atomically(std::slice::from_ref(id), |txn| {
                txn.get_or_create(id)?.credit(amount)
            })
            .await?;

        tracing::info!(identity = %id, amount = %amount, balance = %new_balance, "deposit credited");
        Ok(new_balance)
    }

    pub(crate) fn store_arc(&self) -> &Arc<AccountStore> {
        &self.store
    }

    pub(crate) fn daemon(&self) -> &Arc<dyn WalletRpc> {
        &self.daemon
    }

    pub(crate) fn pending_map(&self) -> &DashMap<AccountId, PendingWithdrawal> {
        &self.pending
    }
}

// ---------------------------------------------------------------------------
// Shared Precondition Check
// ---------------------------------------------------------------------------

/// Decides whether `identity` can afford to spend `amount`, in the fixed
/// order both transfer and withdrawal present failures to users:
/// zero amount, supply ceiling, missing account, frozen account,
/// insufficient funds.
///
/// Read-only. Callers that go on to mutate must run this again inside
/// their transaction — the answer is stale the moment the lock is not
/// held.
pub(crate) fn check_spend(
    identity: &AccountId,
    account: Option<&Account>,
    amount: Amount,
) -> LedgerResult<()> {
    if amount.is_zero() {
        return Err(LedgerError::ZeroAmount);
    }
    if amount.exceeds_supply() {
        return Err(LedgerError::ExceedsSupply { requested: amount });
    }
    let account = account.ok_or_else(|| LedgerError::NoAccount {
        identity: identity.clone(),
    })?;
    if account.frozen {
        return Err(LedgerError::AccountFrozen {
            identity: identity.clone(),
        });
    }
    if amount > account.balance {
        return Err(LedgerError::InsufficientFunds {
            available: account.balance,
            requested: amount,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Test Support
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::testing::NullDaemon;
    use super::*;
    use crate::config::MAX_SUPPLY;

    fn account_with(balance: u64) -> Account {
        let mut acct = Account::new(AccountId::from(1u64));
        acct.credit(Amount::from_grains(balance)).unwrap();
        acct
    }

    #[test]
    fn check_order_zero_amount_first() {
        // Zero wins even when every later check would also fail.
        let err = check_spend(&AccountId::from(1u64), None, Amount::ZERO).unwrap_err();
        assert!(matches!(err, LedgerError::ZeroAmount));
    }

    #[test]
    fn check_order_supply_before_account() {
        let err = check_spend(
            &AccountId::from(1u64),
            None,
            Amount::from_grains(MAX_SUPPLY + 1),
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::ExceedsSupply { .. }));
    }

    #[test]
    fn check_missing_account() {
        let err =
            check_spend(&AccountId::from(1u64), None, Amount::from_grains(1)).unwrap_err();
        assert!(matches!(err, LedgerError::NoAccount { .. }));
    }

    #[test]
    fn check_frozen_trumps_balance() {
        let mut acct = account_with(10);
        acct.frozen = true;
        // Amount exceeds the balance too, but the freeze is reported.
        let err = check_spend(&acct.id, Some(&acct), Amount::from_grains(100)).unwrap_err();
        assert!(matches!(err, LedgerError::AccountFrozen { .. }));
    }

    #[test]
    fn check_insufficient_funds() {
        let acct = account_with(100);
        let err = check_spend(&acct.id, Some(&acct), Amount::from_grains(250)).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientFunds { available, requested }
                if available == Amount::from_grains(100) && requested == Amount::from_grains(250)
        ));
    }

    #[test]
    fn check_exact_balance_passes() {
        let acct = account_with(100);
        check_spend(&acct.id, Some(&acct), Amount::from_grains(100)).unwrap();
    }

    #[tokio::test]
    async fn credit_creates_and_accumulates() {
        let store = Arc::new(AccountStore::open_temporary().unwrap());
        let ledger = Ledger::new(store, Arc::new(NullDaemon));
        let alice = AccountId::from(1u64);

        let balance = ledger.credit(&alice, Amount::from_grains(300)).await.unwrap();
        assert_eq!(balance, Amount::from_grains(300));

        let balance = ledger.credit(&alice, Amount::from_grains(200)).await.unwrap();
        assert_eq!(balance, Amount::from_grains(500));
    }

    #[tokio::test]
    async fn credit_rejects_zero_and_supply_breach() {
        let store = Arc::new(AccountStore::open_temporary().unwrap());
        let ledger = Ledger::new(store, Arc::new(NullDaemon));
        let alice = AccountId::from(1u64);

        assert!(matches!(
            ledger.credit(&alice, Amount::ZERO).await,
            Err(LedgerError::ZeroAmount)
        ));
        assert!(matches!(
            ledger
                .credit(&alice, Amount::from_grains(MAX_SUPPLY + 1))
                .await,
            Err(LedgerError::ExceedsSupply { .. })
        ));
        // Nothing was created along the way.
        assert!(ledger.account_of(&alice).unwrap().is_none());
    }
}
