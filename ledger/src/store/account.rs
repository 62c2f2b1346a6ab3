//! # Account Records
//!
//! One [`Account`] per chat identity. The identity is the stable anchor —
//! accounts are created lazily (first successful address verification, or
//! first time the identity receives a tip) and never deleted.
//!
//! Balance mutations only happen inside an [`AccountStore`] transaction
//! (see [`super::db`]); the checked `credit`/`debit`/hold methods here are
//! the only arithmetic the operations layer is allowed to use.
//!
//! [`AccountStore`]: super::db::AccountStore

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::error::LedgerError;

// ---------------------------------------------------------------------------
// AccountId
// ---------------------------------------------------------------------------

/// Opaque stable identity of a chat user.
///
/// Supplied by the chat platform (typically a numeric user id rendered as
/// a string). Also the exact message a user signs with their wallet key
/// when binding an address — see [`AccountId::signing_message`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Wraps an identity string.
    pub fn new(id: impl Into<String>) -> Self {
        AccountId(id.into())
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The canonical string form a wallet signature must cover to prove
    /// ownership of an address for this identity.
    ///
    /// This is simply the identity itself. Changing this breaks every
    /// signature users have already produced, so don't.
    pub fn signing_message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        AccountId(s.to_string())
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        AccountId(s)
    }
}

impl From<u64> for AccountId {
    fn from(n: u64) -> Self {
        AccountId(n.to_string())
    }
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// The ledger state of a single chat identity.
///
/// Persisted in the `accounts` tree as a bincode blob keyed by the
/// identity string. Every field is custody-critical: `balance` is funds
/// the user can spend, `withheld` is funds staged for an in-flight payout,
/// and their sum is what the community actually owes the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Owning chat identity.
    pub id: AccountId,

    /// The wallet address this identity has proven ownership of, if any.
    /// Set only by a successful verification; rebinding is always allowed.
    pub verified_address: Option<String>,

    /// The signature that proved ownership of `verified_address`.
    /// Kept for audit; never re-validated on use.
    pub verified_signature: Option<String>,

    /// Spendable balance in grains.
    pub balance: Amount,

    /// Grains staged for an in-flight withdrawal payout. Moved out of
    /// `balance` before the payout RPC is issued and either settled
    /// (payout confirmed) or released back (payout definitively failed).
    pub withheld: Amount,

    /// If `true`, all spends are rejected until an operator reconciles
    /// the account. Set when a payout outcome is ambiguous.
    pub frozen: bool,

    /// When this record was first created.
    pub created_at: DateTime<Utc>,

    /// Timestamp of the last committed mutation.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Creates a fresh zero-balance, unverified account.
    pub fn new(id: AccountId) -> Self {
        let now = Utc::now();
        Self {
            id,
            verified_address: None,
            verified_signature: None,
            balance: Amount::ZERO,
            withheld: Amount::ZERO,
            frozen: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns `true` once an address has been bound via verification.
    pub fn is_verified(&self) -> bool {
        self.verified_address.is_some()
    }

    /// Adds funds to the spendable balance.
    ///
    /// # Errors
    ///
    /// [`LedgerError::ExceedsSupply`] if the resulting balance would pass
    /// the supply ceiling — which would mean more coin in custody than can
    /// exist.
    pub fn credit(&mut self, amount: Amount) -> Result<Amount, LedgerError> {
        let new_balance = self
            .balance
            .checked_add(amount)
            .filter(|b| !b.exceeds_supply())
            .ok_or(LedgerError::ExceedsSupply { requested: amount })?;
        self.balance = new_balance;
        Ok(new_balance)
    }

    /// Removes funds from the spendable balance.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InsufficientFunds`] carrying the current balance and
    /// the requested amount if the account cannot cover the debit.
    pub fn debit(&mut self, amount: Amount) -> Result<Amount, LedgerError> {
        let new_balance =
            self.balance
                .checked_sub(amount)
                .ok_or(LedgerError::InsufficientFunds {
                    available: self.balance,
                    requested: amount,
                })?;
        self.balance = new_balance;
        Ok(new_balance)
    }

    /// Stages `amount` for a payout: debits the spendable balance and
    /// parks the grains in `withheld`. Reversible until settled.
    pub fn hold(&mut self, amount: Amount) -> Result<(), LedgerError> {
        self.debit(amount)?;
        // balance and withheld are each <= MAX_SUPPLY, so the sum fits.
        self.withheld = self
            .withheld
            .checked_add(amount)
            .ok_or(LedgerError::ExceedsSupply { requested: amount })?;
        Ok(())
    }

    /// Finalizes a hold after a confirmed payout: the grains leave custody.
    /// Returns `None` if no matching hold exists — the caller treats that
    /// as an internal inconsistency.
    #[must_use]
    pub fn settle_hold(&mut self, amount: Amount) -> Option<()> {
        self.withheld = self.withheld.checked_sub(amount)?;
        Some(())
    }

    /// Reverses a hold after a definitively failed payout: the grains
    /// return to the spendable balance. Returns `None` if no matching
    /// hold exists.
    #[must_use]
    pub fn release_hold(&mut self, amount: Amount) -> Option<()> {
        self.withheld = self.withheld.checked_sub(amount)?;
        self.balance = self.balance.checked_add(amount)?;
        Some(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_SUPPLY;

    #[test]
    fn new_account_is_empty_and_unverified() {
        let acct = Account::new(AccountId::from(42u64));
        assert_eq!(acct.balance, Amount::ZERO);
        assert_eq!(acct.withheld, Amount::ZERO);
        assert!(!acct.is_verified());
        assert!(!acct.frozen);
    }

    #[test]
    fn signing_message_is_the_identity() {
        let id = AccountId::from(123456789u64);
        assert_eq!(id.signing_message(), "123456789");
        assert_eq!(id.to_string(), "123456789");
    }

    #[test]
    fn credit_and_debit() {
        let mut acct = Account::new(AccountId::from("a"));
        acct.credit(Amount::from_grains(1000)).unwrap();
        assert_eq!(acct.balance, Amount::from_grains(1000));

        let remaining = acct.debit(Amount::from_grains(400)).unwrap();
        assert_eq!(remaining, Amount::from_grains(600));
    }

    #[test]
    fn debit_beyond_balance_reports_both_sides() {
        let mut acct = Account::new(AccountId::from("a"));
        acct.credit(Amount::from_grains(100)).unwrap();

        let err = acct.debit(Amount::from_grains(250)).unwrap_err();
        match err {
            LedgerError::InsufficientFunds {
                available,
                requested,
            } => {
                assert_eq!(available, Amount::from_grains(100));
                assert_eq!(requested, Amount::from_grains(250));
            }
            other => panic!("unexpected error: {other}"),
        }
        // Failed debit must not touch the balance.
        assert_eq!(acct.balance, Amount::from_grains(100));
    }

    #[test]
    fn credit_past_supply_ceiling_rejected() {
        let mut acct = Account::new(AccountId::from("a"));
        acct.credit(Amount::from_grains(MAX_SUPPLY)).unwrap();
        let err = acct.credit(Amount::from_grains(1)).unwrap_err();
        assert!(matches!(err, LedgerError::ExceedsSupply { .. }));
        assert_eq!(acct.balance, Amount::from_grains(MAX_SUPPLY));
    }

    #[test]
    fn hold_settle_lifecycle() {
        let mut acct = Account::new(AccountId::from("a"));
        acct.credit(Amount::from_grains(500)).unwrap();

        acct.hold(Amount::from_grains(200)).unwrap();
        assert_eq!(acct.balance, Amount::from_grains(300));
        assert_eq!(acct.withheld, Amount::from_grains(200));

        acct.settle_hold(Amount::from_grains(200)).unwrap();
        assert_eq!(acct.balance, Amount::from_grains(300));
        assert_eq!(acct.withheld, Amount::ZERO);
    }

    #[test]
    fn hold_release_restores_balance() {
        let mut acct = Account::new(AccountId::from("a"));
        acct.credit(Amount::from_grains(500)).unwrap();

        acct.hold(Amount::from_grains(200)).unwrap();
        acct.release_hold(Amount::from_grains(200)).unwrap();
        assert_eq!(acct.balance, Amount::from_grains(500));
        assert_eq!(acct.withheld, Amount::ZERO);
    }

    #[test]
    fn settle_without_hold_is_detected() {
        let mut acct = Account::new(AccountId::from("a"));
        assert!(acct.settle_hold(Amount::from_grains(1)).is_none());
        assert!(acct.release_hold(Amount::from_grains(1)).is_none());
    }

    #[test]
    fn bincode_roundtrip() {
        let mut acct = Account::new(AccountId::from(7u64));
        acct.credit(Amount::from_grains(123)).unwrap();
        acct.verified_address = Some("addr".to_string());
        acct.verified_signature = Some("sig".to_string());

        let bytes = bincode::serialize(&acct).expect("serialize");
        let back: Account = bincode::deserialize(&bytes).expect("deserialize");
        assert_eq!(back, acct);
    }
}
