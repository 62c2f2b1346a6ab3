//! Keyed, transactional storage for per-user ledger state.
//!
//! [`account`] defines the records; [`db`] provides the sled-backed store
//! whose `atomically` primitive is the only way balances change.

pub mod account;
pub mod db;

pub use account::{Account, AccountId};
pub use db::{AccountStore, StoreError, StoreResult, Txn};
