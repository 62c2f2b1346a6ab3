//! # Account Store — Transactional Persistence
//!
//! Keyed record storage for per-user ledger state, built on sled's
//! embedded key-value store. One tree, `accounts`, maps the identity
//! string to a bincode-encoded [`Account`].
//!
//! ## Atomicity
//!
//! [`AccountStore::atomically`] is the sole mutation path. It takes the
//! set of account ids an operation will touch, acquires a per-account
//! async mutex for each — in sorted id order, so overlapping operations
//! serialize without deadlock and disjoint ones don't block each other —
//! loads the named records into a [`Txn`] view, and runs the caller's
//! closure against that view. Only if the closure returns `Ok` are the
//! touched records written back, in a single sled `Batch` followed by a
//! flush. An `Err` aborts with no partial effect.
//!
//! The closure is synchronous on purpose: there is no way to await the
//! wallet daemon (or anything else) while holding an account lock, which
//! bounds lock hold time to pure computation plus one batch write.
//!
//! ## Serializability
//!
//! Two concurrent operations debiting the same account both pass through
//! that account's mutex, so the second always observes the first's
//! committed balance — the classic check-then-act race cannot happen.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use sled::Batch;
use thiserror::Error;
use tokio::sync::Mutex;

use super::account::{Account, AccountId};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("codec error: {0}")]
    Codec(String),

    /// A transaction closure touched an account it never declared.
    /// Always a programming error in the operations layer.
    #[error("account {identity} accessed outside the transaction's declared set")]
    UndeclaredAccount {
        /// The undeclared identity.
        identity: AccountId,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Txn
// ---------------------------------------------------------------------------

/// The view of declared accounts a transaction closure operates on.
///
/// Reads and mutations go through this view; nothing reaches disk until
/// the closure returns `Ok` and the store commits every dirty record in
/// one batch.
pub struct Txn {
    declared: BTreeSet<AccountId>,
    records: HashMap<AccountId, Account>,
    dirty: BTreeSet<AccountId>,
}

impl Txn {
    fn ensure_declared(&self, id: &AccountId) -> StoreResult<()> {
        if self.declared.contains(id) {
            Ok(())
        } else {
            Err(StoreError::UndeclaredAccount {
                identity: id.clone(),
            })
        }
    }

    /// Pure lookup of a declared account. No side effect.
    pub fn get(&self, id: &AccountId) -> StoreResult<Option<&Account>> {
        self.ensure_declared(id)?;
        Ok(self.records.get(id))
    }

    /// Mutable access to a declared account that already exists.
    /// Marks the record dirty — it will be written on commit.
    pub fn get_mut(&mut self, id: &AccountId) -> StoreResult<Option<&mut Account>> {
        self.ensure_declared(id)?;
        if self.records.contains_key(id) {
            self.dirty.insert(id.clone());
        }
        Ok(self.records.get_mut(id))
    }

    /// Returns the declared account, creating a fresh zero-balance record
    /// if none exists. Marks it dirty either way.
    pub fn get_or_create(&mut self, id: &AccountId) -> StoreResult<&mut Account> {
        self.ensure_declared(id)?;
        self.dirty.insert(id.clone());
        Ok(self
            .records
            .entry(id.clone())
            .or_insert_with(|| Account::new(id.clone())))
    }
}

// ---------------------------------------------------------------------------
// AccountStore
// ---------------------------------------------------------------------------

/// Persistent, transactional storage for [`Account`] records.
///
/// Cheap to share via `Arc` — sled handles are internally reference
/// counted, and the per-account lock table is a concurrent map.
#[derive(Debug)]
pub struct AccountStore {
    /// The underlying sled database handle.
    db: sled::Db,
    /// Account records keyed by identity string.
    accounts: sled::Tree,
    /// Per-account mutexes backing `atomically`. Entries are created on
    /// first use and live for the process lifetime.
    locks: DashMap<AccountId, Arc<Mutex<()>>>,
}

impl AccountStore {
    /// Opens or creates a store at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// Creates a store that lives in memory and vanishes on drop.
    /// Ideal for tests — no filesystem side effects, no cleanup.
    pub fn open_temporary() -> StoreResult<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: sled::Db) -> StoreResult<Self> {
        let accounts = db.open_tree("accounts")?;
        Ok(Self {
            db,
            accounts,
            locks: DashMap::new(),
        })
    }

    /// Pure lookup. Reflects the latest committed state; never blocks on
    /// in-flight transactions beyond sled's own lock-free reads.
    pub fn get(&self, id: &AccountId) -> StoreResult<Option<Account>> {
        match self.accounts.get(id.as_str().as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Returns the existing record, or atomically creates a zero-balance
    /// one with no verified address.
    pub async fn create_or_get(&self, id: &AccountId) -> StoreResult<Account> {
        self.atomically(std::slice::from_ref(id), |txn| {
            txn.get_or_create(id).map(|acct| acct.clone())
        })
        .await
    }

    /// Runs `f` with exclusive access to the accounts named in `ids` and
    /// commits its mutations together, or not at all.
    ///
    /// Locks are taken in sorted id order and held only for the duration
    /// of the (synchronous) closure plus the commit. Concurrent callers
    /// over disjoint id sets proceed in parallel; overlapping sets
    /// serialize.
    ///
    /// # Errors
    ///
    /// Whatever `f` returns, unchanged — plus any [`StoreError`] from the
    /// load or commit phases, converted via `E: From<StoreError>`. On any
    /// error, no record is written.
    pub async fn atomically<T, E, F>(&self, ids: &[AccountId], f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Txn) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut sorted: Vec<AccountId> = ids.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for id in &sorted {
            let lock = {
                let entry = self.locks.entry(id.clone()).or_default();
                Arc::clone(entry.value())
            };
            guards.push(lock.lock_owned().await);
        }

        let mut txn = Txn {
            declared: sorted.iter().cloned().collect(),
            records: HashMap::new(),
            dirty: BTreeSet::new(),
        };
        for id in &sorted {
            if let Some(acct) = self.get(id).map_err(E::from)? {
                txn.records.insert(id.clone(), acct);
            }
        }

        let out = f(&mut txn)?;

        if !txn.dirty.is_empty() {
            let now = Utc::now();
            let mut batch = Batch::default();
            for id in &txn.dirty {
                let acct = txn
                    .records
                    .get_mut(id)
                    .expect("dirty records are always present");
                acct.updated_at = now;
                batch.insert(
                    id.as_str().as_bytes(),
                    bincode::serialize(acct)
                        .map_err(|e| E::from(StoreError::Codec(e.to_string())))?,
                );
            }
            self.accounts
                .apply_batch(batch)
                .map_err(|e| E::from(StoreError::Sled(e)))?;
            self.db
                .flush()
                .map_err(|e| E::from(StoreError::Sled(e)))?;
        }

        drop(guards);
        Ok(out)
    }

    /// Number of account records in the store.
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// Sum of every account's spendable and withheld grains — the total
    /// coin currently in custody. Internal transfers never change this.
    pub fn total_grains(&self) -> StoreResult<u64> {
        let mut total = 0u64;
        for kv in self.accounts.iter() {
            let (_, bytes) = kv?;
            let acct: Account = decode(&bytes)?;
            total = total
                .saturating_add(acct.balance.grains())
                .saturating_add(acct.withheld.grains());
        }
        Ok(total)
    }
}

fn decode(bytes: &[u8]) -> StoreResult<Account> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Codec(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;

    fn id(n: u64) -> AccountId {
        AccountId::from(n)
    }

    #[tokio::test]
    async fn open_temporary_is_empty() {
        let store = AccountStore::open_temporary().expect("temp store");
        assert_eq!(store.account_count(), 0);
        assert!(store.get(&id(1)).unwrap().is_none());
    }

    #[tokio::test]
    async fn create_or_get_is_lazy_and_idempotent() {
        let store = AccountStore::open_temporary().unwrap();

        let created = store.create_or_get(&id(1)).await.unwrap();
        assert_eq!(created.balance, Amount::ZERO);
        assert!(!created.is_verified());
        assert_eq!(store.account_count(), 1);

        let again = store.create_or_get(&id(1)).await.unwrap();
        assert_eq!(again.created_at, created.created_at);
        assert_eq!(store.account_count(), 1);
    }

    #[tokio::test]
    async fn atomically_commits_on_ok() {
        let store = AccountStore::open_temporary().unwrap();
        let alice = id(1);

        store
            .atomically::<_, StoreError, _>(std::slice::from_ref(&alice), |txn| {
                let acct = txn.get_or_create(&alice)?;
                acct.balance = Amount::from_grains(500);
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(
            store.get(&alice).unwrap().unwrap().balance,
            Amount::from_grains(500)
        );
    }

    #[tokio::test]
    async fn atomically_aborts_without_partial_effect() {
        let store = AccountStore::open_temporary().unwrap();
        let alice = id(1);
        let bob = id(2);

        store
            .atomically::<_, StoreError, _>(&[alice.clone()], |txn| {
                txn.get_or_create(&alice)?.balance = Amount::from_grains(100);
                Ok(())
            })
            .await
            .unwrap();

        // Mutate alice, create bob, then fail: neither write may land.
        let result: Result<(), StoreError> = store
            .atomically(&[alice.clone(), bob.clone()], |txn| {
                txn.get_mut(&alice)?.expect("alice exists").balance = Amount::from_grains(999);
                txn.get_or_create(&bob)?.balance = Amount::from_grains(1);
                Err(StoreError::Codec("injected".to_string()))
            })
            .await;
        assert!(result.is_err());

        assert_eq!(
            store.get(&alice).unwrap().unwrap().balance,
            Amount::from_grains(100)
        );
        assert!(store.get(&bob).unwrap().is_none());
    }

    #[tokio::test]
    async fn undeclared_access_is_rejected() {
        let store = AccountStore::open_temporary().unwrap();
        let alice = id(1);
        let eve = id(66);

        let result: Result<(), StoreError> = store
            .atomically(std::slice::from_ref(&alice), |txn| {
                txn.get_or_create(&eve)?;
                Ok(())
            })
            .await;

        assert!(matches!(
            result,
            Err(StoreError::UndeclaredAccount { identity }) if identity == eve
        ));
        assert!(store.get(&eve).unwrap().is_none());
    }

    #[tokio::test]
    async fn reads_do_not_mark_dirty() {
        let store = AccountStore::open_temporary().unwrap();
        let alice = id(1);
        store.create_or_get(&alice).await.unwrap();
        let before = store.get(&alice).unwrap().unwrap();

        store
            .atomically::<_, StoreError, _>(std::slice::from_ref(&alice), |txn| {
                let _ = txn.get(&alice)?;
                Ok(())
            })
            .await
            .unwrap();

        let after = store.get(&alice).unwrap().unwrap();
        assert_eq!(after.updated_at, before.updated_at);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn overlapping_transactions_serialize() {
        let store = Arc::new(AccountStore::open_temporary().unwrap());
        let alice = id(1);
        store.create_or_get(&alice).await.unwrap();

        // 32 concurrent increments of the same account. With per-account
        // serialization, none may observe a stale balance.
        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let store = Arc::clone(&store);
                let alice = alice.clone();
                tokio::spawn(async move {
                    store
                        .atomically::<_, StoreError, _>(std::slice::from_ref(&alice), |txn| {
                            let acct = txn.get_mut(&alice)?.expect("seeded");
                            acct.balance = Amount::from_grains(acct.balance.grains() + 1);
                            Ok(())
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            task.await.expect("task").expect("txn");
        }

        assert_eq!(
            store.get(&alice).unwrap().unwrap().balance,
            Amount::from_grains(32)
        );
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");

        {
            let store = AccountStore::open(dir.path()).unwrap();
            store
                .atomically::<_, StoreError, _>(&[id(7)], |txn| {
                    let acct = txn.get_or_create(&id(7))?;
                    acct.balance = Amount::from_grains(4242);
                    acct.verified_address = Some("addr7".to_string());
                    Ok(())
                })
                .await
                .unwrap();
        }

        let store = AccountStore::open(dir.path()).unwrap();
        let acct = store.get(&id(7)).unwrap().expect("persisted");
        assert_eq!(acct.balance, Amount::from_grains(4242));
        assert_eq!(acct.verified_address.as_deref(), Some("addr7"));
    }

    #[tokio::test]
    async fn total_grains_includes_holds() {
        let store = AccountStore::open_temporary().unwrap();

        store
            .atomically::<_, StoreError, _>(&[id(1), id(2)], |txn| {
                txn.get_or_create(&id(1))?.balance = Amount::from_grains(300);
                let b = txn.get_or_create(&id(2))?;
                b.balance = Amount::from_grains(100);
                b.withheld = Amount::from_grains(50);
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(store.total_grains().unwrap(), 450);
    }
}
