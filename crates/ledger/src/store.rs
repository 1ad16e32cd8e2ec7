//! Ledger storage implementations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use corebank_core::{AccountId, TransactionId};

use crate::account::Account;
use crate::entry::LedgerEntry;

/// Ledger store abstraction.
///
/// Entries are append-only: there is deliberately no way to update or
/// delete one. The account projection is the only mutable row, guarded by
/// an expected-version check.
pub trait LedgerStore: Send + Sync {
    /// Register a new account projection row.
    fn insert_account(&self, account: Account) -> Result<(), LedgerStoreError>;

    /// Fetch an account by id.
    fn account(&self, account_id: AccountId) -> Result<Option<Account>, LedgerStoreError>;

    /// Write the account projection. Fails with `VersionConflict` when the
    /// stored version differs from `expected_version` (concurrent writer).
    fn update_account(
        &self,
        account: &Account,
        expected_version: u64,
    ) -> Result<(), LedgerStoreError>;

    /// Append an immutable entry.
    fn append_entry(&self, entry: LedgerEntry) -> Result<(), LedgerStoreError>;

    /// All entries for an account, oldest first.
    fn entries_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<LedgerEntry>, LedgerStoreError>;

    /// Entries for an account created at or before `cutoff`, oldest first.
    fn entries_for_account_until(
        &self,
        account_id: AccountId,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>, LedgerStoreError>;

    /// All entries that share a transaction id, oldest first.
    fn entries_for_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<LedgerEntry>, LedgerStoreError>;
}

/// Ledger store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerStoreError {
    #[error("account not found: {0}")]
    AccountNotFound(AccountId),
    #[error("account already exists: {0}")]
    AccountAlreadyExists(AccountId),
    #[error("version conflict on account {account_id}: expected {expected}, actual {actual}")]
    VersionConflict {
        account_id: AccountId,
        expected: u64,
        actual: u64,
    },
    #[error("storage error: {0}")]
    Storage(String),
}

/// In-memory ledger store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    accounts: RwLock<HashMap<AccountId, Account>>,
    entries: RwLock<Vec<LedgerEntry>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn insert_account(&self, account: Account) -> Result<(), LedgerStoreError> {
        let mut accounts = self.accounts.write().unwrap();
        if accounts.contains_key(&account.id) {
            return Err(LedgerStoreError::AccountAlreadyExists(account.id));
        }
        accounts.insert(account.id, account);
        Ok(())
    }

    fn account(&self, account_id: AccountId) -> Result<Option<Account>, LedgerStoreError> {
        let accounts = self.accounts.read().unwrap();
        Ok(accounts.get(&account_id).cloned())
    }

    fn update_account(
        &self,
        account: &Account,
        expected_version: u64,
    ) -> Result<(), LedgerStoreError> {
        let mut accounts = self.accounts.write().unwrap();
        let stored = accounts
            .get_mut(&account.id)
            .ok_or(LedgerStoreError::AccountNotFound(account.id))?;

        if stored.version != expected_version {
            return Err(LedgerStoreError::VersionConflict {
                account_id: account.id,
                expected: expected_version,
                actual: stored.version,
            });
        }

        let mut next = account.clone();
        next.version = expected_version + 1;
        *stored = next;
        Ok(())
    }

    fn append_entry(&self, entry: LedgerEntry) -> Result<(), LedgerStoreError> {
        let mut entries = self.entries.write().unwrap();
        entries.push(entry);
        Ok(())
    }

    fn entries_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<LedgerEntry>, LedgerStoreError> {
        let entries = self.entries.read().unwrap();
        Ok(entries
            .iter()
            .filter(|e| e.account_id == account_id)
            .cloned()
            .collect())
    }

    fn entries_for_account_until(
        &self,
        account_id: AccountId,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>, LedgerStoreError> {
        let entries = self.entries.read().unwrap();
        Ok(entries
            .iter()
            .filter(|e| e.account_id == account_id && e.created_at <= cutoff)
            .cloned()
            .collect())
    }

    fn entries_for_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<LedgerEntry>, LedgerStoreError> {
        let entries = self.entries.read().unwrap();
        Ok(entries
            .iter()
            .filter(|e| e.transaction_id == transaction_id)
            .cloned()
            .collect())
    }
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn insert_account(&self, account: Account) -> Result<(), LedgerStoreError> {
        (**self).insert_account(account)
    }

    fn account(&self, account_id: AccountId) -> Result<Option<Account>, LedgerStoreError> {
        (**self).account(account_id)
    }

    fn update_account(
        &self,
        account: &Account,
        expected_version: u64,
    ) -> Result<(), LedgerStoreError> {
        (**self).update_account(account, expected_version)
    }

    fn append_entry(&self, entry: LedgerEntry) -> Result<(), LedgerStoreError> {
        (**self).append_entry(entry)
    }

    fn entries_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<LedgerEntry>, LedgerStoreError> {
        (**self).entries_for_account(account_id)
    }

    fn entries_for_account_until(
        &self,
        account_id: AccountId,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>, LedgerStoreError> {
        (**self).entries_for_account_until(account_id, cutoff)
    }

    fn entries_for_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<LedgerEntry>, LedgerStoreError> {
        (**self).entries_for_transaction(transaction_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corebank_core::{Currency, Money, UserId};

    fn test_account() -> Account {
        Account::open(UserId::new(), Currency::Usd, Money::ZERO)
    }

    #[test]
    fn insert_is_unique() {
        let store = InMemoryLedgerStore::new();
        let account = test_account();

        store.insert_account(account.clone()).unwrap();
        assert!(matches!(
            store.insert_account(account),
            Err(LedgerStoreError::AccountAlreadyExists(_))
        ));
    }

    #[test]
    fn stale_projection_write_is_rejected() {
        let store = InMemoryLedgerStore::new();
        let account = test_account();
        store.insert_account(account.clone()).unwrap();

        store.update_account(&account, 0).unwrap();

        // Second writer still expects version 0.
        assert!(matches!(
            store.update_account(&account, 0),
            Err(LedgerStoreError::VersionConflict { .. })
        ));
    }

    #[test]
    fn version_advances_on_update() {
        let store = InMemoryLedgerStore::new();
        let account = test_account();
        store.insert_account(account.clone()).unwrap();

        store.update_account(&account, 0).unwrap();
        let stored = store.account(account.id).unwrap().unwrap();
        assert_eq!(stored.version, 1);
    }
}
