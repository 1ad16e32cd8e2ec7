//! Transaction storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use corebank_core::{TransactionId, UserId};

use crate::transaction::{Transaction, TransactionStatus};

pub trait TransactionStore: Send + Sync {
    fn insert(&self, transaction: Transaction) -> Result<(), TransactionStoreError>;

    fn get(&self, id: TransactionId) -> Result<Option<Transaction>, TransactionStoreError>;

    fn update(&self, transaction: &Transaction) -> Result<(), TransactionStoreError>;

    /// The transaction submitted under `key`, if any attempt got as far as
    /// inserting one.
    fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<Transaction>, TransactionStoreError>;

    /// Completed transactions by `user_id` since `cutoff`, newest first.
    /// Feeds the fraud engine's rate heuristics.
    fn completed_for_user_since(
        &self,
        user_id: UserId,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, TransactionStoreError>;

    /// PROCESSING transactions whose last progress is older than `cutoff`.
    fn stalled_processing(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, TransactionStoreError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransactionStoreError {
    #[error("transaction {0} already exists")]
    AlreadyExists(TransactionId),
    #[error("transaction {0} not found")]
    NotFound(TransactionId),
    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Default)]
pub struct InMemoryTransactionStore {
    transactions: RwLock<HashMap<TransactionId, Transaction>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl TransactionStore for InMemoryTransactionStore {
    fn insert(&self, transaction: Transaction) -> Result<(), TransactionStoreError> {
        let mut transactions = self.transactions.write().unwrap();
        if transactions.contains_key(&transaction.id) {
            return Err(TransactionStoreError::AlreadyExists(transaction.id));
        }
        transactions.insert(transaction.id, transaction);
        Ok(())
    }

    fn get(&self, id: TransactionId) -> Result<Option<Transaction>, TransactionStoreError> {
        let transactions = self.transactions.read().unwrap();
        Ok(transactions.get(&id).cloned())
    }

    fn update(&self, transaction: &Transaction) -> Result<(), TransactionStoreError> {
        let mut transactions = self.transactions.write().unwrap();
        if !transactions.contains_key(&transaction.id) {
            return Err(TransactionStoreError::NotFound(transaction.id));
        }
        transactions.insert(transaction.id, transaction.clone());
        Ok(())
    }

    fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<Transaction>, TransactionStoreError> {
        let transactions = self.transactions.read().unwrap();
        Ok(transactions
            .values()
            .find(|t| t.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    fn completed_for_user_since(
        &self,
        user_id: UserId,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, TransactionStoreError> {
        let transactions = self.transactions.read().unwrap();
        let mut matched: Vec<_> = transactions
            .values()
            .filter(|t| {
                t.initiated_by == user_id
                    && t.status == TransactionStatus::Completed
                    && t.created_at >= cutoff
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matched)
    }

    fn stalled_processing(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, TransactionStoreError> {
        let transactions = self.transactions.read().unwrap();
        Ok(transactions
            .values()
            .filter(|t| {
                t.status == TransactionStatus::Processing && t.last_progress_at() < cutoff
            })
            .cloned()
            .collect())
    }
}

impl<S> TransactionStore for Arc<S>
where
    S: TransactionStore + ?Sized,
{
    fn insert(&self, transaction: Transaction) -> Result<(), TransactionStoreError> {
        (**self).insert(transaction)
    }

    fn get(&self, id: TransactionId) -> Result<Option<Transaction>, TransactionStoreError> {
        (**self).get(id)
    }

    fn update(&self, transaction: &Transaction) -> Result<(), TransactionStoreError> {
        (**self).update(transaction)
    }

    fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<Transaction>, TransactionStoreError> {
        (**self).find_by_idempotency_key(key)
    }

    fn completed_for_user_since(
        &self,
        user_id: UserId,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, TransactionStoreError> {
        (**self).completed_for_user_since(user_id, cutoff)
    }

    fn stalled_processing(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, TransactionStoreError> {
        (**self).stalled_processing(cutoff)
    }
}
