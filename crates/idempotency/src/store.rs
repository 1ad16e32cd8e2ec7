//! Idempotency record storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::record::IdempotencyRecord;

/// Record store abstraction.
pub trait IdempotencyStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>, IdempotencyStoreError>;

    /// Insert a new record; fails if the key already exists.
    fn insert(&self, record: IdempotencyRecord) -> Result<(), IdempotencyStoreError>;

    /// Replace an existing record.
    fn update(&self, record: &IdempotencyRecord) -> Result<(), IdempotencyStoreError>;

    /// Delete records whose `expires_at` is at or before `now`; returns
    /// how many were removed.
    fn delete_expired_before(&self, now: DateTime<Utc>) -> Result<usize, IdempotencyStoreError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum IdempotencyStoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("record already exists: {0}")]
    AlreadyExists(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// In-memory record store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryIdempotencyStore {
    records: RwLock<HashMap<String, IdempotencyRecord>>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl IdempotencyStore for InMemoryIdempotencyStore {
    fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>, IdempotencyStoreError> {
        let records = self.records.read().unwrap();
        Ok(records.get(key).cloned())
    }

    fn insert(&self, record: IdempotencyRecord) -> Result<(), IdempotencyStoreError> {
        let mut records = self.records.write().unwrap();
        if records.contains_key(&record.key) {
            return Err(IdempotencyStoreError::AlreadyExists(record.key));
        }
        records.insert(record.key.clone(), record);
        Ok(())
    }

    fn update(&self, record: &IdempotencyRecord) -> Result<(), IdempotencyStoreError> {
        let mut records = self.records.write().unwrap();
        if !records.contains_key(&record.key) {
            return Err(IdempotencyStoreError::NotFound(record.key.clone()));
        }
        records.insert(record.key.clone(), record.clone());
        Ok(())
    }

    fn delete_expired_before(&self, now: DateTime<Utc>) -> Result<usize, IdempotencyStoreError> {
        let mut records = self.records.write().unwrap();
        let before = records.len();
        records.retain(|_, r| !r.is_expired_at(now));
        Ok(before - records.len())
    }
}

impl<S> IdempotencyStore for Arc<S>
where
    S: IdempotencyStore + ?Sized,
{
    fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>, IdempotencyStoreError> {
        (**self).get(key)
    }

    fn insert(&self, record: IdempotencyRecord) -> Result<(), IdempotencyStoreError> {
        (**self).insert(record)
    }

    fn update(&self, record: &IdempotencyRecord) -> Result<(), IdempotencyStoreError> {
        (**self).update(record)
    }

    fn delete_expired_before(&self, now: DateTime<Utc>) -> Result<usize, IdempotencyStoreError> {
        (**self).delete_expired_before(now)
    }
}
