//! Hold storage implementations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use corebank_core::{AccountId, HoldId};

use crate::hold::{Hold, HoldStatus};

/// Hold store abstraction.
pub trait HoldStore: Send + Sync {
    fn insert(&self, hold: Hold) -> Result<(), HoldStoreError>;

    fn get(&self, hold_id: HoldId) -> Result<Option<Hold>, HoldStoreError>;

    fn update(&self, hold: &Hold) -> Result<(), HoldStoreError>;

    /// Holds that are still ACTIVE for the account.
    fn active_for_account(&self, account_id: AccountId) -> Result<Vec<Hold>, HoldStoreError>;

    /// ACTIVE holds whose expiry is at or before `now` (the sweep's
    /// selection criterion; safe under overlapping runs).
    fn active_expired_before(&self, now: DateTime<Utc>) -> Result<Vec<Hold>, HoldStoreError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum HoldStoreError {
    #[error("hold not found: {0}")]
    NotFound(HoldId),
    #[error("hold already exists: {0}")]
    AlreadyExists(HoldId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// In-memory hold store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryHoldStore {
    holds: RwLock<HashMap<HoldId, Hold>>,
}

impl InMemoryHoldStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl HoldStore for InMemoryHoldStore {
    fn insert(&self, hold: Hold) -> Result<(), HoldStoreError> {
        let mut holds = self.holds.write().unwrap();
        if holds.contains_key(&hold.id) {
            return Err(HoldStoreError::AlreadyExists(hold.id));
        }
        holds.insert(hold.id, hold);
        Ok(())
    }

    fn get(&self, hold_id: HoldId) -> Result<Option<Hold>, HoldStoreError> {
        let holds = self.holds.read().unwrap();
        Ok(holds.get(&hold_id).cloned())
    }

    fn update(&self, hold: &Hold) -> Result<(), HoldStoreError> {
        let mut holds = self.holds.write().unwrap();
        if !holds.contains_key(&hold.id) {
            return Err(HoldStoreError::NotFound(hold.id));
        }
        holds.insert(hold.id, hold.clone());
        Ok(())
    }

    fn active_for_account(&self, account_id: AccountId) -> Result<Vec<Hold>, HoldStoreError> {
        let holds = self.holds.read().unwrap();
        let mut result: Vec<_> = holds
            .values()
            .filter(|h| h.account_id == account_id && h.status == HoldStatus::Active)
            .cloned()
            .collect();
        result.sort_by_key(|h| h.created_at);
        Ok(result)
    }

    fn active_expired_before(&self, now: DateTime<Utc>) -> Result<Vec<Hold>, HoldStoreError> {
        let holds = self.holds.read().unwrap();
        let mut result: Vec<_> = holds
            .values()
            .filter(|h| h.is_expired_at(now))
            .cloned()
            .collect();
        result.sort_by_key(|h| h.expires_at);
        Ok(result)
    }
}

impl<S> HoldStore for Arc<S>
where
    S: HoldStore + ?Sized,
{
    fn insert(&self, hold: Hold) -> Result<(), HoldStoreError> {
        (**self).insert(hold)
    }

    fn get(&self, hold_id: HoldId) -> Result<Option<Hold>, HoldStoreError> {
        (**self).get(hold_id)
    }

    fn update(&self, hold: &Hold) -> Result<(), HoldStoreError> {
        (**self).update(hold)
    }

    fn active_for_account(&self, account_id: AccountId) -> Result<Vec<Hold>, HoldStoreError> {
        (**self).active_for_account(account_id)
    }

    fn active_expired_before(&self, now: DateTime<Utc>) -> Result<Vec<Hold>, HoldStoreError> {
        (**self).active_expired_before(now)
    }
}
