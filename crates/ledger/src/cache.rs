//! In-process balance cache.
//!
//! Cache-aside over the derived balance, keyed by account id and pinned to
//! the account projection version: a hit is only served when the cached
//! version matches the current projection, so a stale instance can never
//! serve a balance from before someone else's write. Invalidated on every
//! local write. No cross-instance consistency is promised.

use std::collections::HashMap;
use std::sync::RwLock;

use corebank_core::{AccountId, Money};

#[derive(Debug, Default)]
pub struct BalanceCache {
    inner: RwLock<HashMap<AccountId, (u64, Money)>>,
}

impl BalanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached balance, only if it was computed at `version`.
    pub fn get(&self, account_id: AccountId, version: u64) -> Option<Money> {
        let inner = self.inner.read().unwrap();
        match inner.get(&account_id) {
            Some((v, balance)) if *v == version => Some(*balance),
            _ => None,
        }
    }

    pub fn put(&self, account_id: AccountId, version: u64, balance: Money) {
        let mut inner = self.inner.write().unwrap();
        inner.insert(account_id, (version, balance));
    }

    pub fn invalidate(&self, account_id: AccountId) {
        let mut inner = self.inner.write().unwrap();
        inner.remove(&account_id);
    }
}
