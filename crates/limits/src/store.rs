//! Limit and velocity storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use corebank_core::UserId;

use crate::types::{LimitType, TransactionLimit, VelocityCheck};

/// Limit store abstraction.
pub trait LimitStore: Send + Sync {
    fn limit(
        &self,
        user_id: UserId,
        limit_type: LimitType,
    ) -> Result<Option<TransactionLimit>, LimitStoreError>;

    fn upsert_limit(&self, limit: &TransactionLimit) -> Result<(), LimitStoreError>;

    fn velocity(&self, user_id: UserId) -> Result<Option<VelocityCheck>, LimitStoreError>;

    fn upsert_velocity(&self, velocity: &VelocityCheck) -> Result<(), LimitStoreError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LimitStoreError {
    #[error("storage error: {0}")]
    Storage(String),
}

/// In-memory limit store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryLimitStore {
    limits: RwLock<HashMap<(UserId, LimitType), TransactionLimit>>,
    velocities: RwLock<HashMap<UserId, VelocityCheck>>,
}

impl InMemoryLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl LimitStore for InMemoryLimitStore {
    fn limit(
        &self,
        user_id: UserId,
        limit_type: LimitType,
    ) -> Result<Option<TransactionLimit>, LimitStoreError> {
        let limits = self.limits.read().unwrap();
        Ok(limits.get(&(user_id, limit_type)).cloned())
    }

    fn upsert_limit(&self, limit: &TransactionLimit) -> Result<(), LimitStoreError> {
        let mut limits = self.limits.write().unwrap();
        limits.insert((limit.user_id, limit.limit_type), limit.clone());
        Ok(())
    }

    fn velocity(&self, user_id: UserId) -> Result<Option<VelocityCheck>, LimitStoreError> {
        let velocities = self.velocities.read().unwrap();
        Ok(velocities.get(&user_id).cloned())
    }

    fn upsert_velocity(&self, velocity: &VelocityCheck) -> Result<(), LimitStoreError> {
        let mut velocities = self.velocities.write().unwrap();
        velocities.insert(velocity.user_id, velocity.clone());
        Ok(())
    }
}

impl<S> LimitStore for Arc<S>
where
    S: LimitStore + ?Sized,
{
    fn limit(
        &self,
        user_id: UserId,
        limit_type: LimitType,
    ) -> Result<Option<TransactionLimit>, LimitStoreError> {
        (**self).limit(user_id, limit_type)
    }

    fn upsert_limit(&self, limit: &TransactionLimit) -> Result<(), LimitStoreError> {
        (**self).upsert_limit(limit)
    }

    fn velocity(&self, user_id: UserId) -> Result<Option<VelocityCheck>, LimitStoreError> {
        (**self).velocity(user_id)
    }

    fn upsert_velocity(&self, velocity: &VelocityCheck) -> Result<(), LimitStoreError> {
        (**self).upsert_velocity(velocity)
    }
}
