//! Rule storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use corebank_core::RuleId;

use crate::rule::FraudRule;

pub trait RuleStore: Send + Sync {
    fn rule(&self, id: RuleId) -> Result<Option<FraudRule>, RuleStoreError>;

    /// All enabled rules, highest priority first.
    fn enabled_rules(&self) -> Result<Vec<FraudRule>, RuleStoreError>;

    fn upsert(&self, rule: &FraudRule) -> Result<(), RuleStoreError>;

    fn remove(&self, id: RuleId) -> Result<(), RuleStoreError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RuleStoreError {
    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Default)]
pub struct InMemoryRuleStore {
    rules: RwLock<HashMap<RuleId, FraudRule>>,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl RuleStore for InMemoryRuleStore {
    fn rule(&self, id: RuleId) -> Result<Option<FraudRule>, RuleStoreError> {
        let rules = self.rules.read().unwrap();
        Ok(rules.get(&id).cloned())
    }

    fn enabled_rules(&self) -> Result<Vec<FraudRule>, RuleStoreError> {
        let rules = self.rules.read().unwrap();
        let mut enabled: Vec<_> = rules.values().filter(|r| r.enabled).cloned().collect();
        enabled.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(enabled)
    }

    fn upsert(&self, rule: &FraudRule) -> Result<(), RuleStoreError> {
        let mut rules = self.rules.write().unwrap();
        rules.insert(rule.id, rule.clone());
        Ok(())
    }

    fn remove(&self, id: RuleId) -> Result<(), RuleStoreError> {
        let mut rules = self.rules.write().unwrap();
        rules.remove(&id);
        Ok(())
    }
}

impl<S> RuleStore for Arc<S>
where
    S: RuleStore + ?Sized,
{
    fn rule(&self, id: RuleId) -> Result<Option<FraudRule>, RuleStoreError> {
        (**self).rule(id)
    }

    fn enabled_rules(&self) -> Result<Vec<FraudRule>, RuleStoreError> {
        (**self).enabled_rules()
    }

    fn upsert(&self, rule: &FraudRule) -> Result<(), RuleStoreError> {
        (**self).upsert(rule)
    }

    fn remove(&self, id: RuleId) -> Result<(), RuleStoreError> {
        (**self).remove(id)
    }
}
