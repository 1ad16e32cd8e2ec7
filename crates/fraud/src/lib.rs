//! `corebank-fraud`: rule-based risk scoring for money movements.
//!
//! Rules are plain data rows (threshold, points, priority, enabled,
//! auto-block, optional country blacklist) dispatched to a registered
//! evaluator per rule kind. Every triggered rule contributes its points;
//! the total is capped at 100 and banded into a recommendation. Operators
//! tune scoring by editing rows, not by redeploying.

pub mod context;
pub mod engine;
pub mod rule;
pub mod store;

pub use context::{EvaluationContext, FraudEvent, FraudReport, Recommendation, RecentActivity, RiskLevel};
pub use engine::FraudEngine;
pub use rule::{FraudRule, RuleKind};
pub use store::{InMemoryRuleStore, RuleStore, RuleStoreError};
