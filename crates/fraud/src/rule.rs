use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use corebank_core::RuleId;

/// Closed set of rule behaviors. Each kind has one registered evaluator
/// in the engine; adding a kind means adding a variant and an evaluator,
/// not a new branch in a conditional chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleKind {
    /// Single transaction at or above the configured amount.
    AmountThreshold,
    /// More than `threshold` transactions in the past hour.
    TransactionVelocity,
    /// Transaction originates from a blacklisted country.
    BlacklistedLocation,
    /// Transaction lands inside the 02:00-06:00 UTC window.
    OffHours,
    /// Whole-number amount at or above the configured floor.
    RoundAmount,
    /// At least `threshold` transactions inside the past minute.
    RapidSuccession,
}

/// One tunable scoring rule.
///
/// `threshold` is kind-dependent: an amount for AmountThreshold and
/// RoundAmount, a count for TransactionVelocity and RapidSuccession,
/// unused for the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudRule {
    pub id: RuleId,
    pub kind: RuleKind,
    pub name: String,
    pub threshold: Option<Decimal>,
    /// Points added to the risk score when this rule triggers.
    pub points: u8,
    /// Evaluation order; higher runs first.
    pub priority: i32,
    pub enabled: bool,
    /// A triggered auto-block rule forces `should_block` regardless of score.
    pub auto_block: bool,
    /// ISO country codes. Only consulted by BlacklistedLocation.
    pub country_blacklist: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl FraudRule {
    pub fn new(kind: RuleKind, name: impl Into<String>, points: u8) -> Self {
        Self {
            id: RuleId::new(),
            kind,
            name: name.into(),
            threshold: None,
            points,
            priority: 0,
            enabled: true,
            auto_block: false,
            country_blacklist: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_threshold(mut self, threshold: Decimal) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_auto_block(mut self) -> Self {
        self.auto_block = true;
        self
    }

    pub fn with_blacklist<I, S>(mut self, countries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.country_blacklist = countries.into_iter().map(Into::into).collect();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}
