use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use corebank_core::{AccountId, Money, RuleId, TransactionId, UserId};

/// Everything the engine looks at for one evaluation. The caller
/// assembles this from the ledger and transaction history; the engine
/// itself never reaches into stores.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    pub account_id: AccountId,
    pub user_id: UserId,
    pub amount: Money,
    /// ISO country code of the request origin, when known.
    pub location: Option<String>,
    pub occurred_at: DateTime<Utc>,
    /// Recent transactions by the same user, newest first.
    pub recent: Vec<RecentActivity>,
}

/// Slim view of a past transaction, enough for rate heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecentActivity {
    pub amount: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Score band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// CRITICAL at 76+, HIGH 51-75, MEDIUM 26-50, LOW below.
    pub fn from_score(score: u8) -> Self {
        match score {
            76.. => Self::Critical,
            51..=75 => Self::High,
            26..=50 => Self::Medium,
            _ => Self::Low,
        }
    }

    pub fn recommendation(self) -> Recommendation {
        match self {
            Self::Critical => Recommendation::Block,
            Self::High => Recommendation::Review,
            Self::Medium => Recommendation::Monitor,
            Self::Low => Recommendation::Allow,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Allow,
    Monitor,
    Review,
    Block,
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudReport {
    /// Additive points from triggered rules, capped at 100.
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub triggered_rules: Vec<RuleId>,
    pub reasons: Vec<String>,
    /// True when an auto-block rule triggered or the score exceeds 75.
    pub should_block: bool,
    pub recommendation: Recommendation,
}

/// Persisted trace of an evaluation, consumed by the review workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudEvent {
    pub transaction_id: TransactionId,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub triggered_rules: Vec<RuleId>,
    pub blocked: bool,
    pub recorded_at: DateTime<Utc>,
}

impl FraudEvent {
    pub fn from_report(
        transaction_id: TransactionId,
        report: &FraudReport,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            transaction_id,
            risk_score: report.risk_score,
            risk_level: report.risk_level,
            triggered_rules: report.triggered_rules.clone(),
            blocked: report.should_block,
            recorded_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_bands() {
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(25), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(26), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(50), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(51), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(75), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(76), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(100), RiskLevel::Critical);
    }

    #[test]
    fn bands_map_to_recommendations() {
        assert_eq!(RiskLevel::Low.recommendation(), Recommendation::Allow);
        assert_eq!(RiskLevel::Medium.recommendation(), Recommendation::Monitor);
        assert_eq!(RiskLevel::High.recommendation(), Recommendation::Review);
        assert_eq!(RiskLevel::Critical.recommendation(), Recommendation::Block);
    }
}
