//! Rule evaluation engine.

use std::collections::HashMap;

use chrono::{Duration, Timelike};
use rust_decimal::prelude::ToPrimitive;
use tracing::{debug, info};

use corebank_core::{DomainError, DomainResult};

use crate::context::{EvaluationContext, FraudReport, RiskLevel};
use crate::rule::{FraudRule, RuleKind};
use crate::store::{RuleStore, RuleStoreError};

/// Scores above this force a block even without an auto-block rule.
const BLOCK_SCORE: u8 = 75;

const OFF_HOURS_START: u32 = 2;
const OFF_HOURS_END: u32 = 6;

const VELOCITY_WINDOW_MINS: i64 = 60;
const RAPID_SUCCESSION_WINDOW_SECS: i64 = 60;

/// Returns a human-readable reason when the rule triggers.
type Evaluator = Box<dyn Fn(&FraudRule, &EvaluationContext) -> Option<String> + Send + Sync>;

/// Evaluates the enabled rule set against one transaction context.
///
/// Rules are evaluated independently, never short-circuited, so the
/// report always lists every triggered rule. Points are summed and
/// capped at 100.
pub struct FraudEngine<S: RuleStore> {
    store: S,
    evaluators: HashMap<RuleKind, Evaluator>,
}

impl<S: RuleStore> FraudEngine<S> {
    pub fn new(store: S) -> Self {
        let mut engine = Self {
            store,
            evaluators: HashMap::new(),
        };
        engine.register(RuleKind::AmountThreshold, Box::new(eval_amount_threshold));
        engine.register(RuleKind::TransactionVelocity, Box::new(eval_velocity));
        engine.register(RuleKind::BlacklistedLocation, Box::new(eval_blacklist));
        engine.register(RuleKind::OffHours, Box::new(eval_off_hours));
        engine.register(RuleKind::RoundAmount, Box::new(eval_round_amount));
        engine.register(RuleKind::RapidSuccession, Box::new(eval_rapid_succession));
        engine
    }

    fn register(&mut self, kind: RuleKind, evaluator: Evaluator) {
        self.evaluators.insert(kind, evaluator);
    }

    pub fn add_rule(&self, rule: FraudRule) -> DomainResult<()> {
        self.store.upsert(&rule).map_err(map_store_err)
    }

    /// Run every enabled rule and aggregate the result.
    pub fn evaluate(&self, context: &EvaluationContext) -> DomainResult<FraudReport> {
        let rules = self.store.enabled_rules().map_err(map_store_err)?;

        let mut score: u32 = 0;
        let mut triggered = Vec::new();
        let mut reasons = Vec::new();
        let mut auto_block = false;

        for rule in &rules {
            let Some(evaluator) = self.evaluators.get(&rule.kind) else {
                continue;
            };
            if let Some(reason) = evaluator(rule, context) {
                debug!(rule = %rule.name, points = rule.points, "rule triggered");
                score += u32::from(rule.points);
                triggered.push(rule.id);
                reasons.push(reason);
                auto_block |= rule.auto_block;
            }
        }

        let risk_score = score.min(100) as u8;
        let risk_level = RiskLevel::from_score(risk_score);
        let should_block = auto_block || risk_score > BLOCK_SCORE;

        if should_block {
            info!(
                account_id = %context.account_id,
                risk_score,
                triggered = triggered.len(),
                "transaction flagged for block"
            );
        }

        Ok(FraudReport {
            risk_score,
            risk_level,
            triggered_rules: triggered,
            reasons,
            should_block,
            recommendation: risk_level.recommendation(),
        })
    }
}

fn eval_amount_threshold(rule: &FraudRule, ctx: &EvaluationContext) -> Option<String> {
    let threshold = rule.threshold?;
    (ctx.amount.amount() >= threshold)
        .then(|| format!("amount {} at or above threshold {threshold}", ctx.amount))
}

fn eval_velocity(rule: &FraudRule, ctx: &EvaluationContext) -> Option<String> {
    let max = rule.threshold?.to_u32()?;
    let window_start = ctx.occurred_at - Duration::minutes(VELOCITY_WINDOW_MINS);
    let count = ctx
        .recent
        .iter()
        .filter(|t| t.occurred_at >= window_start)
        .count() as u32;
    (count > max).then(|| format!("{count} transactions in the past hour exceeds {max}"))
}

fn eval_blacklist(rule: &FraudRule, ctx: &EvaluationContext) -> Option<String> {
    let location = ctx.location.as_deref()?;
    rule.country_blacklist
        .iter()
        .any(|c| c.eq_ignore_ascii_case(location))
        .then(|| format!("origin country {location} is blacklisted"))
}

fn eval_off_hours(_rule: &FraudRule, ctx: &EvaluationContext) -> Option<String> {
    let hour = ctx.occurred_at.hour();
    (OFF_HOURS_START..OFF_HOURS_END)
        .contains(&hour)
        .then(|| format!("transaction at {hour:02}:00 falls in the off-hours window"))
}

fn eval_round_amount(rule: &FraudRule, ctx: &EvaluationContext) -> Option<String> {
    if !ctx.amount.is_round() {
        return None;
    }
    if let Some(floor) = rule.threshold {
        if ctx.amount.amount() < floor {
            return None;
        }
    }
    Some(format!("round amount {}", ctx.amount))
}

fn eval_rapid_succession(rule: &FraudRule, ctx: &EvaluationContext) -> Option<String> {
    let min_count = rule.threshold?.to_u32()?;
    let window_start = ctx.occurred_at - Duration::seconds(RAPID_SUCCESSION_WINDOW_SECS);
    let count = ctx
        .recent
        .iter()
        .filter(|t| t.occurred_at >= window_start)
        .count() as u32;
    (count >= min_count).then(|| format!("{count} transactions inside one minute"))
}

fn map_store_err(err: RuleStoreError) -> DomainError {
    match err {
        RuleStoreError::Storage(msg) => DomainError::internal(msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Recommendation, RecentActivity};
    use crate::store::InMemoryRuleStore;
    use chrono::{TimeZone, Utc};
    use corebank_core::{AccountId, Money, UserId};
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn context(amount: Money) -> EvaluationContext {
        EvaluationContext {
            account_id: AccountId::new(),
            user_id: UserId::new(),
            amount,
            location: None,
            // Midday, outside the off-hours window.
            occurred_at: Utc.with_ymd_and_hms(2026, 5, 4, 12, 30, 0).unwrap(),
            recent: Vec::new(),
        }
    }

    fn engine() -> FraudEngine<InMemoryRuleStore> {
        FraudEngine::new(InMemoryRuleStore::new())
    }

    #[test]
    fn no_rules_means_clean_report() {
        let engine = engine();
        let report = engine.evaluate(&context(Money::new(dec!(50)))).unwrap();
        assert_eq!(report.risk_score, 0);
        assert!(!report.should_block);
        assert_eq!(report.recommendation, Recommendation::Allow);
    }

    #[test]
    fn amount_threshold_triggers_at_boundary() {
        let engine = engine();
        engine
            .add_rule(
                FraudRule::new(RuleKind::AmountThreshold, "large-amount", 30)
                    .with_threshold(dec!(10000)),
            )
            .unwrap();

        let under = engine.evaluate(&context(Money::new(dec!(9999.99)))).unwrap();
        assert_eq!(under.risk_score, 0);

        let at = engine.evaluate(&context(Money::new(dec!(10000)))).unwrap();
        assert_eq!(at.risk_score, 30);
        assert_eq!(at.risk_level, RiskLevel::Medium);
        assert_eq!(at.triggered_rules.len(), 1);
    }

    #[test]
    fn points_are_additive_and_never_short_circuit() {
        let engine = engine();
        engine
            .add_rule(
                FraudRule::new(RuleKind::AmountThreshold, "large-amount", 40)
                    .with_threshold(dec!(1000)),
            )
            .unwrap();
        engine
            .add_rule(FraudRule::new(RuleKind::RoundAmount, "round-amount", 20))
            .unwrap();

        let report = engine.evaluate(&context(Money::new(dec!(5000)))).unwrap();
        assert_eq!(report.risk_score, 60);
        assert_eq!(report.triggered_rules.len(), 2);
        assert_eq!(report.reasons.len(), 2);
        assert_eq!(report.risk_level, RiskLevel::High);
        assert_eq!(report.recommendation, Recommendation::Review);
        assert!(!report.should_block);
    }

    #[test]
    fn score_above_75_blocks_without_auto_block() {
        let engine = engine();
        engine
            .add_rule(
                FraudRule::new(RuleKind::AmountThreshold, "large-amount", 60)
                    .with_threshold(dec!(1000)),
            )
            .unwrap();
        engine
            .add_rule(FraudRule::new(RuleKind::RoundAmount, "round-amount", 20))
            .unwrap();

        let report = engine.evaluate(&context(Money::new(dec!(5000)))).unwrap();
        assert_eq!(report.risk_score, 80);
        assert!(report.should_block);
        assert_eq!(report.risk_level, RiskLevel::Critical);
        assert_eq!(report.recommendation, Recommendation::Block);
    }

    #[test]
    fn auto_block_rule_blocks_at_any_score() {
        let engine = engine();
        engine
            .add_rule(
                FraudRule::new(RuleKind::BlacklistedLocation, "sanctioned-origin", 10)
                    .with_auto_block()
                    .with_blacklist(["KP", "IR"]),
            )
            .unwrap();

        let mut ctx = context(Money::new(dec!(10)));
        ctx.location = Some("kp".to_string());

        let report = engine.evaluate(&ctx).unwrap();
        assert_eq!(report.risk_score, 10);
        assert_eq!(report.risk_level, RiskLevel::Low);
        assert!(report.should_block);
    }

    #[test]
    fn disabled_rules_are_skipped() {
        let engine = engine();
        engine
            .add_rule(
                FraudRule::new(RuleKind::AmountThreshold, "large-amount", 90)
                    .with_threshold(dec!(1))
                    .disabled(),
            )
            .unwrap();

        let report = engine.evaluate(&context(Money::new(dec!(5000)))).unwrap();
        assert_eq!(report.risk_score, 0);
    }

    #[test]
    fn off_hours_window_boundaries() {
        let engine = engine();
        engine
            .add_rule(FraudRule::new(RuleKind::OffHours, "night-activity", 15))
            .unwrap();

        let mut ctx = context(Money::new(dec!(50.50)));

        ctx.occurred_at = Utc.with_ymd_and_hms(2026, 5, 4, 2, 0, 0).unwrap();
        assert_eq!(engine.evaluate(&ctx).unwrap().risk_score, 15);

        ctx.occurred_at = Utc.with_ymd_and_hms(2026, 5, 4, 5, 59, 59).unwrap();
        assert_eq!(engine.evaluate(&ctx).unwrap().risk_score, 15);

        ctx.occurred_at = Utc.with_ymd_and_hms(2026, 5, 4, 6, 0, 0).unwrap();
        assert_eq!(engine.evaluate(&ctx).unwrap().risk_score, 0);

        ctx.occurred_at = Utc.with_ymd_and_hms(2026, 5, 4, 1, 59, 59).unwrap();
        assert_eq!(engine.evaluate(&ctx).unwrap().risk_score, 0);
    }

    #[test]
    fn velocity_counts_only_the_window() {
        let engine = engine();
        engine
            .add_rule(
                FraudRule::new(RuleKind::TransactionVelocity, "high-velocity", 25)
                    .with_threshold(dec!(3)),
            )
            .unwrap();

        let mut ctx = context(Money::new(dec!(50.50)));
        let now = ctx.occurred_at;
        // Three inside the hour, one stale.
        ctx.recent = vec![
            RecentActivity { amount: Money::new(dec!(10)), occurred_at: now - Duration::minutes(5) },
            RecentActivity { amount: Money::new(dec!(10)), occurred_at: now - Duration::minutes(20) },
            RecentActivity { amount: Money::new(dec!(10)), occurred_at: now - Duration::minutes(59) },
            RecentActivity { amount: Money::new(dec!(10)), occurred_at: now - Duration::hours(3) },
        ];
        assert_eq!(engine.evaluate(&ctx).unwrap().risk_score, 0);

        ctx.recent.push(RecentActivity {
            amount: Money::new(dec!(10)),
            occurred_at: now - Duration::minutes(1),
        });
        assert_eq!(engine.evaluate(&ctx).unwrap().risk_score, 25);
    }

    #[test]
    fn rapid_succession_uses_the_minute_window() {
        let engine = engine();
        engine
            .add_rule(
                FraudRule::new(RuleKind::RapidSuccession, "burst", 35).with_threshold(dec!(2)),
            )
            .unwrap();

        let mut ctx = context(Money::new(dec!(50.50)));
        let now = ctx.occurred_at;
        ctx.recent = vec![
            RecentActivity { amount: Money::new(dec!(10)), occurred_at: now - Duration::seconds(10) },
            RecentActivity { amount: Money::new(dec!(10)), occurred_at: now - Duration::minutes(5) },
        ];
        assert_eq!(engine.evaluate(&ctx).unwrap().risk_score, 0);

        ctx.recent.push(RecentActivity {
            amount: Money::new(dec!(10)),
            occurred_at: now - Duration::seconds(45),
        });
        assert_eq!(engine.evaluate(&ctx).unwrap().risk_score, 35);
    }

    proptest! {
        #[test]
        fn score_is_capped_and_block_decision_is_consistent(
            points in proptest::collection::vec(0u8..=50, 0..6)
        ) {
            let engine = engine();
            for (i, p) in points.iter().enumerate() {
                engine
                    .add_rule(
                        FraudRule::new(RuleKind::AmountThreshold, format!("rule-{i}"), *p)
                            .with_threshold(Decimal::ONE),
                    )
                    .unwrap();
            }

            let report = engine.evaluate(&context(Money::new(dec!(500.50)))).unwrap();

            let raw: u32 = points.iter().map(|p| u32::from(*p)).sum();
            prop_assert_eq!(u32::from(report.risk_score), raw.min(100));
            prop_assert!(report.risk_score <= 100);
            prop_assert_eq!(report.should_block, report.risk_score > 75);
            prop_assert_eq!(report.triggered_rules.len(), points.len());
        }
    }
}
