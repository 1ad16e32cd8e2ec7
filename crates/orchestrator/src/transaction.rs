use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use corebank_core::{AccountId, Money, TransactionId, UserId};
use corebank_limits::LimitType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Transfer,
}

impl TransactionType {
    pub fn limit_type(self) -> LimitType {
        match self {
            Self::Deposit => LimitType::Deposit,
            Self::Withdrawal => LimitType::Withdrawal,
            Self::Transfer => LimitType::Transfer,
        }
    }

    /// Deposits have no source account to screen.
    pub fn fraud_gated(self) -> bool {
        !matches!(self, Self::Deposit)
    }
}

/// Saga lifecycle. FAILED covers both pre-mutation rejections and a
/// compensation that itself failed; REVERSED means the forward mutation
/// was undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Reversed,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Reversed)
    }
}

/// Forward steps, written to the record before the mutation they guard.
/// The recovery sweep reads these to decide how far a crashed saga got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaStep {
    Validated,
    FraudCleared,
    Debiting,
    Crediting,
    Compensating,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub step: SagaStep,
    pub at: DateTime<Utc>,
}

/// One submitted money movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub transaction_type: TransactionType,
    pub from_account_id: Option<AccountId>,
    pub to_account_id: Option<AccountId>,
    pub amount: Money,
    pub description: String,
    /// Human-facing reference, also stamped on the ledger entries.
    pub reference: String,
    pub status: TransactionStatus,
    pub failure_reason: Option<String>,
    pub idempotency_key: Option<String>,
    pub initiated_by: UserId,
    pub checkpoints: Vec<Checkpoint>,
    pub from_balance_after: Option<Money>,
    pub to_balance_after: Option<Money>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transaction_type: TransactionType,
        from_account_id: Option<AccountId>,
        to_account_id: Option<AccountId>,
        amount: Money,
        description: String,
        idempotency_key: Option<String>,
        initiated_by: UserId,
        now: DateTime<Utc>,
    ) -> Self {
        let id = TransactionId::new();
        Self {
            id,
            transaction_type,
            from_account_id,
            to_account_id,
            amount,
            description,
            reference: reference_for(id),
            status: TransactionStatus::Pending,
            failure_reason: None,
            idempotency_key,
            initiated_by,
            checkpoints: Vec::new(),
            from_balance_after: None,
            to_balance_after: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn checkpoint(&mut self, step: SagaStep, now: DateTime<Utc>) {
        self.checkpoints.push(Checkpoint { step, at: now });
        self.updated_at = now;
    }

    pub fn last_checkpoint(&self) -> Option<Checkpoint> {
        self.checkpoints.last().copied()
    }

    pub fn mark_processing(&mut self, now: DateTime<Utc>) {
        self.status = TransactionStatus::Processing;
        self.updated_at = now;
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.status = TransactionStatus::Completed;
        self.checkpoint(SagaStep::Completed, now);
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.status = TransactionStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.updated_at = now;
    }

    pub fn mark_reversed(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.status = TransactionStatus::Reversed;
        self.failure_reason = Some(reason.into());
        self.updated_at = now;
    }

    /// Timestamp the recovery sweep compares against its deadline.
    pub fn last_progress_at(&self) -> DateTime<Utc> {
        self.last_checkpoint()
            .map(|c| c.at)
            .unwrap_or(self.updated_at)
    }
}

/// Human-facing reference: the time-ordered tail of the id, so references
/// sort roughly by creation time.
pub fn reference_for(id: TransactionId) -> String {
    let hex = id.as_uuid().simple().to_string();
    format!("TXN-{}", hex[20..].to_uppercase())
}

/// Reference stamped on a compensating entry, pointing back at the
/// original movement.
pub fn compensation_reference(reference: &str) -> String {
    format!("{reference}-COMPENSATION")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn transaction() -> Transaction {
        Transaction::new(
            TransactionType::Deposit,
            None,
            Some(AccountId::new()),
            Money::new(dec!(10)),
            "test".into(),
            None,
            UserId::new(),
            Utc::now(),
        )
    }

    #[test]
    fn reference_format() {
        let txn = transaction();
        assert!(txn.reference.starts_with("TXN-"));
        assert_eq!(txn.reference.len(), 4 + 12);
        assert!(
            txn.reference[4..]
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        );
    }

    #[test]
    fn compensation_reference_points_at_original() {
        assert_eq!(
            compensation_reference("TXN-ABC123"),
            "TXN-ABC123-COMPENSATION"
        );
    }

    #[test]
    fn checkpoints_accumulate_in_order() {
        let mut txn = transaction();
        let now = Utc::now();
        txn.checkpoint(SagaStep::Validated, now);
        txn.checkpoint(SagaStep::FraudCleared, now);
        assert_eq!(txn.last_checkpoint().unwrap().step, SagaStep::FraudCleared);
        assert_eq!(txn.checkpoints.len(), 2);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(!TransactionStatus::Processing.is_terminal());
        assert!(TransactionStatus::Completed.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
        assert!(TransactionStatus::Reversed.is_terminal());
    }
}
