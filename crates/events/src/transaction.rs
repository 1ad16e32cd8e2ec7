//! Transaction lifecycle events published by the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use corebank_core::{AccountId, Money, TransactionId};

use crate::event::Event;

/// Event: a transaction reached COMPLETED.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionCompleted {
    pub transaction_id: TransactionId,
    pub reference: String,
    pub from_account_id: Option<AccountId>,
    pub to_account_id: Option<AccountId>,
    pub amount: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: a transaction was compensated and marked REVERSED.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReversed {
    pub transaction_id: TransactionId,
    pub reference: String,
    pub failure_reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: the fraud gate aborted a transaction before any fund mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionBlocked {
    pub transaction_id: TransactionId,
    pub reference: String,
    pub risk_score: u8,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransactionEvent {
    Completed(TransactionCompleted),
    Reversed(TransactionReversed),
    Blocked(TransactionBlocked),
}

impl Event for TransactionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TransactionEvent::Completed(_) => "transaction.completed",
            TransactionEvent::Reversed(_) => "transaction.reversed",
            TransactionEvent::Blocked(_) => "transaction.blocked",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TransactionEvent::Completed(e) => e.occurred_at,
            TransactionEvent::Reversed(e) => e.occurred_at,
            TransactionEvent::Blocked(e) => e.occurred_at,
        }
    }
}
