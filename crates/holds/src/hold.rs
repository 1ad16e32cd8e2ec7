use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use corebank_core::{AccountId, HoldId, Money};

/// Why funds were reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HoldType {
    FraudReview,
    Authorization,
    LegalOrder,
}

/// Hold lifecycle. ACTIVE is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HoldStatus {
    Active,
    Released,
    Captured,
    Expired,
}

/// A temporary reservation against an account's available balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hold {
    pub id: HoldId,
    pub account_id: AccountId,
    pub amount: Money,
    pub hold_type: HoldType,
    pub status: HoldStatus,
    pub reason: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Who/what released the hold, for released holds only.
    pub released_by: Option<String>,
    pub released_reason: Option<String>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Hold {
    pub fn is_active(&self) -> bool {
        self.status == HoldStatus::Active
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.expires_at <= now
    }
}
