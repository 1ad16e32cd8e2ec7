use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use corebank_core::{Money, UserId};

/// Which kind of money movement a limit row governs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LimitType {
    Transfer,
    Withdrawal,
    Deposit,
}

/// Per-user caps with consumed-so-far counters.
///
/// Counters are reset lazily: whoever touches the row first after a
/// period boundary zeroes the stale counter before reading it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionLimit {
    pub user_id: UserId,
    pub limit_type: LimitType,
    /// Cap on a single transaction. `None` means uncapped.
    pub per_transaction: Option<Money>,
    pub daily_cap: Option<Money>,
    pub monthly_cap: Option<Money>,
    pub daily_consumed: Money,
    pub monthly_consumed: Money,
    pub daily_reset_on: NaiveDate,
    /// First day of the month the monthly counter belongs to.
    pub monthly_reset_on: NaiveDate,
    pub updated_at: DateTime<Utc>,
}

impl TransactionLimit {
    pub fn new(user_id: UserId, limit_type: LimitType, now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        Self {
            user_id,
            limit_type,
            per_transaction: None,
            daily_cap: None,
            monthly_cap: None,
            daily_consumed: Money::ZERO,
            monthly_consumed: Money::ZERO,
            daily_reset_on: today,
            monthly_reset_on: first_of_month(today),
            updated_at: now,
        }
    }

    pub fn with_per_transaction(mut self, cap: Money) -> Self {
        self.per_transaction = Some(cap);
        self
    }

    pub fn with_daily_cap(mut self, cap: Money) -> Self {
        self.daily_cap = Some(cap);
        self
    }

    pub fn with_monthly_cap(mut self, cap: Money) -> Self {
        self.monthly_cap = Some(cap);
        self
    }

    /// Zero any counter whose period has rolled over. Returns true when
    /// something changed and the row should be persisted.
    pub fn roll_over(&mut self, now: DateTime<Utc>) -> bool {
        let today = now.date_naive();
        let mut changed = false;

        if self.daily_reset_on != today {
            self.daily_consumed = Money::ZERO;
            self.daily_reset_on = today;
            changed = true;
        }

        let month = first_of_month(today);
        if self.monthly_reset_on != month {
            self.monthly_consumed = Money::ZERO;
            self.monthly_reset_on = month;
            changed = true;
        }

        if changed {
            self.updated_at = now;
        }
        changed
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    // with_day(1) is always valid.
    date.with_day(1).unwrap_or(date)
}

/// Rolling transaction-rate state per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VelocityCheck {
    pub user_id: UserId,
    pub window_start: DateTime<Utc>,
    pub count: u32,
    pub blocked_until: Option<DateTime<Utc>>,
}

impl VelocityCheck {
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            window_start: now,
            count: 0,
            blocked_until: None,
        }
    }

    pub fn is_blocked_at(&self, now: DateTime<Utc>) -> bool {
        self.blocked_until.is_some_and(|until| until > now)
    }
}
