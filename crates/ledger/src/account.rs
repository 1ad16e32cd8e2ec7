use serde::{Deserialize, Serialize};

use corebank_core::{AccountId, Currency, Money, UserId};

/// Account lifecycle status.
///
/// Only ACTIVE accounts may take part in money movements; the orchestrator
/// rejects everything else before the first ledger mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountStatus {
    Active,
    Frozen,
    Suspended,
    Closed,
}

/// Account projection row.
///
/// `balance` is derived from the ledger entries and re-projected after
/// every applied entry. `version` is the concurrent-write marker: the
/// store rejects a projection write whose expected version is stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub user_id: UserId,
    pub balance: Money,
    pub overdraft_limit: Money,
    pub currency: Currency,
    pub status: AccountStatus,
    pub version: u64,
}

impl Account {
    /// Open a new active account with a zero balance.
    pub fn open(user_id: UserId, currency: Currency, overdraft_limit: Money) -> Self {
        Self {
            id: AccountId::new(),
            user_id,
            balance: Money::ZERO,
            overdraft_limit,
            currency,
            status: AccountStatus::Active,
            version: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// A debit of `amount` is honoured when it stays within
    /// `balance + overdraft_limit`.
    pub fn can_cover(&self, current_balance: Money, amount: Money) -> bool {
        amount <= current_balance + self.overdraft_limit
    }
}
