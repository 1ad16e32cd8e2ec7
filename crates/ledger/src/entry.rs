use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use corebank_core::{AccountId, EntryId, Money, TransactionId};

/// Side of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryType {
    Credit,
    Debit,
}

/// One immutable credit or debit against an account.
///
/// Entries are append-only: they are never updated or deleted. The
/// `running_balance` snapshots the account balance *after* this entry was
/// applied, which makes as-of queries and reconciliation cheap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub account_id: AccountId,
    pub transaction_id: TransactionId,
    pub entry_type: EntryType,
    /// Always positive; the sign lives in `entry_type`.
    pub amount: Money,
    pub running_balance: Money,
    pub reference: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Signed effect of this entry on the account balance.
    pub fn signed_amount(&self) -> Money {
        match self.entry_type {
            EntryType::Credit => self.amount,
            EntryType::Debit => -self.amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn signed_amounts() {
        let mut entry = LedgerEntry {
            id: EntryId::new(),
            account_id: AccountId::new(),
            transaction_id: TransactionId::new(),
            entry_type: EntryType::Credit,
            amount: Money::new(dec!(25)),
            running_balance: Money::new(dec!(25)),
            reference: "TXN-TEST".to_string(),
            description: "test".to_string(),
            created_at: Utc::now(),
        };

        assert_eq!(entry.signed_amount(), Money::new(dec!(25)));
        entry.entry_type = EntryType::Debit;
        assert_eq!(entry.signed_amount(), Money::new(dec!(-25)));
    }
}
