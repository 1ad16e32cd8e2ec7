//! Ledger service: applies entries, projects balances, reconciles.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use corebank_core::{AccountId, DomainError, DomainResult, EntryId, Money, TransactionId};

use crate::account::Account;
use crate::cache::BalanceCache;
use crate::entry::{EntryType, LedgerEntry};
use crate::locks::AccountLocks;
use crate::store::{LedgerStore, LedgerStoreError};

/// Outcome of a successfully applied transfer: the paired entries share
/// one transaction id.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub debit_entry: LedgerEntry,
    pub credit_entry: LedgerEntry,
}

/// A failed transfer. When `debit_applied` is set, the debit leg already
/// hit the ledger and the caller owes a compensating credit; the ledger
/// itself never unwinds cross-account state.
#[derive(Debug, Clone)]
pub struct TransferError {
    pub cause: DomainError,
    pub debit_applied: bool,
}

/// Result of comparing the entry-derived balance against the projection.
/// Mismatches are reported, never auto-corrected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationReport {
    pub account_id: AccountId,
    pub ledger_balance: Money,
    pub projected_balance: Money,
    pub consistent: bool,
    pub checked_at: DateTime<Utc>,
}

/// The append-only double-entry ledger.
///
/// Every mutation holds the account's exclusive lock from the balance read
/// through the projection write, so mutations on one account are fully
/// serialized while disjoint accounts proceed in parallel.
pub struct Ledger<S: LedgerStore> {
    store: S,
    locks: AccountLocks,
    cache: BalanceCache,
}

impl<S: LedgerStore> Ledger<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: AccountLocks::new(),
            cache: BalanceCache::new(),
        }
    }

    /// Register an account projection row (account opening is approved
    /// upstream; the ledger only learns about the result).
    pub fn register_account(&self, account: Account) -> DomainResult<()> {
        self.store.insert_account(account).map_err(map_store_err)
    }

    /// Fetch an account or fail NOT_FOUND.
    pub fn account(&self, account_id: AccountId) -> DomainResult<Account> {
        self.store
            .account(account_id)
            .map_err(map_store_err)?
            .ok_or_else(|| DomainError::not_found(format!("account {account_id}")))
    }

    /// Current balance, served cache-aside.
    ///
    /// The cache entry is pinned to the projection version, so any write
    /// (which bumps the version) turns stale hits into misses even if the
    /// invalidation was lost.
    pub fn balance(&self, account_id: AccountId) -> DomainResult<Money> {
        let account = self.account(account_id)?;
        if let Some(balance) = self.cache.get(account_id, account.version) {
            return Ok(balance);
        }

        let balance = self.derived_balance(account_id)?;
        self.cache.put(account_id, account.version, balance);
        Ok(balance)
    }

    /// Balance derived from the entries alone (the source of truth).
    pub fn derived_balance(&self, account_id: AccountId) -> DomainResult<Money> {
        let entries = self
            .store
            .entries_for_account(account_id)
            .map_err(map_store_err)?;
        Ok(entries.iter().map(LedgerEntry::signed_amount).sum())
    }

    /// Append a CREDIT entry and project the new balance.
    pub fn credit(
        &self,
        account_id: AccountId,
        transaction_id: TransactionId,
        amount: Money,
        reference: &str,
        description: &str,
    ) -> DomainResult<LedgerEntry> {
        self.locks.with_account(account_id, || {
            self.apply_unlocked(
                account_id,
                transaction_id,
                EntryType::Credit,
                amount,
                reference,
                description,
            )
        })
    }

    /// Append a DEBIT entry and project the new balance.
    ///
    /// Fails INSUFFICIENT_FUNDS when `amount > balance + overdraft_limit`,
    /// leaving the ledger untouched.
    pub fn debit(
        &self,
        account_id: AccountId,
        transaction_id: TransactionId,
        amount: Money,
        reference: &str,
        description: &str,
    ) -> DomainResult<LedgerEntry> {
        self.locks.with_account(account_id, || {
            self.apply_unlocked(
                account_id,
                transaction_id,
                EntryType::Debit,
                amount,
                reference,
                description,
            )
        })
    }

    /// Debit `from`, then credit `to`, under both account locks (lower id
    /// acquired first).
    ///
    /// The two legs are **not** atomic: a credit failure after a
    /// successful debit is reported with `debit_applied = true` and the
    /// orchestrator owes the compensating credit.
    pub fn execute_transfer(
        &self,
        from: AccountId,
        to: AccountId,
        transaction_id: TransactionId,
        amount: Money,
        reference: &str,
    ) -> Result<TransferOutcome, TransferError> {
        self.locks.with_pair(from, to, || {
            let debit_entry = self
                .apply_unlocked(
                    from,
                    transaction_id,
                    EntryType::Debit,
                    amount,
                    reference,
                    "transfer out",
                )
                .map_err(|cause| TransferError {
                    cause,
                    debit_applied: false,
                })?;

            let credit_entry = self
                .apply_unlocked(
                    to,
                    transaction_id,
                    EntryType::Credit,
                    amount,
                    reference,
                    "transfer in",
                )
                .map_err(|cause| TransferError {
                    cause,
                    debit_applied: true,
                })?;

            Ok(TransferOutcome {
                debit_entry,
                credit_entry,
            })
        })
    }

    /// Compare the entry-derived balance to the projection.
    pub fn reconcile_balance(&self, account_id: AccountId) -> DomainResult<ReconciliationReport> {
        let account = self.account(account_id)?;
        let ledger_balance = self.derived_balance(account_id)?;
        let consistent = ledger_balance == account.balance;

        if !consistent {
            warn!(
                %account_id,
                %ledger_balance,
                projected_balance = %account.balance,
                "balance projection drifted from ledger"
            );
        }

        Ok(ReconciliationReport {
            account_id,
            ledger_balance,
            projected_balance: account.balance,
            consistent,
            checked_at: Utc::now(),
        })
    }

    /// Replay entries up to `cutoff` (statement opening balances).
    pub fn balance_as_of(
        &self,
        account_id: AccountId,
        cutoff: DateTime<Utc>,
    ) -> DomainResult<Money> {
        // Existence check first so a missing account is NOT_FOUND, not zero.
        self.account(account_id)?;
        let entries = self
            .store
            .entries_for_account_until(account_id, cutoff)
            .map_err(map_store_err)?;
        Ok(entries.iter().map(LedgerEntry::signed_amount).sum())
    }

    /// Entries recorded for one transaction.
    pub fn entries_for_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> DomainResult<Vec<LedgerEntry>> {
        self.store
            .entries_for_transaction(transaction_id)
            .map_err(map_store_err)
    }

    /// Single entry application. Caller must hold the account lock.
    fn apply_unlocked(
        &self,
        account_id: AccountId,
        transaction_id: TransactionId,
        entry_type: EntryType,
        amount: Money,
        reference: &str,
        description: &str,
    ) -> DomainResult<LedgerEntry> {
        amount.require_positive("entry amount")?;

        let mut account = self.account(account_id)?;
        let current = self.derived_balance(account_id)?;

        if entry_type == EntryType::Debit && !account.can_cover(current, amount) {
            return Err(DomainError::insufficient_funds(format!(
                "account {account_id}: debit {amount} exceeds balance {current} + overdraft {}",
                account.overdraft_limit
            )));
        }

        let new_balance = match entry_type {
            EntryType::Credit => current + amount,
            EntryType::Debit => current - amount,
        };

        let entry = LedgerEntry {
            id: EntryId::new(),
            account_id,
            transaction_id,
            entry_type,
            amount,
            running_balance: new_balance,
            reference: reference.to_string(),
            description: description.to_string(),
            created_at: Utc::now(),
        };

        self.store.append_entry(entry.clone()).map_err(map_store_err)?;

        let expected_version = account.version;
        account.balance = new_balance;
        self.store
            .update_account(&account, expected_version)
            .map_err(map_store_err)?;
        self.cache.invalidate(account_id);

        debug!(
            %account_id,
            %transaction_id,
            ?entry_type,
            %amount,
            %new_balance,
            "ledger entry applied"
        );

        Ok(entry)
    }
}

fn map_store_err(err: LedgerStoreError) -> DomainError {
    match err {
        LedgerStoreError::AccountNotFound(id) => {
            DomainError::not_found(format!("account {id}"))
        }
        LedgerStoreError::AccountAlreadyExists(id) => {
            DomainError::invalid_state(format!("account {id} already exists"))
        }
        LedgerStoreError::VersionConflict { .. } | LedgerStoreError::Storage(_) => {
            DomainError::internal(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountStatus;
    use crate::store::InMemoryLedgerStore;
    use corebank_core::{Currency, UserId};
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn ledger() -> Ledger<InMemoryLedgerStore> {
        Ledger::new(InMemoryLedgerStore::new())
    }

    fn open_account(
        ledger: &Ledger<InMemoryLedgerStore>,
        balance: Decimal,
        overdraft: Decimal,
    ) -> AccountId {
        let account = Account::open(UserId::new(), Currency::Usd, Money::new(overdraft));
        let id = account.id;
        ledger.register_account(account).unwrap();
        if balance > Decimal::ZERO {
            ledger
                .credit(id, TransactionId::new(), Money::new(balance), "SEED", "opening")
                .unwrap();
        }
        id
    }

    #[test]
    fn credit_then_debit_projects_balance() {
        let ledger = ledger();
        let account = open_account(&ledger, dec!(1000), dec!(0));

        ledger
            .debit(account, TransactionId::new(), Money::new(dec!(250)), "TXN-1", "withdrawal")
            .unwrap();

        assert_eq!(ledger.balance(account).unwrap(), Money::new(dec!(750)));
        assert_eq!(
            ledger.account(account).unwrap().balance,
            Money::new(dec!(750))
        );
    }

    #[test]
    fn overdraw_fails_and_leaves_balance_unchanged() {
        let ledger = ledger();
        let account = open_account(&ledger, dec!(1000), dec!(0));

        let err = ledger
            .debit(account, TransactionId::new(), Money::new(dec!(1500)), "TXN-1", "withdrawal")
            .unwrap_err();

        assert_eq!(err.code(), "INSUFFICIENT_FUNDS");
        assert_eq!(ledger.balance(account).unwrap(), Money::new(dec!(1000)));
    }

    #[test]
    fn overdraft_limit_extends_debit_headroom() {
        let ledger = ledger();
        let account = open_account(&ledger, dec!(100), dec!(50));

        ledger
            .debit(account, TransactionId::new(), Money::new(dec!(150)), "TXN-1", "withdrawal")
            .unwrap();

        assert_eq!(ledger.balance(account).unwrap(), Money::new(dec!(-50)));
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        let ledger = ledger();
        let account = open_account(&ledger, dec!(10), dec!(0));

        let err = ledger
            .credit(account, TransactionId::new(), Money::ZERO, "TXN-1", "noop")
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION");

        let err = ledger
            .debit(account, TransactionId::new(), Money::new(dec!(-5)), "TXN-2", "noop")
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION");
    }

    #[test]
    fn transfer_writes_paired_entries() {
        let ledger = ledger();
        let a = open_account(&ledger, dec!(1000), dec!(0));
        let b = open_account(&ledger, dec!(500), dec!(0));
        let tx_id = TransactionId::new();

        let outcome = ledger
            .execute_transfer(a, b, tx_id, Money::new(dec!(200)), "TXN-1")
            .unwrap();

        assert_eq!(ledger.balance(a).unwrap(), Money::new(dec!(800)));
        assert_eq!(ledger.balance(b).unwrap(), Money::new(dec!(700)));
        assert_eq!(outcome.debit_entry.transaction_id, tx_id);
        assert_eq!(outcome.credit_entry.transaction_id, tx_id);
        assert_eq!(ledger.entries_for_transaction(tx_id).unwrap().len(), 2);
    }

    #[test]
    fn transfer_to_missing_account_reports_applied_debit() {
        let ledger = ledger();
        let a = open_account(&ledger, dec!(1000), dec!(0));
        let ghost = AccountId::new();

        let err = ledger
            .execute_transfer(a, ghost, TransactionId::new(), Money::new(dec!(100)), "TXN-1")
            .unwrap_err();

        assert!(err.debit_applied);
        assert_eq!(err.cause.code(), "NOT_FOUND");
        // The debit leg really did land; the caller owes the compensation.
        assert_eq!(ledger.balance(a).unwrap(), Money::new(dec!(900)));
    }

    #[test]
    fn insufficient_transfer_applies_nothing() {
        let ledger = ledger();
        let a = open_account(&ledger, dec!(100), dec!(0));
        let b = open_account(&ledger, dec!(0), dec!(0));

        let err = ledger
            .execute_transfer(a, b, TransactionId::new(), Money::new(dec!(500)), "TXN-1")
            .unwrap_err();

        assert!(!err.debit_applied);
        assert_eq!(ledger.balance(a).unwrap(), Money::new(dec!(100)));
        assert_eq!(ledger.balance(b).unwrap(), Money::ZERO);
    }

    #[test]
    fn reconcile_detects_projection_drift() {
        let ledger = ledger();
        let account_id = open_account(&ledger, dec!(300), dec!(0));

        let report = ledger.reconcile_balance(account_id).unwrap();
        assert!(report.consistent);

        // Corrupt the projection behind the service's back.
        let mut account = ledger.account(account_id).unwrap();
        let version = account.version;
        account.balance = Money::new(dec!(999));
        ledger.store.update_account(&account, version).unwrap();

        let report = ledger.reconcile_balance(account_id).unwrap();
        assert!(!report.consistent);
        assert_eq!(report.ledger_balance, Money::new(dec!(300)));
        assert_eq!(report.projected_balance, Money::new(dec!(999)));
        // Never auto-corrected.
        assert_eq!(
            ledger.account(account_id).unwrap().balance,
            Money::new(dec!(999))
        );
    }

    #[test]
    fn balance_as_of_replays_to_cutoff() {
        let ledger = ledger();
        let account = open_account(&ledger, dec!(100), dec!(0));

        let cutoff = Utc::now();
        ledger
            .credit(account, TransactionId::new(), Money::new(dec!(50)), "TXN-LATE", "late")
            .unwrap();

        assert_eq!(
            ledger.balance_as_of(account, cutoff).unwrap(),
            Money::new(dec!(100))
        );
        assert_eq!(ledger.balance(account).unwrap(), Money::new(dec!(150)));
    }

    #[test]
    fn balance_as_of_missing_account_is_not_found() {
        let ledger = ledger();
        let err = ledger.balance_as_of(AccountId::new(), Utc::now()).unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn frozen_status_does_not_affect_ledger_level_ops() {
        // Status gating is the orchestrator's job; the ledger still
        // applies entries so compensations work on frozen accounts.
        let ledger = ledger();
        let account_id = open_account(&ledger, dec!(100), dec!(0));

        let mut account = ledger.account(account_id).unwrap();
        let version = account.version;
        account.status = AccountStatus::Frozen;
        ledger.store.update_account(&account, version).unwrap();

        ledger
            .credit(account_id, TransactionId::new(), Money::new(dec!(10)), "TXN-C", "compensation")
            .unwrap();
        assert_eq!(ledger.balance(account_id).unwrap(), Money::new(dec!(110)));
    }

    #[test]
    fn concurrent_deposits_serialize_per_account() {
        let ledger = Arc::new(Ledger::new(InMemoryLedgerStore::new()));
        let account = Account::open(UserId::new(), Currency::Usd, Money::ZERO);
        let id = account.id;
        ledger.register_account(account).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        ledger
                            .credit(id, TransactionId::new(), Money::new(dec!(1)), "TXN-P", "p")
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(ledger.balance(id).unwrap(), Money::new(dec!(400)));
        let report = ledger.reconcile_balance(id).unwrap();
        assert!(report.consistent);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: after any sequence of deposits/withdrawals/transfers,
        /// every account's projection equals Σcredits − Σdebits, and the
        /// closed system conserves money (net of seeded deposits).
        #[test]
        fn projection_matches_entry_sums(
            ops in prop::collection::vec((0u8..3, 1i64..500), 1..40)
        ) {
            let ledger = ledger();
            let a = open_account(&ledger, dec!(10_000), dec!(0));
            let b = open_account(&ledger, dec!(10_000), dec!(0));

            for (kind, raw) in ops {
                let amount = Money::from(raw);
                match kind {
                    0 => { let _ = ledger.credit(a, TransactionId::new(), amount, "TXN-P", "d"); }
                    1 => { let _ = ledger.debit(b, TransactionId::new(), amount, "TXN-P", "w"); }
                    _ => { let _ = ledger.execute_transfer(a, b, TransactionId::new(), amount, "TXN-P"); }
                }
            }

            for account in [a, b] {
                let derived = ledger.derived_balance(account).unwrap();
                let projected = ledger.account(account).unwrap().balance;
                prop_assert_eq!(derived, projected);
            }
        }

        /// Property: a completed transfer's net effect across both
        /// accounts is zero.
        #[test]
        fn transfers_conserve_money(amounts in prop::collection::vec(1i64..1000, 1..20)) {
            let ledger = ledger();
            let a = open_account(&ledger, dec!(100_000), dec!(0));
            let b = open_account(&ledger, dec!(100_000), dec!(0));

            for raw in amounts {
                ledger
                    .execute_transfer(a, b, TransactionId::new(), Money::from(raw), "TXN-P")
                    .unwrap();
            }

            let total = ledger.balance(a).unwrap() + ledger.balance(b).unwrap();
            prop_assert_eq!(total, Money::new(dec!(200_000)));
        }
    }
}
