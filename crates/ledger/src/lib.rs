//! `corebank-ledger`: append-only double-entry ledger.
//!
//! The ledger is the durability boundary for balances: every credit and
//! debit is an immutable [`LedgerEntry`], and an account's balance is the
//! projection `Σ credits − Σ debits` over its entries. The projected
//! `Account.balance` is a derived convenience, never trusted over the
//! entries themselves (see [`Ledger::reconcile_balance`]).

pub mod account;
pub mod cache;
pub mod entry;
pub mod ledger;
pub mod locks;
pub mod store;

pub use account::{Account, AccountStatus};
pub use cache::BalanceCache;
pub use entry::{EntryType, LedgerEntry};
pub use ledger::{Ledger, ReconciliationReport, TransferError, TransferOutcome};
pub use locks::AccountLocks;
pub use store::{InMemoryLedgerStore, LedgerStore, LedgerStoreError};
