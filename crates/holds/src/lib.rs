//! `corebank-holds`: temporary reservations against account balances.
//!
//! A hold reduces the *available* balance without touching the ledger.
//! Active holds end one of three ways: released (funds freed), captured
//! (the underlying debit happened elsewhere; the hold just acknowledges
//! it), or expired by the scheduled sweep.

pub mod hold;
pub mod manager;
pub mod store;

pub use hold::{Hold, HoldStatus, HoldType};
pub use manager::HoldManager;
pub use store::{HoldStore, HoldStoreError, InMemoryHoldStore};
