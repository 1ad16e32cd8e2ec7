//! `corebank-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by the
//! transaction-processing pipeline (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod money;

pub use error::{DomainError, DomainResult};
pub use id::{AccountId, EntryId, HoldId, RuleId, TransactionId, UserId};
pub use money::{Currency, Money};
