//! `corebank-limits`: transaction caps and velocity enforcement.
//!
//! Caps are checked per-transaction, then daily, then monthly, with lazy
//! counter resets when a period rolls over. Velocity tracks a rolling
//! transaction count per user; tripping it blocks the user for a fixed
//! cooldown. Consumption happens exactly once per transaction, tied to
//! the COMPLETED transition; a rejected or reversed transaction never
//! consumes headroom.

pub mod enforcer;
pub mod store;
pub mod types;

pub use enforcer::{EnforcerConfig, LimitEnforcer};
pub use store::{InMemoryLimitStore, LimitStore, LimitStoreError};
pub use types::{LimitType, TransactionLimit, VelocityCheck};
