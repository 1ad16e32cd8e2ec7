//! `corebank-idempotency`: retry deduplication.
//!
//! Every submitted money movement carries a caller-supplied idempotency
//! key. The guard pins each key to a fingerprint of the request payload:
//! retries with the same payload short-circuit to the recorded result,
//! retries with a different payload are conflicts, and a PENDING record
//! left behind by a crashed attempt is reclaimed once its lease expires.

pub mod fingerprint;
pub mod guard;
pub mod record;
pub mod store;

pub use fingerprint::request_fingerprint;
pub use guard::{CheckOutcome, GuardConfig, IdempotencyGuard};
pub use record::{IdempotencyRecord, IdempotencyStatus};
pub use store::{IdempotencyStore, IdempotencyStoreError, InMemoryIdempotencyStore};
