//! `corebank-orchestrator`: the transaction saga.
//!
//! Every money movement runs the same pipeline: idempotency guard, limit
//! and velocity checks, fraud gate, then the ledger steps, each preceded
//! by a persisted checkpoint. A step failure after a ledger mutation
//! triggers the inverse operation and marks the transaction REVERSED;
//! nothing is ever silently retried.

pub mod orchestrator;
pub mod store;
pub mod sweeps;
pub mod transaction;

pub use orchestrator::{Orchestrator, OrchestratorConfig, SubmitOutcome, SubmitRequest};
pub use store::{InMemoryTransactionStore, TransactionStore, TransactionStoreError};
pub use sweeps::{HoldExpirySweep, IdempotencyCleanupSweep, SagaRecoverySweep};
pub use transaction::{Checkpoint, SagaStep, Transaction, TransactionStatus, TransactionType};
