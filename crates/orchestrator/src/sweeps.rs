//! Scheduled maintenance wired into the sweep scheduler.
//!
//! Hold expiry runs hourly, idempotency cleanup every six hours, saga
//! recovery every minute. All three select work by current state, so
//! overlapping or repeated runs are harmless.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use corebank_events::EventPublisher;
use corebank_events::transaction::TransactionEvent;
use corebank_fraud::RuleStore;
use corebank_holds::{HoldManager, HoldStore};
use corebank_idempotency::{IdempotencyGuard, IdempotencyStore};
use corebank_ledger::LedgerStore;
use corebank_limits::LimitStore;
use corebank_scheduler::Sweep;

use crate::orchestrator::Orchestrator;
use crate::store::TransactionStore;

/// Transitions ACTIVE holds past their expiry to EXPIRED.
pub struct HoldExpirySweep<H: HoldStore, L: LedgerStore> {
    holds: Arc<HoldManager<H, L>>,
    interval: Duration,
}

impl<H: HoldStore, L: LedgerStore> HoldExpirySweep<H, L> {
    pub fn new(holds: Arc<HoldManager<H, L>>) -> Self {
        Self {
            holds,
            interval: Duration::from_secs(60 * 60),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

impl<H: HoldStore, L: LedgerStore> Sweep for HoldExpirySweep<H, L> {
    fn name(&self) -> &str {
        "hold-expiry"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn run(&self, now: DateTime<Utc>) -> Result<u64, String> {
        self.holds
            .expire_due(now)
            .map(|n| n as u64)
            .map_err(|e| e.to_string())
    }
}

/// Purges idempotency records past their TTL.
pub struct IdempotencyCleanupSweep<I: IdempotencyStore> {
    guard: Arc<IdempotencyGuard<I>>,
    interval: Duration,
}

impl<I: IdempotencyStore> IdempotencyCleanupSweep<I> {
    pub fn new(guard: Arc<IdempotencyGuard<I>>) -> Self {
        Self {
            guard,
            interval: Duration::from_secs(6 * 60 * 60),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

impl<I: IdempotencyStore> Sweep for IdempotencyCleanupSweep<I> {
    fn name(&self) -> &str {
        "idempotency-cleanup"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn run(&self, now: DateTime<Utc>) -> Result<u64, String> {
        self.guard
            .purge_expired(now)
            .map(|n| n as u64)
            .map_err(|e| e.to_string())
    }
}

/// Resolves PROCESSING transactions that stopped making checkpoint
/// progress, compensating or completing them from their ledger footprint.
pub struct SagaRecoverySweep<L, H, I, M, R, T, P>
where
    L: LedgerStore,
    H: HoldStore,
    I: IdempotencyStore,
    M: LimitStore,
    R: RuleStore,
    T: TransactionStore,
    P: EventPublisher<TransactionEvent>,
{
    orchestrator: Arc<Orchestrator<L, H, I, M, R, T, P>>,
    interval: Duration,
}

impl<L, H, I, M, R, T, P> SagaRecoverySweep<L, H, I, M, R, T, P>
where
    L: LedgerStore,
    H: HoldStore,
    I: IdempotencyStore,
    M: LimitStore,
    R: RuleStore,
    T: TransactionStore,
    P: EventPublisher<TransactionEvent>,
{
    pub fn new(orchestrator: Arc<Orchestrator<L, H, I, M, R, T, P>>) -> Self {
        Self {
            orchestrator,
            interval: Duration::from_secs(60),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

impl<L, H, I, M, R, T, P> Sweep for SagaRecoverySweep<L, H, I, M, R, T, P>
where
    L: LedgerStore,
    H: HoldStore,
    I: IdempotencyStore,
    M: LimitStore,
    R: RuleStore,
    T: TransactionStore,
    P: EventPublisher<TransactionEvent>,
{
    fn name(&self) -> &str {
        "saga-recovery"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn run(&self, now: DateTime<Utc>) -> Result<u64, String> {
        self.orchestrator
            .recover_stalled(now)
            .map_err(|e| e.to_string())
    }
}
