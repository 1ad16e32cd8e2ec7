//! The saga pipeline.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use corebank_core::{AccountId, DomainError, DomainResult, Money, TransactionId, UserId};
use corebank_events::EventPublisher;
use corebank_events::transaction::{
    TransactionBlocked, TransactionCompleted, TransactionEvent, TransactionReversed,
};
use corebank_fraud::{EvaluationContext, FraudEngine, FraudEvent, RecentActivity, RuleStore};
use corebank_holds::{Hold, HoldManager, HoldStore};
use corebank_idempotency::{CheckOutcome, IdempotencyGuard, IdempotencyStore, request_fingerprint};
use corebank_ledger::{Ledger, LedgerStore, TransferError};
use corebank_limits::{LimitEnforcer, LimitStore};

use crate::store::{TransactionStore, TransactionStoreError};
use crate::transaction::{
    SagaStep, Transaction, TransactionStatus, TransactionType, compensation_reference,
};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// A PROCESSING transaction with no checkpoint progress for this long
    /// is treated as crashed by the recovery sweep.
    pub checkpoint_deadline: Duration,
    /// How far back the fraud context looks for the user's history.
    pub fraud_history_window: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            checkpoint_deadline: Duration::minutes(5),
            fraud_history_window: Duration::hours(1),
        }
    }
}

/// One submission from the API layer.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub transaction_type: TransactionType,
    pub from_account_id: Option<AccountId>,
    pub to_account_id: Option<AccountId>,
    pub amount: Money,
    pub description: String,
    pub idempotency_key: Option<String>,
    pub initiated_by: UserId,
    /// ISO country code of the request origin, when known.
    pub location: Option<String>,
}

impl SubmitRequest {
    fn validate(&self) -> DomainResult<()> {
        self.amount.require_positive("transaction amount")?;

        match self.transaction_type {
            TransactionType::Deposit => {
                if self.to_account_id.is_none() {
                    return Err(DomainError::validation(
                        "deposit requires a destination account",
                    ));
                }
            }
            TransactionType::Withdrawal => {
                if self.from_account_id.is_none() {
                    return Err(DomainError::validation(
                        "withdrawal requires a source account",
                    ));
                }
            }
            TransactionType::Transfer => {
                let (Some(from), Some(to)) = (self.from_account_id, self.to_account_id) else {
                    return Err(DomainError::validation(
                        "transfer requires both source and destination accounts",
                    ));
                };
                if from == to {
                    return Err(DomainError::validation(
                        "transfer source and destination must differ",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Canonical payload hashed for idempotency. Key ordering is stable,
    /// so semantically identical requests fingerprint identically.
    pub fn fingerprint(&self) -> String {
        let payload = serde_json::json!({
            "type": self.transaction_type,
            "from": self.from_account_id,
            "to": self.to_account_id,
            "amount": self.amount,
            "description": self.description,
            "initiator": self.initiated_by,
        });
        request_fingerprint(&payload)
    }
}

/// What the API layer gets back. Serialized into the idempotency record
/// so a retry replays the exact same answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub transaction_id: TransactionId,
    pub reference: String,
    pub status: TransactionStatus,
    pub from_balance: Option<Money>,
    pub to_balance: Option<Money>,
    /// Set when this answer came from the idempotency record rather than
    /// a fresh execution.
    #[serde(default, skip_serializing)]
    pub replayed: bool,
}

/// Drives each submission through its saga and owns recovery of crashed
/// ones. Safe to share across threads; per-account serialization happens
/// inside the ledger.
pub struct Orchestrator<L, H, I, M, R, T, P>
where
    L: LedgerStore,
    H: HoldStore,
    I: IdempotencyStore,
    M: LimitStore,
    R: RuleStore,
    T: TransactionStore,
    P: EventPublisher<TransactionEvent>,
{
    ledger: Arc<Ledger<L>>,
    holds: Arc<HoldManager<H, L>>,
    guard: Arc<IdempotencyGuard<I>>,
    limits: Arc<LimitEnforcer<M>>,
    fraud: Arc<FraudEngine<R>>,
    transactions: T,
    events: P,
    config: OrchestratorConfig,
}

impl<L, H, I, M, R, T, P> Orchestrator<L, H, I, M, R, T, P>
where
    L: LedgerStore,
    H: HoldStore,
    I: IdempotencyStore,
    M: LimitStore,
    R: RuleStore,
    T: TransactionStore,
    P: EventPublisher<TransactionEvent>,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<Ledger<L>>,
        holds: Arc<HoldManager<H, L>>,
        guard: Arc<IdempotencyGuard<I>>,
        limits: Arc<LimitEnforcer<M>>,
        fraud: Arc<FraudEngine<R>>,
        transactions: T,
        events: P,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            ledger,
            holds,
            guard,
            limits,
            fraud,
            transactions,
            events,
            config,
        }
    }

    pub fn ledger(&self) -> &Ledger<L> {
        &self.ledger
    }

    /// Run one submission end to end.
    ///
    /// A duplicate idempotency key with a matching payload short-circuits
    /// to the recorded result without touching the ledger, limits, or
    /// fraud engine again.
    pub fn submit(&self, request: SubmitRequest) -> DomainResult<SubmitOutcome> {
        let now = Utc::now();
        request.validate()?;

        if let Some(key) = request.idempotency_key.clone() {
            match self.guard.check_or_create(&key, &request.fingerprint(), now)? {
                CheckOutcome::New => {}
                CheckOutcome::Reclaimed => {
                    // The crashed attempt may already have hit the ledger.
                    // Resolve whatever it left behind and replay that; only
                    // a key with no transaction row re-executes.
                    if let Some(outcome) = self.settle_reclaimed(&key)? {
                        return Ok(outcome);
                    }
                }
                CheckOutcome::Finished(record) => {
                    return replay(&key, record);
                }
                CheckOutcome::InFlight { lease_until } => {
                    return Err(DomainError::invalid_state(format!(
                        "request with key {key} is still executing; lease expires {lease_until}"
                    )));
                }
            }

            let result = self.run_saga(&request, now);
            match &result {
                Ok(outcome) => {
                    let recorded = serde_json::to_value(outcome)
                        .map_err(|e| DomainError::internal(e.to_string()))?;
                    self.guard.mark_completed(&key, &outcome.reference, recorded)?;
                }
                Err(_) => {
                    // Best effort: the saga error is what the caller needs.
                    if let Err(e) = self.guard.mark_failed(&key) {
                        warn!(key, error = %e, "could not mark idempotency record failed");
                    }
                }
            }
            result
        } else {
            self.run_saga(&request, now)
        }
    }

    /// Available balance for an account: balance minus active holds,
    /// floored at zero.
    pub fn available_balance(&self, account_id: AccountId) -> DomainResult<Money> {
        self.holds.available_balance(account_id)
    }

    pub fn active_holds(&self, account_id: AccountId) -> DomainResult<Vec<Hold>> {
        self.holds.active_holds(account_id)
    }

    pub fn transaction(&self, id: TransactionId) -> DomainResult<Transaction> {
        self.transactions
            .get(id)
            .map_err(map_store_err)?
            .ok_or_else(|| DomainError::not_found(format!("transaction {id}")))
    }

    fn run_saga(&self, request: &SubmitRequest, now: DateTime<Utc>) -> DomainResult<SubmitOutcome> {
        // Caps and velocity reject before any saga state exists.
        let limit_type = request.transaction_type.limit_type();
        self.limits
            .validate_transaction(request.initiated_by, request.amount, limit_type, now)?;
        self.limits.check_velocity(request.initiated_by, now)?;

        let mut txn = Transaction::new(
            request.transaction_type,
            request.from_account_id,
            request.to_account_id,
            request.amount,
            request.description.clone(),
            request.idempotency_key.clone(),
            request.initiated_by,
            now,
        );
        self.transactions
            .insert(txn.clone())
            .map_err(map_store_err)?;

        match self.execute_steps(&mut txn, request) {
            Ok(outcome) => {
                // The ledger has committed; a counter write failure must
                // not turn a completed transaction into an error.
                if let Err(e) = self.limits.consume_limits(
                    request.initiated_by,
                    request.amount,
                    limit_type,
                    Utc::now(),
                ) {
                    warn!(transaction_id = %txn.id, error = %e, "limit consumption failed");
                }
                if let Err(e) = self.limits.update_velocity(request.initiated_by, Utc::now()) {
                    warn!(transaction_id = %txn.id, error = %e, "velocity update failed");
                }
                self.publish(TransactionEvent::Completed(TransactionCompleted {
                    transaction_id: txn.id,
                    reference: txn.reference.clone(),
                    from_account_id: txn.from_account_id,
                    to_account_id: txn.to_account_id,
                    amount: txn.amount,
                    occurred_at: Utc::now(),
                }));
                info!(
                    transaction_id = %txn.id,
                    reference = %txn.reference,
                    "transaction completed"
                );
                Ok(outcome)
            }
            Err(err) => Err(err),
        }
    }

    /// Forward steps plus in-line compensation. On return the transaction
    /// record is in a terminal state.
    fn execute_steps(
        &self,
        txn: &mut Transaction,
        request: &SubmitRequest,
    ) -> DomainResult<SubmitOutcome> {
        txn.mark_processing(Utc::now());
        txn.checkpoint(SagaStep::Validated, Utc::now());
        self.transactions.update(txn).map_err(map_store_err)?;

        let gate = self
            .check_accounts(txn)
            .and_then(|()| self.fraud_gate(txn, request));
        if let Err(err) = gate {
            return Err(self.fail(txn, err));
        }

        txn.checkpoint(SagaStep::FraudCleared, Utc::now());
        self.transactions.update(txn).map_err(map_store_err)?;

        match txn.transaction_type {
            TransactionType::Deposit => {
                let to = txn.to_account_id.expect("validated");
                txn.checkpoint(SagaStep::Crediting, Utc::now());
                self.transactions.update(txn).map_err(map_store_err)?;

                let credited =
                    self.ledger
                        .credit(to, txn.id, txn.amount, &txn.reference, &txn.description);
                let entry = credited.map_err(|err| self.fail(txn, err))?;
                txn.to_balance_after = Some(entry.running_balance);
            }
            TransactionType::Withdrawal => {
                let from = txn.from_account_id.expect("validated");
                txn.checkpoint(SagaStep::Debiting, Utc::now());
                self.transactions.update(txn).map_err(map_store_err)?;

                let debited =
                    self.ledger
                        .debit(from, txn.id, txn.amount, &txn.reference, &txn.description);
                let entry = debited.map_err(|err| self.fail(txn, err))?;
                txn.from_balance_after = Some(entry.running_balance);
            }
            TransactionType::Transfer => {
                let from = txn.from_account_id.expect("validated");
                let to = txn.to_account_id.expect("validated");
                txn.checkpoint(SagaStep::Debiting, Utc::now());
                self.transactions.update(txn).map_err(map_store_err)?;

                let transfer =
                    self.ledger
                        .execute_transfer(from, to, txn.id, txn.amount, &txn.reference);
                match transfer {
                    Ok(outcome) => {
                        txn.from_balance_after = Some(outcome.debit_entry.running_balance);
                        txn.to_balance_after = Some(outcome.credit_entry.running_balance);
                    }
                    Err(TransferError {
                        cause,
                        debit_applied: false,
                    }) => return Err(self.fail(txn, cause)),
                    Err(TransferError {
                        cause,
                        debit_applied: true,
                    }) => return Err(self.compensate_debit(txn, from, cause)),
                }
            }
        }

        txn.mark_completed(Utc::now());
        self.transactions.update(txn).map_err(map_store_err)?;

        Ok(SubmitOutcome {
            transaction_id: txn.id,
            reference: txn.reference.clone(),
            status: txn.status,
            from_balance: txn.from_balance_after,
            to_balance: txn.to_balance_after,
            replayed: false,
        })
    }

    /// Active-status and currency checks for the involved accounts.
    fn check_accounts(&self, txn: &Transaction) -> DomainResult<()> {
        let from = txn
            .from_account_id
            .map(|id| self.ledger.account(id))
            .transpose()?;
        let to = txn
            .to_account_id
            .map(|id| self.ledger.account(id))
            .transpose()?;

        for account in [&from, &to].into_iter().flatten() {
            if !account.is_active() {
                return Err(DomainError::validation(format!(
                    "account {} is not active",
                    account.id
                )));
            }
        }

        if let (Some(from), Some(to)) = (&from, &to) {
            if from.currency != to.currency {
                return Err(DomainError::validation(format!(
                    "currency mismatch: {:?} vs {:?}",
                    from.currency, to.currency
                )));
            }
        }
        Ok(())
    }

    /// Evaluate the fraud rules against the source account. Deposits skip
    /// the gate; there is no source to screen.
    fn fraud_gate(&self, txn: &Transaction, request: &SubmitRequest) -> DomainResult<()> {
        if !txn.transaction_type.fraud_gated() {
            return Ok(());
        }
        let source = txn.from_account_id.expect("validated");

        let cutoff = txn.created_at - self.config.fraud_history_window;
        let recent = self
            .transactions
            .completed_for_user_since(txn.initiated_by, cutoff)
            .map_err(map_store_err)?
            .into_iter()
            .map(|t| RecentActivity {
                amount: t.amount,
                occurred_at: t.created_at,
            })
            .collect();

        let report = self.fraud.evaluate(&EvaluationContext {
            account_id: source,
            user_id: txn.initiated_by,
            amount: txn.amount,
            location: request.location.clone(),
            occurred_at: txn.created_at,
            recent,
        })?;

        let trace = FraudEvent::from_report(txn.id, &report, Utc::now());
        debug!(?trace, "fraud evaluation recorded");

        if report.should_block {
            self.publish(TransactionEvent::Blocked(TransactionBlocked {
                transaction_id: txn.id,
                reference: txn.reference.clone(),
                risk_score: report.risk_score,
                occurred_at: Utc::now(),
            }));
            return Err(DomainError::fraud_blocked(format!(
                "risk score {} ({:?})",
                report.risk_score, report.recommendation
            )));
        }
        Ok(())
    }

    /// The debit leg landed but the credit leg did not: issue the inverse
    /// credit and mark the transaction REVERSED. A compensation that
    /// itself fails is surfaced as COMPENSATION_FAILURE and left for
    /// manual reconciliation, never retried here.
    fn compensate_debit(
        &self,
        txn: &mut Transaction,
        from: AccountId,
        cause: DomainError,
    ) -> DomainError {
        txn.checkpoint(SagaStep::Compensating, Utc::now());
        if let Err(e) = self.transactions.update(txn) {
            warn!(transaction_id = %txn.id, error = %e, "checkpoint write failed during compensation");
        }

        let comp_ref = compensation_reference(&txn.reference);
        match self.ledger.credit(
            from,
            txn.id,
            txn.amount,
            &comp_ref,
            "compensating credit for failed transfer",
        ) {
            Ok(_) => {
                txn.mark_reversed(cause.to_string(), Utc::now());
                self.persist_terminal(txn);
                self.publish(TransactionEvent::Reversed(TransactionReversed {
                    transaction_id: txn.id,
                    reference: txn.reference.clone(),
                    failure_reason: cause.to_string(),
                    occurred_at: Utc::now(),
                }));
                warn!(
                    transaction_id = %txn.id,
                    reference = %txn.reference,
                    cause = %cause,
                    "transfer reversed after failed credit leg"
                );
                cause
            }
            Err(comp_err) => {
                let failure = DomainError::compensation_failure(format!(
                    "compensating credit for {} failed: {comp_err}; original cause: {cause}",
                    txn.reference
                ));
                txn.mark_failed(failure.to_string(), Utc::now());
                self.persist_terminal(txn);
                error!(
                    transaction_id = %txn.id,
                    reference = %txn.reference,
                    error = %comp_err,
                    "compensation failed; manual reconciliation required"
                );
                failure
            }
        }
    }

    /// Recovery pass: transactions stuck in PROCESSING past the deadline
    /// are resolved from their ledger footprint, exactly like an in-line
    /// step failure. Idempotent; a rerun finds nothing left.
    pub fn recover_stalled(&self, now: DateTime<Utc>) -> DomainResult<u64> {
        let cutoff = now - self.config.checkpoint_deadline;
        let stalled = self
            .transactions
            .stalled_processing(cutoff)
            .map_err(map_store_err)?;

        let mut recovered = 0;
        for mut txn in stalled {
            warn!(
                transaction_id = %txn.id,
                reference = %txn.reference,
                last_progress = %txn.last_progress_at(),
                "recovering stalled transaction"
            );
            self.recover_one(&mut txn)?;
            recovered += 1;
        }
        Ok(recovered)
    }

    /// A reclaimed key whose earlier attempt inserted a transaction must
    /// not re-execute: the crashed attempt's ledger mutation may have
    /// committed. Resolve the transaction from its ledger footprint and
    /// answer from that, so one key never yields two committed results.
    fn settle_reclaimed(&self, key: &str) -> DomainResult<Option<SubmitOutcome>> {
        let Some(mut txn) = self
            .transactions
            .find_by_idempotency_key(key)
            .map_err(map_store_err)?
        else {
            return Ok(None);
        };

        if txn.status.is_terminal() {
            // Finished at the store but the record was never closed out.
            self.finalize_idempotency(&txn, txn.status == TransactionStatus::Completed);
        } else {
            warn!(
                transaction_id = %txn.id,
                key,
                "resolving crashed attempt found under reclaimed key"
            );
            self.recover_one(&mut txn)?;
        }

        if txn.status == TransactionStatus::Completed {
            Ok(Some(SubmitOutcome {
                transaction_id: txn.id,
                reference: txn.reference.clone(),
                status: txn.status,
                from_balance: txn.from_balance_after,
                to_balance: txn.to_balance_after,
                replayed: true,
            }))
        } else {
            Err(DomainError::invalid_state(format!(
                "a previous attempt with idempotency key {key} failed; submit with a new key"
            )))
        }
    }

    fn recover_one(&self, txn: &mut Transaction) -> DomainResult<()> {
        let entries = self.ledger.entries_for_transaction(txn.id)?;
        let has_forward_debit = entries
            .iter()
            .any(|e| e.reference == txn.reference && Some(e.account_id) == txn.from_account_id);
        let has_forward_credit = entries
            .iter()
            .any(|e| e.reference == txn.reference && Some(e.account_id) == txn.to_account_id);

        let finished = match txn.transaction_type {
            TransactionType::Deposit => has_forward_credit,
            TransactionType::Withdrawal => has_forward_debit,
            TransactionType::Transfer => has_forward_debit && has_forward_credit,
        };

        if finished {
            txn.mark_completed(Utc::now());
            self.transactions.update(txn).map_err(map_store_err)?;
            self.finalize_idempotency(txn, true);
            self.publish(TransactionEvent::Completed(TransactionCompleted {
                transaction_id: txn.id,
                reference: txn.reference.clone(),
                from_account_id: txn.from_account_id,
                to_account_id: txn.to_account_id,
                amount: txn.amount,
                occurred_at: Utc::now(),
            }));
            return Ok(());
        }

        if txn.transaction_type == TransactionType::Transfer && has_forward_debit {
            let from = txn.from_account_id.expect("transfer has a source");
            let cause = DomainError::internal("orchestration crashed between transfer legs");
            let _ = self.compensate_debit(txn, from, cause);
            self.finalize_idempotency(txn, false);
            return Ok(());
        }

        // Crashed before any ledger mutation.
        txn.mark_failed("orchestration crashed before any ledger mutation", Utc::now());
        self.transactions.update(txn).map_err(map_store_err)?;
        self.finalize_idempotency(txn, false);
        Ok(())
    }

    /// Mark a failure on the transaction record and hand the error back.
    fn fail(&self, txn: &mut Transaction, err: DomainError) -> DomainError {
        txn.mark_failed(err.to_string(), Utc::now());
        self.persist_terminal(txn);
        debug!(
            transaction_id = %txn.id,
            code = err.code(),
            reason = %err,
            "transaction failed"
        );
        err
    }

    fn persist_terminal(&self, txn: &Transaction) {
        if let Err(e) = self.transactions.update(txn) {
            error!(transaction_id = %txn.id, error = %e, "failed to persist terminal transaction state");
        }
    }

    /// Close out the idempotency record of a recovered transaction so a
    /// client retry replays the recovered outcome instead of re-executing.
    fn finalize_idempotency(&self, txn: &Transaction, completed: bool) {
        let Some(key) = &txn.idempotency_key else {
            return;
        };
        let result = if completed {
            serde_json::to_value(SubmitOutcome {
                transaction_id: txn.id,
                reference: txn.reference.clone(),
                status: txn.status,
                from_balance: txn.from_balance_after,
                to_balance: txn.to_balance_after,
                replayed: false,
            })
            .ok()
        } else {
            None
        };

        let outcome = match result {
            Some(value) => self.guard.mark_completed(key, &txn.reference, value),
            None => self.guard.mark_failed(key),
        };
        if let Err(e) = outcome {
            warn!(key, error = %e, "could not finalize idempotency record during recovery");
        }
    }

    fn publish(&self, event: TransactionEvent) {
        // Events describe already-committed state; a failed publish is
        // logged and dropped, not allowed to fail the transaction.
        if let Err(e) = self.events.publish(event) {
            warn!(error = ?e, "event publish failed");
        }
    }
}

fn replay(key: &str, record: corebank_idempotency::IdempotencyRecord) -> DomainResult<SubmitOutcome> {
    match record.result {
        Some(value) => {
            let mut outcome: SubmitOutcome = serde_json::from_value(value)
                .map_err(|e| DomainError::internal(format!("corrupt idempotency record: {e}")))?;
            outcome.replayed = true;
            debug!(key, reference = %outcome.reference, "replayed idempotent result");
            Ok(outcome)
        }
        None => Err(DomainError::invalid_state(format!(
            "a previous attempt with idempotency key {key} failed; submit with a new key"
        ))),
    }
}

fn map_store_err(err: TransactionStoreError) -> DomainError {
    match err {
        TransactionStoreError::NotFound(id) => DomainError::not_found(format!("transaction {id}")),
        TransactionStoreError::AlreadyExists(id) => {
            DomainError::invalid_state(format!("transaction {id} already exists"))
        }
        TransactionStoreError::Storage(msg) => DomainError::internal(msg),
    }
}
