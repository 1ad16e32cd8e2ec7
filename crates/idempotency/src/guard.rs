//! The idempotency guard.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use corebank_core::{DomainError, DomainResult};

use crate::record::{IdempotencyRecord, IdempotencyStatus};
use crate::store::{IdempotencyStore, IdempotencyStoreError};

/// Guard configuration.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// How long records are kept before the cleanup sweep purges them.
    pub record_ttl: Duration,
    /// How long a PENDING record shields its attempt. A retry past this
    /// lease reclaims the record and re-executes.
    pub pending_lease: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            record_ttl: Duration::hours(24),
            pending_lease: Duration::minutes(5),
        }
    }
}

/// Outcome of consulting the guard before executing a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// No usable record existed; a PENDING record now covers this attempt.
    /// The caller must execute and finalize with `mark_completed` or
    /// `mark_failed`.
    New,
    /// The key was reclaimed from a crashed attempt whose lease expired.
    /// The caller must first settle anything the crashed attempt already
    /// committed and replay that result; only a key with no committed
    /// work re-executes under the refreshed PENDING record.
    Reclaimed,
    /// A prior attempt finished (COMPLETED or FAILED); short-circuit to
    /// its recorded result without re-executing anything.
    Finished(IdempotencyRecord),
    /// A prior attempt is still running inside its lease; back off and
    /// retry later.
    InFlight { lease_until: DateTime<Utc> },
}

/// Deduplicates retried requests by key + request fingerprint.
pub struct IdempotencyGuard<S: IdempotencyStore> {
    store: S,
    config: GuardConfig,
}

impl<S: IdempotencyStore> IdempotencyGuard<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, GuardConfig::default())
    }

    pub fn with_config(store: S, config: GuardConfig) -> Self {
        Self { store, config }
    }

    /// Consult the guard for `key`.
    ///
    /// - absent key → create PENDING, return `New`
    /// - present, matching fingerprint → `Finished`/`InFlight`/`Reclaimed`
    ///   depending on record state
    /// - present, differing fingerprint → IDEMPOTENCY_CONFLICT
    ///
    /// A record past its `expires_at` is treated as absent even if the
    /// cleanup sweep has not removed it yet.
    pub fn check_or_create(
        &self,
        key: &str,
        fingerprint: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<CheckOutcome> {
        let existing = self.store.get(key).map_err(map_store_err)?;

        let existing = match existing {
            Some(record) if !record.is_expired_at(now) => record,
            Some(stale) => {
                // Expired but not yet purged: start fresh.
                let record = self.fresh_record(key, fingerprint, now);
                self.store.update(&record).map_err(map_store_err)?;
                debug!(key, "expired idempotency record replaced");
                let _ = stale;
                return Ok(CheckOutcome::New);
            }
            None => {
                let record = self.fresh_record(key, fingerprint, now);
                self.store.insert(record).map_err(|e| match e {
                    // Lost a race to a concurrent first attempt.
                    IdempotencyStoreError::AlreadyExists(_) => DomainError::idempotency_conflict(
                        format!("key {key} was claimed concurrently"),
                    ),
                    other => map_store_err(other),
                })?;
                return Ok(CheckOutcome::New);
            }
        };

        if existing.fingerprint != fingerprint {
            return Err(DomainError::idempotency_conflict(format!(
                "key {key} was already used with a different request payload"
            )));
        }

        if existing.is_terminal() {
            return Ok(CheckOutcome::Finished(existing));
        }

        if !existing.lease_expired_at(now) {
            return Ok(CheckOutcome::InFlight {
                lease_until: existing.lease_until,
            });
        }

        // PENDING past its lease: the previous attempt is presumed dead.
        let mut reclaimed = existing;
        reclaimed.lease_until = now + self.config.pending_lease;
        reclaimed.updated_at = now;
        self.store.update(&reclaimed).map_err(map_store_err)?;
        warn!(key, "reclaimed stuck PENDING idempotency record");
        Ok(CheckOutcome::Reclaimed)
    }

    /// Finalize the record after a committed result.
    pub fn mark_completed(
        &self,
        key: &str,
        result_ref: &str,
        result: serde_json::Value,
    ) -> DomainResult<()> {
        self.finalize(key, IdempotencyStatus::Completed, Some(result_ref), Some(result))
    }

    /// Finalize the record after a definitive failure.
    pub fn mark_failed(&self, key: &str) -> DomainResult<()> {
        self.finalize(key, IdempotencyStatus::Failed, None, None)
    }

    /// Scheduled cleanup: purge records past their TTL. Safe to re-run.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> DomainResult<usize> {
        let purged = self
            .store
            .delete_expired_before(now)
            .map_err(map_store_err)?;
        if purged > 0 {
            debug!(count = purged, "purged expired idempotency records");
        }
        Ok(purged)
    }

    fn finalize(
        &self,
        key: &str,
        status: IdempotencyStatus,
        result_ref: Option<&str>,
        result: Option<serde_json::Value>,
    ) -> DomainResult<()> {
        let mut record = self
            .store
            .get(key)
            .map_err(map_store_err)?
            .ok_or_else(|| DomainError::not_found(format!("idempotency record {key}")))?;

        record.status = status;
        record.result_ref = result_ref.map(str::to_string);
        record.result = result;
        record.updated_at = Utc::now();
        self.store.update(&record).map_err(map_store_err)
    }

    fn fresh_record(&self, key: &str, fingerprint: &str, now: DateTime<Utc>) -> IdempotencyRecord {
        IdempotencyRecord {
            key: key.to_string(),
            fingerprint: fingerprint.to_string(),
            status: IdempotencyStatus::Pending,
            result_ref: None,
            result: None,
            expires_at: now + self.config.record_ttl,
            lease_until: now + self.config.pending_lease,
            created_at: now,
            updated_at: now,
        }
    }
}

fn map_store_err(err: IdempotencyStoreError) -> DomainError {
    match err {
        IdempotencyStoreError::NotFound(key) => {
            DomainError::not_found(format!("idempotency record {key}"))
        }
        IdempotencyStoreError::AlreadyExists(key) => {
            DomainError::invalid_state(format!("idempotency record {key} already exists"))
        }
        IdempotencyStoreError::Storage(msg) => DomainError::internal(msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryIdempotencyStore;
    use serde_json::json;

    fn guard() -> IdempotencyGuard<InMemoryIdempotencyStore> {
        IdempotencyGuard::new(InMemoryIdempotencyStore::new())
    }

    #[test]
    fn first_call_creates_pending() {
        let guard = guard();
        let now = Utc::now();

        let outcome = guard.check_or_create("K1", "fp", now).unwrap();
        assert_eq!(outcome, CheckOutcome::New);
    }

    #[test]
    fn matching_retry_returns_recorded_result() {
        let guard = guard();
        let now = Utc::now();

        guard.check_or_create("K1", "fp", now).unwrap();
        guard
            .mark_completed("K1", "TXN-1", json!({"status": "COMPLETED"}))
            .unwrap();

        match guard.check_or_create("K1", "fp", now).unwrap() {
            CheckOutcome::Finished(record) => {
                assert_eq!(record.result_ref.as_deref(), Some("TXN-1"));
                assert_eq!(record.status, IdempotencyStatus::Completed);
            }
            other => panic!("expected Finished, got {other:?}"),
        }
    }

    #[test]
    fn differing_payload_is_a_conflict() {
        let guard = guard();
        let now = Utc::now();

        guard.check_or_create("K1", "fp-a", now).unwrap();
        let err = guard.check_or_create("K1", "fp-b", now).unwrap_err();
        assert_eq!(err.code(), "IDEMPOTENCY_CONFLICT");
    }

    #[test]
    fn pending_within_lease_is_in_flight() {
        let guard = guard();
        let now = Utc::now();

        guard.check_or_create("K1", "fp", now).unwrap();
        match guard.check_or_create("K1", "fp", now).unwrap() {
            CheckOutcome::InFlight { lease_until } => assert!(lease_until > now),
            other => panic!("expected InFlight, got {other:?}"),
        }
    }

    #[test]
    fn stuck_pending_is_reclaimed_after_lease() {
        let guard = guard();
        let now = Utc::now();

        guard.check_or_create("K1", "fp", now).unwrap();

        let later = now + Duration::minutes(6);
        let outcome = guard.check_or_create("K1", "fp", later).unwrap();
        assert_eq!(outcome, CheckOutcome::Reclaimed);

        // The reclaimed record holds a fresh lease.
        match guard.check_or_create("K1", "fp", later).unwrap() {
            CheckOutcome::InFlight { .. } => {}
            other => panic!("expected InFlight, got {other:?}"),
        }
    }

    #[test]
    fn failed_records_short_circuit_too() {
        let guard = guard();
        let now = Utc::now();

        guard.check_or_create("K1", "fp", now).unwrap();
        guard.mark_failed("K1").unwrap();

        match guard.check_or_create("K1", "fp", now).unwrap() {
            CheckOutcome::Finished(record) => {
                assert_eq!(record.status, IdempotencyStatus::Failed)
            }
            other => panic!("expected Finished, got {other:?}"),
        }
    }

    #[test]
    fn expired_record_is_treated_as_absent() {
        let guard = guard();
        let now = Utc::now();

        guard.check_or_create("K1", "fp-old", now).unwrap();
        guard.mark_completed("K1", "TXN-1", json!({})).unwrap();

        let after_ttl = now + Duration::hours(25);
        // Even a different payload is fine once the record has expired.
        let outcome = guard.check_or_create("K1", "fp-new", after_ttl).unwrap();
        assert_eq!(outcome, CheckOutcome::New);
    }

    #[test]
    fn cleanup_purges_expired_records() {
        let guard = guard();
        let now = Utc::now();

        guard.check_or_create("K1", "fp", now).unwrap();
        guard.check_or_create("K2", "fp", now).unwrap();

        assert_eq!(guard.purge_expired(now).unwrap(), 0);
        assert_eq!(guard.purge_expired(now + Duration::hours(25)).unwrap(), 2);
        // Idempotent under re-run.
        assert_eq!(guard.purge_expired(now + Duration::hours(25)).unwrap(), 0);
    }
}
