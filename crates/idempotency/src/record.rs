use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Idempotency record status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IdempotencyStatus {
    Pending,
    Completed,
    Failed,
}

/// One idempotency key's state.
///
/// `lease_until` only matters while PENDING: it is the point past which a
/// crashed attempt's record may be reclaimed by a retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    /// SHA-256 over the canonical request payload.
    pub fingerprint: String,
    pub status: IdempotencyStatus,
    /// Reference to the committed result (e.g. a transaction reference).
    pub result_ref: Option<String>,
    /// Result payload returned verbatim to retries.
    pub result: Option<serde_json::Value>,
    pub expires_at: DateTime<Utc>,
    pub lease_until: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            IdempotencyStatus::Completed | IdempotencyStatus::Failed
        )
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn lease_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.lease_until <= now
    }
}
