//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every business-rule failure surfaces as one of these variants with a
/// stable machine code (see [`DomainError::code`]) and a human-readable
/// reason. Infrastructure failures are wrapped as `Internal`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (non-positive amount, same-account
    /// transfer, currency mismatch). Rejected before any mutation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A debit would exceed `balance + overdraft_limit`.
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    /// A referenced account/hold/transaction does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The fraud engine blocked the transaction before any fund mutation.
    #[error("blocked by fraud rules: {0}")]
    FraudBlocked(String),

    /// A per-transaction/daily/monthly cap would be breached.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// Too many transactions inside the velocity window.
    #[error("velocity exceeded: {0}")]
    VelocityExceeded(String),

    /// Same idempotency key seen with a different request payload.
    #[error("idempotency conflict: {0}")]
    IdempotencyConflict(String),

    /// An operation was attempted against an entity in the wrong state
    /// (e.g. releasing a hold that is not ACTIVE).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A compensating ledger operation failed. Highest severity; requires
    /// manual reconciliation and is never auto-retried.
    #[error("compensation failure: {0}")]
    CompensationFailure(String),

    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn insufficient_funds(msg: impl Into<String>) -> Self {
        Self::InsufficientFunds(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn fraud_blocked(msg: impl Into<String>) -> Self {
        Self::FraudBlocked(msg.into())
    }

    pub fn limit_exceeded(msg: impl Into<String>) -> Self {
        Self::LimitExceeded(msg.into())
    }

    pub fn velocity_exceeded(msg: impl Into<String>) -> Self {
        Self::VelocityExceeded(msg.into())
    }

    pub fn idempotency_conflict(msg: impl Into<String>) -> Self {
        Self::IdempotencyConflict(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn compensation_failure(msg: impl Into<String>) -> Self {
        Self::CompensationFailure(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable code for API consumers and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::InsufficientFunds(_) => "INSUFFICIENT_FUNDS",
            Self::NotFound(_) => "NOT_FOUND",
            Self::FraudBlocked(_) => "FRAUD_BLOCKED",
            Self::LimitExceeded(_) => "LIMIT_EXCEEDED",
            Self::VelocityExceeded(_) => "VELOCITY_EXCEEDED",
            Self::IdempotencyConflict(_) => "IDEMPOTENCY_CONFLICT",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::CompensationFailure(_) => "COMPENSATION_FAILURE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Compensation failures require operator intervention and must never
    /// be retried automatically.
    pub fn requires_manual_reconciliation(&self) -> bool {
        matches!(self, Self::CompensationFailure(_))
    }
}
