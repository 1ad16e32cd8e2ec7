//! Limit and velocity enforcement.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use corebank_core::{DomainError, DomainResult, Money, UserId};

use crate::store::{LimitStore, LimitStoreError};
use crate::types::{LimitType, TransactionLimit, VelocityCheck};

/// Velocity window configuration.
#[derive(Debug, Clone)]
pub struct EnforcerConfig {
    /// Width of the rolling transaction-count window.
    pub velocity_window: Duration,
    /// Maximum transactions allowed inside one window.
    pub velocity_max: u32,
    /// How long a user stays blocked after tripping the velocity check.
    pub cooldown: Duration,
}

impl Default for EnforcerConfig {
    fn default() -> Self {
        Self {
            velocity_window: Duration::hours(1),
            velocity_max: 10,
            cooldown: Duration::minutes(30),
        }
    }
}

/// Enforces per-transaction/daily/monthly caps and transaction-rate
/// windows per user.
pub struct LimitEnforcer<S: LimitStore> {
    store: S,
    config: EnforcerConfig,
}

impl<S: LimitStore> LimitEnforcer<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, EnforcerConfig::default())
    }

    pub fn with_config(store: S, config: EnforcerConfig) -> Self {
        Self { store, config }
    }

    /// Install or replace a user's limit row.
    pub fn set_limit(&self, limit: TransactionLimit) -> DomainResult<()> {
        self.store.upsert_limit(&limit).map_err(map_store_err)
    }

    /// Check `amount` against the user's caps without consuming anything.
    ///
    /// Caps are checked in order: per-transaction, daily, monthly. The
    /// first breach fails LIMIT_EXCEEDED with the remaining headroom. A
    /// user with no limit row is uncapped.
    pub fn validate_transaction(
        &self,
        user_id: UserId,
        amount: Money,
        limit_type: LimitType,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        let Some(mut limit) = self
            .store
            .limit(user_id, limit_type)
            .map_err(map_store_err)?
        else {
            return Ok(());
        };

        if limit.roll_over(now) {
            self.store.upsert_limit(&limit).map_err(map_store_err)?;
        }

        if let Some(cap) = limit.per_transaction {
            if amount > cap {
                return Err(DomainError::limit_exceeded(format!(
                    "per-transaction cap is {cap}, requested {amount}"
                )));
            }
        }

        if let Some(cap) = limit.daily_cap {
            let remaining = cap - limit.daily_consumed;
            if amount > remaining {
                return Err(DomainError::limit_exceeded(format!(
                    "daily cap breached: {remaining} remaining of {cap}"
                )));
            }
        }

        if let Some(cap) = limit.monthly_cap {
            let remaining = cap - limit.monthly_consumed;
            if amount > remaining {
                return Err(DomainError::limit_exceeded(format!(
                    "monthly cap breached: {remaining} remaining of {cap}"
                )));
            }
        }

        Ok(())
    }

    /// Check the rolling transaction-rate window.
    ///
    /// Exceeding `velocity_max` inside the window blocks the user for the
    /// configured cooldown and fails VELOCITY_EXCEEDED.
    pub fn check_velocity(&self, user_id: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        let Some(velocity) = self.store.velocity(user_id).map_err(map_store_err)? else {
            return Ok(());
        };

        if velocity.is_blocked_at(now) {
            return Err(DomainError::velocity_exceeded(format!(
                "user {user_id} is blocked until {}",
                velocity.blocked_until.unwrap_or(now)
            )));
        }

        if velocity.blocked_until.is_some() {
            // Cooldown served. The old window would otherwise re-trip the
            // count immediately and stretch a fixed cooldown into a
            // window-length block, so the counter starts over.
            let mut reset = velocity;
            reset.window_start = now;
            reset.count = 0;
            reset.blocked_until = None;
            self.store.upsert_velocity(&reset).map_err(map_store_err)?;
            return Ok(());
        }

        if now - velocity.window_start >= self.config.velocity_window {
            // Window has lapsed; the next update starts a fresh one.
            return Ok(());
        }

        if velocity.count >= self.config.velocity_max {
            let mut blocked = velocity;
            blocked.blocked_until = Some(now + self.config.cooldown);
            self.store.upsert_velocity(&blocked).map_err(map_store_err)?;

            warn!(%user_id, until = %blocked.blocked_until.unwrap_or(now), "velocity tripped, user blocked");
            return Err(DomainError::velocity_exceeded(format!(
                "more than {} transactions within the window",
                self.config.velocity_max
            )));
        }

        Ok(())
    }

    /// Consume headroom after a transaction COMPLETED. Must be called
    /// exactly once per completed transaction, never for rejected or
    /// reversed ones.
    pub fn consume_limits(
        &self,
        user_id: UserId,
        amount: Money,
        limit_type: LimitType,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        let Some(mut limit) = self
            .store
            .limit(user_id, limit_type)
            .map_err(map_store_err)?
        else {
            return Ok(());
        };

        limit.roll_over(now);
        limit.daily_consumed += amount;
        limit.monthly_consumed += amount;
        limit.updated_at = now;
        self.store.upsert_limit(&limit).map_err(map_store_err)?;

        debug!(%user_id, %amount, ?limit_type, "limit headroom consumed");
        Ok(())
    }

    /// Count a completed transaction against the velocity window.
    pub fn update_velocity(&self, user_id: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        let mut velocity = self
            .store
            .velocity(user_id)
            .map_err(map_store_err)?
            .unwrap_or_else(|| VelocityCheck::new(user_id, now));

        if now - velocity.window_start >= self.config.velocity_window {
            velocity.window_start = now;
            velocity.count = 1;
        } else {
            velocity.count += 1;
        }
        self.store.upsert_velocity(&velocity).map_err(map_store_err)
    }
}

fn map_store_err(err: LimitStoreError) -> DomainError {
    match err {
        LimitStoreError::Storage(msg) => DomainError::internal(msg),
    }
}
