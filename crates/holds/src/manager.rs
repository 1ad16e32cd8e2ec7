//! Hold manager: lifecycle operations and available balance.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use corebank_core::{AccountId, DomainError, DomainResult, HoldId, Money};
use corebank_ledger::{Ledger, LedgerStore};

use crate::hold::{Hold, HoldStatus, HoldType};
use crate::store::{HoldStore, HoldStoreError};

/// Manages balance holds on top of the ledger's balances.
pub struct HoldManager<H: HoldStore, L: LedgerStore> {
    store: H,
    ledger: Arc<Ledger<L>>,
}

impl<H: HoldStore, L: LedgerStore> HoldManager<H, L> {
    pub fn new(store: H, ledger: Arc<Ledger<L>>) -> Self {
        Self { store, ledger }
    }

    /// Place an ACTIVE hold. The account must exist; the amount must be
    /// positive. Holds may exceed the current balance (a fraud-review hold
    /// can freeze more than is there today).
    pub fn create_hold(
        &self,
        account_id: AccountId,
        amount: Money,
        hold_type: HoldType,
        reason: &str,
        expires_at: DateTime<Utc>,
    ) -> DomainResult<Hold> {
        amount.require_positive("hold amount")?;
        self.ledger.account(account_id)?;

        let hold = Hold {
            id: HoldId::new(),
            account_id,
            amount,
            hold_type,
            status: HoldStatus::Active,
            reason: reason.to_string(),
            expires_at,
            created_at: Utc::now(),
            released_by: None,
            released_reason: None,
            closed_at: None,
        };
        self.store.insert(hold.clone()).map_err(map_store_err)?;

        debug!(hold_id = %hold.id, %account_id, %amount, ?hold_type, "hold created");
        Ok(hold)
    }

    /// ACTIVE → RELEASED. Any other starting state is INVALID_STATE.
    pub fn release(&self, hold_id: HoldId, by: &str, reason: &str) -> DomainResult<Hold> {
        let mut hold = self.get(hold_id)?;
        if !hold.is_active() {
            return Err(DomainError::invalid_state(format!(
                "hold {hold_id} is {:?}, only ACTIVE holds can be released",
                hold.status
            )));
        }

        hold.status = HoldStatus::Released;
        hold.released_by = Some(by.to_string());
        hold.released_reason = Some(reason.to_string());
        hold.closed_at = Some(Utc::now());
        self.store.update(&hold).map_err(map_store_err)?;

        info!(%hold_id, account_id = %hold.account_id, by, "hold released");
        Ok(hold)
    }

    /// ACTIVE → CAPTURED. Acknowledges that the underlying debit was
    /// applied elsewhere; moves no money itself.
    pub fn capture(&self, hold_id: HoldId) -> DomainResult<Hold> {
        let mut hold = self.get(hold_id)?;
        if !hold.is_active() {
            return Err(DomainError::invalid_state(format!(
                "hold {hold_id} is {:?}, only ACTIVE holds can be captured",
                hold.status
            )));
        }

        hold.status = HoldStatus::Captured;
        hold.closed_at = Some(Utc::now());
        self.store.update(&hold).map_err(map_store_err)?;

        info!(%hold_id, account_id = %hold.account_id, "hold captured");
        Ok(hold)
    }

    /// `max(0, balance − Σ active hold amounts)`.
    pub fn available_balance(&self, account_id: AccountId) -> DomainResult<Money> {
        let balance = self.ledger.balance(account_id)?;
        let held: Money = self
            .store
            .active_for_account(account_id)
            .map_err(map_store_err)?
            .iter()
            .map(|h| h.amount)
            .sum();
        Ok((balance - held).max(Money::ZERO))
    }

    /// All ACTIVE holds for an account.
    pub fn active_holds(&self, account_id: AccountId) -> DomainResult<Vec<Hold>> {
        self.store
            .active_for_account(account_id)
            .map_err(map_store_err)
    }

    /// Scheduled sweep: transition ACTIVE holds past `expires_at` to
    /// EXPIRED. The selection criterion makes overlapping or repeated
    /// runs harmless. Returns how many holds were expired.
    pub fn expire_due(&self, now: DateTime<Utc>) -> DomainResult<usize> {
        let due = self
            .store
            .active_expired_before(now)
            .map_err(map_store_err)?;
        let mut expired = 0;

        for mut hold in due {
            // Re-check under the current row state; another sweep run may
            // have beaten us to it.
            if !hold.is_active() {
                continue;
            }
            hold.status = HoldStatus::Expired;
            hold.closed_at = Some(now);
            self.store.update(&hold).map_err(map_store_err)?;
            expired += 1;
        }

        if expired > 0 {
            info!(count = expired, "expired due holds");
        }
        Ok(expired)
    }

    fn get(&self, hold_id: HoldId) -> DomainResult<Hold> {
        self.store
            .get(hold_id)
            .map_err(map_store_err)?
            .ok_or_else(|| DomainError::not_found(format!("hold {hold_id}")))
    }
}

fn map_store_err(err: HoldStoreError) -> DomainError {
    match err {
        HoldStoreError::NotFound(id) => DomainError::not_found(format!("hold {id}")),
        HoldStoreError::AlreadyExists(id) => {
            DomainError::invalid_state(format!("hold {id} already exists"))
        }
        HoldStoreError::Storage(msg) => DomainError::internal(msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryHoldStore;
    use chrono::Duration;
    use corebank_core::{Currency, TransactionId, UserId};
    use corebank_ledger::{Account, InMemoryLedgerStore};
    use rust_decimal_macros::dec;

    fn setup() -> (
        HoldManager<InMemoryHoldStore, InMemoryLedgerStore>,
        AccountId,
    ) {
        let ledger = Arc::new(Ledger::new(InMemoryLedgerStore::new()));
        let account = Account::open(UserId::new(), Currency::Usd, Money::ZERO);
        let id = account.id;
        ledger.register_account(account).unwrap();
        ledger
            .credit(id, TransactionId::new(), Money::new(dec!(1000)), "SEED", "opening")
            .unwrap();

        (HoldManager::new(InMemoryHoldStore::new(), ledger), id)
    }

    fn in_one_hour() -> DateTime<Utc> {
        Utc::now() + Duration::hours(1)
    }

    #[test]
    fn hold_reduces_available_balance() {
        let (manager, account) = setup();

        let hold = manager
            .create_hold(account, Money::new(dec!(300)), HoldType::FraudReview, "review", in_one_hour())
            .unwrap();
        assert_eq!(
            manager.available_balance(account).unwrap(),
            Money::new(dec!(700))
        );

        manager.release(hold.id, "analyst", "cleared").unwrap();
        assert_eq!(
            manager.available_balance(account).unwrap(),
            Money::new(dec!(1000))
        );
    }

    #[test]
    fn available_balance_floors_at_zero() {
        let (manager, account) = setup();

        manager
            .create_hold(account, Money::new(dec!(5000)), HoldType::LegalOrder, "court order", in_one_hour())
            .unwrap();

        assert_eq!(manager.available_balance(account).unwrap(), Money::ZERO);
    }

    #[test]
    fn double_release_is_invalid_state() {
        let (manager, account) = setup();
        let hold = manager
            .create_hold(account, Money::new(dec!(10)), HoldType::Authorization, "auth", in_one_hour())
            .unwrap();

        manager.release(hold.id, "system", "done").unwrap();
        let err = manager.release(hold.id, "system", "again").unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");
    }

    #[test]
    fn capture_moves_no_money() {
        let (manager, account) = setup();
        let hold = manager
            .create_hold(account, Money::new(dec!(100)), HoldType::Authorization, "auth", in_one_hour())
            .unwrap();

        let captured = manager.capture(hold.id).unwrap();
        assert_eq!(captured.status, HoldStatus::Captured);
        // Ledger balance untouched; only the reservation ended.
        assert_eq!(
            manager.available_balance(account).unwrap(),
            Money::new(dec!(1000))
        );

        let err = manager.capture(hold.id).unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");
    }

    #[test]
    fn hold_on_missing_account_fails() {
        let (manager, _) = setup();
        let err = manager
            .create_hold(AccountId::new(), Money::new(dec!(1)), HoldType::FraudReview, "x", in_one_hour())
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn sweep_expires_only_due_active_holds() {
        let (manager, account) = setup();
        let now = Utc::now();

        let due = manager
            .create_hold(account, Money::new(dec!(100)), HoldType::FraudReview, "old", now - Duration::minutes(5))
            .unwrap();
        let future = manager
            .create_hold(account, Money::new(dec!(50)), HoldType::FraudReview, "new", now + Duration::hours(2))
            .unwrap();
        let released = manager
            .create_hold(account, Money::new(dec!(25)), HoldType::FraudReview, "released", now - Duration::minutes(5))
            .unwrap();
        manager.release(released.id, "analyst", "cleared").unwrap();

        assert_eq!(manager.expire_due(now).unwrap(), 1);
        // Re-running the sweep finds nothing left to do.
        assert_eq!(manager.expire_due(now).unwrap(), 0);

        let active = manager.active_holds(account).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, future.id);
        let _ = due;
    }
}
