//! Charge Service
//!
//! Unguarded ledger operations: administrative adds, plain reads, listings
//! and the reservation diagnostic.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

use crate::authority::BalanceAuthority;
use crate::error::ChargeError;
use crate::ledger::LedgerStore;
use crate::models::{Balance, ChargeRecord, NewCharge};
use crate::reservation::ReservationCache;

pub struct ChargeService {
    ledger: Arc<dyn LedgerStore>,
    reservations: Arc<dyn ReservationCache>,
    authority: Arc<dyn BalanceAuthority>,
}

impl ChargeService {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        reservations: Arc<dyn ReservationCache>,
        authority: Arc<dyn BalanceAuthority>,
    ) -> Self {
        Self {
            ledger,
            reservations,
            authority,
        }
    }

    /// Record a charge and push the new balance, without reservation or
    /// funds check.
    pub async fn add(&self, mut charge: NewCharge) -> Result<ChargeRecord, ChargeError> {
        if charge.amount.is_zero() {
            return Err(ChargeError::InvalidAmount);
        }
        let balance = self.authority.get_balance(&charge.account_id).await?;
        charge.fk_balance_id = balance.balance_id;

        let account_id = charge.account_id.clone();
        let amount = charge.amount;
        let record = self.ledger.insert(charge).await?;

        let updated = Balance {
            amount: balance.amount + amount,
            ..balance
        };
        self.authority.apply_balance(&account_id, &updated).await?;

        info!(account_id = %account_id, charge_id = record.id, amount = %amount, "Charge added");
        Ok(record)
    }

    pub async fn get(&self, id: i64) -> Result<ChargeRecord, ChargeError> {
        self.ledger.get_by_id(id).await
    }

    /// Charges of the account's balance, newest first
    pub async fn list_by_account(&self, account_id: &str) -> Result<Vec<ChargeRecord>, ChargeError> {
        let balance = self.authority.get_balance(account_id).await?;
        let records = self.ledger.list_by_balance(balance.balance_id).await?;
        debug!(account_id = %account_id, balance_id = balance.balance_id, count = records.len(), "Charges listed");
        Ok(records)
    }

    /// Net amount currently held by in-flight withdrawals
    pub async fn peek_reservation(&self, account_id: &str) -> Result<Decimal, ChargeError> {
        self.reservations.peek(account_id).await
    }
}
