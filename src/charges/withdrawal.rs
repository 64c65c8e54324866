//! Withdrawal Coordinator
//!
//! Runs one withdrawal as a saga across three stores:
//!
//! 1. open a ledger transaction
//! 2. reserve the requested amount in the shared counter
//! 3. peek the reserved total and read the authoritative balance
//! 4. reject with `InsufficientFunds` when the reservation outweighs the balance
//! 5. write the charge inside the transaction
//! 6. push `balance + amount` to the authority
//! 7. commit on success, roll back otherwise
//!
//! The reservation from step 2 is released after step 7 whatever the outcome.
//! If the whole flow outlives its deadline it is dropped: the transaction
//! handle rolls back on drop and the reservation guard releases from a
//! background task, including when the drop lands inside step 2.
//!
//! A commit failing after step 6 is compensated by pushing the inverse amount
//! onto a fresh read of the balance, so pushes from other flows survive.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::authority::BalanceAuthority;
use crate::error::ChargeError;
use crate::ledger::{LedgerStore, LedgerTx};
use crate::models::{Balance, ChargeRecord, NewCharge, WithdrawRequest};
use crate::reservation::{Reservation, ReservationCache};

pub struct WithdrawalCoordinator {
    ledger: Arc<dyn LedgerStore>,
    reservations: Arc<dyn ReservationCache>,
    authority: Arc<dyn BalanceAuthority>,
    deadline: Duration,
}

/// Work done by steps 3-6, handed to the commit step
struct Settled {
    record: ChargeRecord,
}

impl WithdrawalCoordinator {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        reservations: Arc<dyn ReservationCache>,
        authority: Arc<dyn BalanceAuthority>,
        deadline: Duration,
    ) -> Self {
        Self {
            ledger,
            reservations,
            authority,
            deadline,
        }
    }

    /// Authorize and record a withdrawal
    pub async fn withdraw(&self, req: WithdrawRequest) -> Result<ChargeRecord, ChargeError> {
        if req.amount.is_zero() {
            return Err(ChargeError::InvalidAmount);
        }
        let charge = req.into_charge();
        let account_id = charge.account_id.clone();

        match tokio::time::timeout(self.deadline, self.run(charge)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    account_id = %account_id,
                    deadline_secs = self.deadline.as_secs(),
                    "Withdrawal cancelled at deadline"
                );
                Err(ChargeError::DeadlineExceeded("withdraw"))
            }
        }
    }

    async fn run(&self, charge: NewCharge) -> Result<ChargeRecord, ChargeError> {
        let mut tx = self.ledger.begin().await?;

        let reservation =
            match Reservation::take(self.reservations.clone(), &charge.account_id, charge.amount)
                .await
            {
                Ok(reservation) => reservation,
                Err(e) => {
                    rollback(tx, &charge.account_id).await;
                    return Err(e);
                }
            };

        let account_id = charge.account_id.clone();
        let outcome = match self.settle(tx.as_mut(), charge).await {
            Ok(settled) => match tx.commit().await {
                Ok(()) => {
                    info!(
                        account_id = %account_id,
                        charge_id = settled.record.id,
                        amount = %settled.record.amount,
                        "Withdrawal committed"
                    );
                    Ok(settled.record)
                }
                Err(e) => {
                    error!(account_id = %account_id, error = %e, "Commit failed after balance push");
                    self.compensate(&account_id, settled.record.amount).await;
                    Err(e)
                }
            },
            Err(e) => {
                rollback(tx, &account_id).await;
                Err(e)
            }
        };

        reservation.release().await;
        outcome
    }

    /// Steps 3-6
    async fn settle(
        &self,
        tx: &mut dyn LedgerTx,
        mut charge: NewCharge,
    ) -> Result<Settled, ChargeError> {
        let (reserved, balance) = tokio::try_join!(
            self.reservations.peek(&charge.account_id),
            self.authority.get_balance(&charge.account_id),
        )?;

        if reserved.abs() > balance.amount.abs() {
            warn!(
                account_id = %charge.account_id,
                reserved = %reserved,
                balance = %balance.amount,
                "Insufficient funds"
            );
            return Err(ChargeError::InsufficientFunds);
        }
        debug!(account_id = %charge.account_id, reserved = %reserved, balance = %balance.amount, "Funds check passed");

        charge.fk_balance_id = balance.balance_id;
        let account_id = charge.account_id.clone();
        let amount = charge.amount;
        let record = self.ledger.insert_within(tx, charge).await?;

        let updated = Balance {
            amount: balance.amount + amount,
            ..balance
        };
        self.authority.apply_balance(&account_id, &updated).await?;

        Ok(Settled { record })
    }

    /// Best-effort undo of a pushed `amount` after a failed commit
    async fn compensate(&self, account_id: &str, amount: Decimal) {
        let current = match self.authority.get_balance(account_id).await {
            Ok(current) => current,
            Err(e) => {
                error!(
                    account_id = %account_id,
                    amount = %amount,
                    error = %e,
                    "Compensation read failed; authority and ledger diverge"
                );
                return;
            }
        };
        let restored = Balance {
            amount: current.amount - amount,
            ..current
        };
        match self.authority.apply_balance(account_id, &restored).await {
            Ok(()) => warn!(account_id = %account_id, amount = %restored.amount, "Balance push compensated"),
            Err(e) => error!(
                account_id = %account_id,
                amount = %restored.amount,
                error = %e,
                "Compensation failed; authority and ledger diverge"
            ),
        }
    }
}

async fn rollback(tx: Box<dyn LedgerTx>, account_id: &str) {
    if let Err(e) = tx.rollback().await {
        warn!(account_id = %account_id, error = %e, "Rollback failed");
    }
}
