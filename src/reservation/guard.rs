//! Reservation guard
//!
//! Owns one `reserve` and guarantees its inverse is applied exactly once:
//! explicitly through [`Reservation::release`], or from a spawned task when the
//! owning flow is dropped mid-way (deadline expiry, client disconnect), even
//! while the `reserve` call itself is still in flight.
//! Release failures are logged and never replace the flow's own result.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::ReservationCache;
use crate::error::ChargeError;

pub struct Reservation {
    cache: Arc<dyn ReservationCache>,
    account_id: String,
    amount: Decimal,
    settled: bool,
}

impl Reservation {
    /// Reserve `amount` for `account_id`
    ///
    /// The guard is armed before the counter is touched: if this future is
    /// dropped mid-call, or the call times out with an unknown outcome, the
    /// inverse is still applied. A definite refusal leaves nothing to undo.
    pub async fn take(
        cache: Arc<dyn ReservationCache>,
        account_id: &str,
        amount: Decimal,
    ) -> Result<Self, ChargeError> {
        let mut reservation = Self {
            cache,
            account_id: account_id.to_string(),
            amount,
            settled: false,
        };

        match reservation.cache.reserve(account_id, amount).await {
            Ok(()) => {
                debug!(account_id = %account_id, amount = %amount, "Reservation taken");
                Ok(reservation)
            }
            Err(e) if e.is_outcome_unknown() => {
                warn!(account_id = %account_id, amount = %amount, error = %e, "Reserve outcome unknown, releasing");
                reservation.release().await;
                Err(e)
            }
            Err(e) => {
                reservation.settled = true;
                Err(e)
            }
        }
    }

    /// Apply the exact inverse of the reservation
    pub async fn release(mut self) {
        self.settled = true;
        match self.cache.release(&self.account_id, self.amount).await {
            Ok(()) => debug!(account_id = %self.account_id, amount = %self.amount, "Reservation released"),
            Err(e) => warn!(
                account_id = %self.account_id,
                amount = %self.amount,
                error = %e,
                "Reservation release failed; counter will expire"
            ),
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let cache = self.cache.clone();
        let account_id = std::mem::take(&mut self.account_id);
        let amount = self.amount;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(account_id = %account_id, amount = %amount, "Flow cancelled, releasing reservation in background");
                handle.spawn(async move {
                    if let Err(e) = cache.release(&account_id, amount).await {
                        warn!(account_id = %account_id, error = %e, "Background release failed; counter will expire");
                    }
                });
            }
            Err(_) => error!(
                account_id = %account_id,
                amount = %amount,
                "No runtime to release reservation; counter will expire"
            ),
        }
    }
}
