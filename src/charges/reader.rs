//! Read Coordinator
//!
//! Point reads of charge records through the circuit breaker. A missing row
//! is a business answer and never trips the breaker; an open breaker is
//! reported as `Pending`, distinct from `NotFound`.

use std::sync::Arc;
use tracing::{error, warn};

use crate::breaker::{BreakerError, BreakerState, CircuitBreaker, Settings};
use crate::error::ChargeError;
use crate::ledger::LedgerStore;
use crate::models::ChargeRecord;

pub struct ReadCoordinator {
    ledger: Arc<dyn LedgerStore>,
    breaker: CircuitBreaker<ChargeError>,
}

impl ReadCoordinator {
    pub fn new(ledger: Arc<dyn LedgerStore>, settings: Settings<ChargeError>) -> Self {
        let settings =
            settings.with_success_classifier(|e| matches!(e, ChargeError::NotFound(_)));
        Self {
            ledger,
            breaker: CircuitBreaker::new(settings),
        }
    }

    pub async fn get_guarded(&self, id: i64) -> Result<ChargeRecord, ChargeError> {
        match self.breaker.execute(|| self.ledger.get_by_id(id)).await {
            Ok(record) => Ok(record),
            Err(BreakerError::Open) | Err(BreakerError::TooManyProbes) => {
                warn!(charge_id = id, breaker = self.breaker.name(), "Read rejected, breaker open");
                Err(ChargeError::Pending)
            }
            Err(BreakerError::Inner(ChargeError::NotFound(id))) => Err(ChargeError::NotFound(id)),
            Err(BreakerError::Inner(e)) => {
                error!(charge_id = id, error = %e, "Guarded read failed");
                Err(ChargeError::Internal(e.to_string()))
            }
        }
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }
}
