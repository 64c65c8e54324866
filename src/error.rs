//! Charge Error Types
//!
//! Every failure the ledger, the reservation cache, the balance authority or
//! the coordinators can report, with a stable code for API responses.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChargeError {
    // === Business outcomes ===
    #[error("Charge not found: {0}")]
    NotFound(i64),

    #[error("Balance not found for account: {0}")]
    BalanceNotFound(String),

    #[error("Insufficient funds")]
    InsufficientFunds,

    #[error("Amount must be non-zero")]
    InvalidAmount,

    // === Degraded mode ===
    #[error("Service busy, retry later")]
    Pending,

    #[error("Circuit breaker is open")]
    CircuitOpen,

    // === Infrastructure ===
    #[error("Reservation cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Failed to start transaction: {0}")]
    TransactionStartFailed(String),

    #[error("Failed to write charge: {0}")]
    WriteFailed(String),

    #[error("Balance authority error: {0}")]
    Authority(String),

    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(&'static str),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChargeError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            ChargeError::NotFound(_) => "NOT_FOUND",
            ChargeError::BalanceNotFound(_) => "BALANCE_NOT_FOUND",
            ChargeError::InsufficientFunds => "INSUFFICIENT_FUNDS",
            ChargeError::InvalidAmount => "INVALID_AMOUNT",
            ChargeError::Pending => "PENDING",
            ChargeError::CircuitOpen => "CIRCUIT_OPEN",
            ChargeError::CacheUnavailable(_) => "CACHE_UNAVAILABLE",
            ChargeError::TransactionStartFailed(_) => "TRANSACTION_START_FAILED",
            ChargeError::WriteFailed(_) => "WRITE_FAILED",
            ChargeError::Authority(_) => "AUTHORITY_ERROR",
            ChargeError::DeadlineExceeded(_) => "DEADLINE_EXCEEDED",
            ChargeError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            ChargeError::InvalidAmount => 400,
            ChargeError::NotFound(_) | ChargeError::BalanceNotFound(_) => 404,
            ChargeError::InsufficientFunds => 422,
            ChargeError::Authority(_) => 502,
            ChargeError::Pending
            | ChargeError::CircuitOpen
            | ChargeError::CacheUnavailable(_) => 503,
            ChargeError::DeadlineExceeded(_) => 504,
            ChargeError::TransactionStartFailed(_)
            | ChargeError::WriteFailed(_)
            | ChargeError::Internal(_) => 500,
        }
    }

    /// Business rejections and not-found answers are not infrastructure faults.
    pub fn is_business(&self) -> bool {
        matches!(
            self,
            ChargeError::NotFound(_)
                | ChargeError::BalanceNotFound(_)
                | ChargeError::InsufficientFunds
                | ChargeError::InvalidAmount
        )
    }

    /// The call timed out, so its side effect may or may not have landed.
    pub fn is_outcome_unknown(&self) -> bool {
        matches!(self, ChargeError::DeadlineExceeded(_))
    }
}

impl From<sqlx::Error> for ChargeError {
    fn from(e: sqlx::Error) -> Self {
        ChargeError::Internal(e.to_string())
    }
}

impl From<redis::RedisError> for ChargeError {
    fn from(e: redis::RedisError) -> Self {
        ChargeError::CacheUnavailable(e.to_string())
    }
}

impl From<reqwest::Error> for ChargeError {
    fn from(e: reqwest::Error) -> Self {
        ChargeError::Authority(e.to_string())
    }
}
