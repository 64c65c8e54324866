//! Reservation Cache
//!
//! Shared, atomically incremented counter per account holding the algebraic sum
//! of in-flight withdrawal amounts. It is a concurrency signal, never a balance
//! store: in steady state every counter is zero or absent.
//!
//! Each mutation resets the key's expiry, so a reservation abandoned by a
//! crashed flow disappears on its own after the TTL.
//!
//! # Backends
//!
//! - [`RedisReservationCache`]: `HINCRBYFLOAT` + `PEXPIRE`, shared across instances
//! - [`MemoryReservationCache`]: single-node map, for non-distributed deployments

pub mod guard;
pub mod memory;
pub mod redis_cache;

pub use guard::Reservation;
pub use memory::MemoryReservationCache;
pub use redis_cache::RedisReservationCache;

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;

use crate::error::ChargeError;

/// Reservation keys expire one minute after their last mutation
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Key shared with other instances of the service
pub fn account_key(account_id: &str) -> String {
    format!("account:{}", account_id)
}

#[async_trait]
pub trait ReservationCache: Send + Sync {
    /// Atomically add `amount` to the account counter and reset its expiry
    async fn reserve(&self, account_id: &str, amount: Decimal) -> Result<(), ChargeError>;

    /// Current counter value; zero when absent
    async fn peek(&self, account_id: &str) -> Result<Decimal, ChargeError>;

    /// Exact inverse of a prior `reserve(account_id, amount)`
    async fn release(&self, account_id: &str, amount: Decimal) -> Result<(), ChargeError> {
        self.reserve(account_id, -amount).await
    }
}
