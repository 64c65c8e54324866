//! Balance Authority
//!
//! Remote source of truth for an account's spendable amount. Balances are
//! always read fresh; nothing here caches them.

pub mod rest;

pub use rest::RestBalanceAuthority;

use async_trait::async_trait;

use crate::error::ChargeError;
use crate::models::Balance;

#[async_trait]
pub trait BalanceAuthority: Send + Sync {
    /// Fails with `BalanceNotFound` when the authority has no such account,
    /// `Authority` for anything else.
    async fn get_balance(&self, account_id: &str) -> Result<Balance, ChargeError>;

    /// Replace the account's balance with `balance`
    async fn apply_balance(&self, account_id: &str, balance: &Balance) -> Result<(), ChargeError>;
}


#[cfg(test)]
pub use mock::MockAuthority;
