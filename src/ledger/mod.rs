//! Ledger Store
//!
//! Local system of record for charge events. The running balance lives in the
//! balance authority; this store only appends charges.
//!
//! Writes either stand alone ([`LedgerStore::insert`]) or participate in a
//! transaction opened with [`LedgerStore::begin`], whose handle the caller
//! commits or rolls back. Dropping a handle without either rolls it back.

pub mod postgres;

pub use postgres::PgLedgerStore;

use async_trait::async_trait;

use crate::error::ChargeError;
use crate::models::{ChargeRecord, NewCharge};

/// Transaction handle owned by exactly one flow
#[async_trait]
pub trait LedgerTx: Send {
    /// Insert a charge inside this transaction
    async fn insert(&mut self, charge: NewCharge) -> Result<ChargeRecord, ChargeError>;

    async fn commit(self: Box<Self>) -> Result<(), ChargeError>;

    async fn rollback(self: Box<Self>) -> Result<(), ChargeError>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open a transaction; fails with `TransactionStartFailed`
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, ChargeError>;

    /// Single-statement insert outside any transaction; fails with `WriteFailed`
    async fn insert(&self, charge: NewCharge) -> Result<ChargeRecord, ChargeError>;

    /// Insert within an externally managed transaction
    async fn insert_within(
        &self,
        tx: &mut dyn LedgerTx,
        charge: NewCharge,
    ) -> Result<ChargeRecord, ChargeError> {
        tx.insert(charge).await
    }

    /// Point read; fails with `NotFound` when no row matches
    async fn get_by_id(&self, id: i64) -> Result<ChargeRecord, ChargeError>;

    /// All charges of a balance, newest first
    async fn list_by_balance(&self, balance_id: i64) -> Result<Vec<ChargeRecord>, ChargeError>;
}


#[cfg(test)]
pub use mock::MemoryLedger;
