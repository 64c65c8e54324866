//! Balance Charges
//!
//! Coordinators over the ledger, the reservation cache and the balance
//! authority.
//!
//! - [`WithdrawalCoordinator`]: reserve, check funds, record, push, release
//! - [`ReadCoordinator`]: breaker-guarded point reads
//! - [`ChargeService`]: unguarded adds, reads and listings
//!
//! # Guarantees
//!
//! 1. **Release always runs**: every reservation taken by a withdrawal is
//!    inverted exactly once, on success, failure or cancellation
//! 2. **Errors are not masked**: a failed release or rollback is logged, the
//!    flow still reports its own error
//! 3. **No cached truth**: every funds check re-reads the authority

mod integration_tests;
pub mod reader;
pub mod service;
pub mod withdrawal;

pub use reader::ReadCoordinator;
pub use service::ChargeService;
pub use withdrawal::WithdrawalCoordinator;
