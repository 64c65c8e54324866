//! Balance Charges - append-only charge ledger
//!
//! Records credits and debits against accounts whose spendable amount is
//! owned by a remote balance authority.
//!
//! # Modules
//!
//! - [`config`] - YAML configuration with environment overrides
//! - [`logging`] - tracing subscriber setup
//! - [`error`] - `ChargeError`, shared by every layer
//! - [`models`] - ChargeRecord, Balance and request types
//! - [`db`] - PostgreSQL pool and schema bootstrap
//! - [`ledger`] - LedgerStore: transactional charge persistence
//! - [`authority`] - BalanceAuthority: remote balance client
//! - [`reservation`] - ReservationCache: shared in-flight counters with TTL
//! - [`breaker`] - Three-state circuit breaker
//! - [`charges`] - Withdrawal, guarded read and plain charge coordinators
//! - [`gateway`] - HTTP surface

pub mod authority;
pub mod breaker;
pub mod charges;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod reservation;

pub use error::ChargeError;
