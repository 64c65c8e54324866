//! Single-node reservation counters
//!
//! Each account slot is mutated under its DashMap shard lock, which gives the
//! same per-key atomicity as a shared store within one process.

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::time::Instant;

use super::{ReservationCache, account_key};
use crate::error::ChargeError;

#[derive(Debug, Clone, Copy)]
struct Slot {
    amount: Decimal,
    expires_at: Instant,
}

pub struct MemoryReservationCache {
    slots: DashMap<String, Slot>,
    ttl: Duration,
}

impl MemoryReservationCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slots: DashMap::new(),
            ttl,
        }
    }

    /// Drop expired counters; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.slots.len();
        self.slots.retain(|_, slot| slot.expires_at > now);
        before - self.slots.len()
    }

    /// Counters currently held, expired ones included until purged
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[async_trait]
impl ReservationCache for MemoryReservationCache {
    async fn reserve(&self, account_id: &str, amount: Decimal) -> Result<(), ChargeError> {
        let now = Instant::now();
        let mut slot = self.slots.entry(account_key(account_id)).or_insert(Slot {
            amount: Decimal::ZERO,
            expires_at: now,
        });
        if slot.expires_at <= now {
            slot.amount = Decimal::ZERO;
        }
        slot.amount += amount;
        slot.expires_at = now + self.ttl;
        Ok(())
    }

    async fn peek(&self, account_id: &str) -> Result<Decimal, ChargeError> {
        let now = Instant::now();
        Ok(self
            .slots
            .get(&account_key(account_id))
            .filter(|slot| slot.expires_at > now)
            .map(|slot| slot.amount)
            .unwrap_or(Decimal::ZERO))
    }
}
