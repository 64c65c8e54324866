//! Redis-backed reservation counters
//!
//! Layout: hash `account:<id>`, field `amount`. Increment and expiry reset are
//! sent as one MULTI/EXEC pipeline so a counter is never left without a TTL.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use super::{ReservationCache, account_key};
use crate::error::ChargeError;

const AMOUNT_FIELD: &str = "amount";

/// Upper bound for one round trip
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Precision kept when reading float counters back
const AMOUNT_SCALE: u32 = 8;

pub struct RedisReservationCache {
    conn: ConnectionManager,
    ttl: Duration,
}

impl RedisReservationCache {
    pub async fn connect(redis_url: &str, ttl: Duration) -> Result<Self, ChargeError> {
        let client = redis::Client::open(redis_url)?;
        let conn = tokio::time::timeout(COMMAND_TIMEOUT, ConnectionManager::new(client))
            .await
            .map_err(|_| ChargeError::CacheUnavailable("connect timed out".to_string()))??;

        info!(redis_url = %redis_url, ttl_secs = ttl.as_secs(), "Reservation cache connected");
        Ok(Self { conn, ttl })
    }

    pub async fn ping(&self) -> Result<(), ChargeError> {
        let mut conn = self.conn.clone();
        let _: String = bounded("ping", redis::cmd("PING").query_async(&mut conn)).await?;
        Ok(())
    }
}

/// Timeouts surface as `DeadlineExceeded`: the command may still have been
/// applied. Refused connections and protocol errors stay `CacheUnavailable`.
async fn bounded<T, F>(op: &'static str, fut: F) -> Result<T, ChargeError>
where
    F: std::future::Future<Output = redis::RedisResult<T>>,
{
    match tokio::time::timeout(COMMAND_TIMEOUT, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) if e.is_timeout() => Err(ChargeError::DeadlineExceeded(op)),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(ChargeError::DeadlineExceeded(op)),
    }
}

/// Parse a float counter as written by `HINCRBYFLOAT`
pub(crate) fn parse_counter(raw: &str) -> Result<Decimal, ChargeError> {
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
        .or_else(|| raw.parse::<f64>().ok().and_then(Decimal::from_f64))
        .map(|d| d.round_dp(AMOUNT_SCALE).normalize())
        .ok_or_else(|| ChargeError::Internal(format!("bad reservation counter: {:?}", raw)))
}

#[async_trait]
impl ReservationCache for RedisReservationCache {
    async fn reserve(&self, account_id: &str, amount: Decimal) -> Result<(), ChargeError> {
        let key = account_key(account_id);
        let mut conn = self.conn.clone();

        let (total,): (String,) = bounded(
            "reserve",
            redis::pipe()
                .atomic()
                .cmd("HINCRBYFLOAT")
                .arg(&key)
                .arg(AMOUNT_FIELD)
                .arg(amount.to_string())
                .cmd("PEXPIRE")
                .arg(&key)
                .arg(self.ttl.as_millis() as u64)
                .ignore()
                .query_async(&mut conn),
        )
        .await?;

        debug!(account_id = %account_id, amount = %amount, total = %total, "Reservation counter moved");
        Ok(())
    }

    async fn peek(&self, account_id: &str) -> Result<Decimal, ChargeError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = bounded(
            "peek",
            redis::cmd("HGET")
                .arg(account_key(account_id))
                .arg(AMOUNT_FIELD)
                .query_async(&mut conn),
        )
        .await?;

        match raw {
            Some(raw) => parse_counter(&raw),
            None => Ok(Decimal::ZERO),
        }
    }
}
