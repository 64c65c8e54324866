//! PostgreSQL ledger store
//!
//! Every statement, including transaction begin/commit/rollback, runs under the
//! configured deadline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error};

use super::{LedgerStore, LedgerTx};
use crate::error::ChargeError;
use crate::models::{ChargeRecord, ChargeType, NewCharge};

const INSERT_SQL: &str = r#"
    INSERT INTO balance_charge (fk_balance_id, type_charge, charged_at, currency, amount, tenant_id)
    VALUES ($1, $2, NOW(), $3, $4, $5)
    RETURNING id, charged_at
"#;

const SELECT_COLUMNS: &str =
    "SELECT id, fk_balance_id, type_charge, charged_at, currency, amount, tenant_id FROM balance_charge";

/// Run `fut` under `deadline`, mapping expiry to `on_timeout`
async fn bounded<T, F>(deadline: Duration, on_timeout: ChargeError, fut: F) -> Result<T, ChargeError>
where
    F: Future<Output = Result<T, ChargeError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => {
            error!(deadline_ms = deadline.as_millis() as u64, error = %on_timeout, "Ledger operation timed out");
            Err(on_timeout)
        }
    }
}

fn row_to_record(row: &PgRow) -> Result<ChargeRecord, ChargeError> {
    let type_charge: String = row.try_get("type_charge")?;
    let charge_type = ChargeType::parse(&type_charge)
        .ok_or_else(|| ChargeError::Internal(format!("unknown type_charge: {}", type_charge)))?;

    Ok(ChargeRecord {
        id: row.try_get("id")?,
        account_id: None,
        fk_balance_id: row.try_get("fk_balance_id")?,
        charge_type,
        amount: row.try_get("amount")?,
        currency: row.try_get("currency")?,
        tenant_id: row.try_get("tenant_id")?,
        charged_at: row.try_get("charged_at")?,
    })
}

fn inserted(row: &PgRow, charge: NewCharge) -> Result<ChargeRecord, ChargeError> {
    let id: i64 = row
        .try_get("id")
        .map_err(|e| ChargeError::WriteFailed(e.to_string()))?;
    let charged_at: DateTime<Utc> = row
        .try_get("charged_at")
        .map_err(|e| ChargeError::WriteFailed(e.to_string()))?;
    Ok(ChargeRecord::from_new(id, charged_at, charge))
}

/// `balance_charge` table access
pub struct PgLedgerStore {
    pool: PgPool,
    op_timeout: Duration,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool, op_timeout: Duration) -> Self {
        Self { pool, op_timeout }
    }
}

pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
    op_timeout: Duration,
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn insert(&mut self, charge: NewCharge) -> Result<ChargeRecord, ChargeError> {
        debug!(fk_balance_id = charge.fk_balance_id, "Insert charge (tx)");
        let deadline = self.op_timeout;
        let tx = &mut self.tx;
        bounded(
            deadline,
            ChargeError::WriteFailed("insert timed out".to_string()),
            async move {
                let row = sqlx::query(INSERT_SQL)
                    .bind(charge.fk_balance_id)
                    .bind(charge.charge_type.as_str())
                    .bind(&charge.currency)
                    .bind(charge.amount)
                    .bind(&charge.tenant_id)
                    .fetch_one(&mut **tx)
                    .await
                    .map_err(|e| {
                        error!(error = %e, "INSERT statement");
                        ChargeError::WriteFailed(e.to_string())
                    })?;
                inserted(&row, charge)
            },
        )
        .await
    }

    async fn commit(self: Box<Self>) -> Result<(), ChargeError> {
        let PgLedgerTx { tx, op_timeout } = *self;
        bounded(
            op_timeout,
            ChargeError::DeadlineExceeded("commit"),
            async move { tx.commit().await.map_err(ChargeError::from) },
        )
        .await
    }

    async fn rollback(self: Box<Self>) -> Result<(), ChargeError> {
        let PgLedgerTx { tx, op_timeout } = *self;
        bounded(
            op_timeout,
            ChargeError::DeadlineExceeded("rollback"),
            async move { tx.rollback().await.map_err(ChargeError::from) },
        )
        .await
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, ChargeError> {
        let tx = bounded(
            self.op_timeout,
            ChargeError::TransactionStartFailed("begin timed out".to_string()),
            async {
                self.pool
                    .begin()
                    .await
                    .map_err(|e| ChargeError::TransactionStartFailed(e.to_string()))
            },
        )
        .await?;

        Ok(Box::new(PgLedgerTx {
            tx,
            op_timeout: self.op_timeout,
        }))
    }

    async fn insert(&self, charge: NewCharge) -> Result<ChargeRecord, ChargeError> {
        debug!(fk_balance_id = charge.fk_balance_id, "Insert charge");
        bounded(
            self.op_timeout,
            ChargeError::WriteFailed("insert timed out".to_string()),
            async {
                let row = sqlx::query(INSERT_SQL)
                    .bind(charge.fk_balance_id)
                    .bind(charge.charge_type.as_str())
                    .bind(&charge.currency)
                    .bind(charge.amount)
                    .bind(&charge.tenant_id)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| {
                        error!(error = %e, "INSERT statement");
                        ChargeError::WriteFailed(e.to_string())
                    })?;
                inserted(&row, charge)
            },
        )
        .await
    }

    async fn get_by_id(&self, id: i64) -> Result<ChargeRecord, ChargeError> {
        bounded(self.op_timeout, ChargeError::DeadlineExceeded("get_by_id"), async {
            let row = sqlx::query(&format!("{} WHERE id = $1", SELECT_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

            match row {
                Some(row) => row_to_record(&row),
                None => Err(ChargeError::NotFound(id)),
            }
        })
        .await
    }

    async fn list_by_balance(&self, balance_id: i64) -> Result<Vec<ChargeRecord>, ChargeError> {
        bounded(
            self.op_timeout,
            ChargeError::DeadlineExceeded("list_by_balance"),
            async {
                let rows = sqlx::query(&format!(
                    "{} WHERE fk_balance_id = $1 ORDER BY charged_at DESC, id DESC",
                    SELECT_COLUMNS
                ))
                .bind(balance_id)
                .fetch_all(&self.pool)
                .await?;

                rows.iter().map(row_to_record).collect()
            },
        )
        .await
    }
}
