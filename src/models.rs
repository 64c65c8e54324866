//! Ledger data model
//!
//! `ChargeRecord` is append-only: created once inside a local write, never
//! updated or deleted. `Balance` belongs to the balance authority and is only
//! ever read fresh, never cached.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Credit/debit tag stored in `type_charge`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChargeType {
    Credit,
    Debit,
}

impl ChargeType {
    /// Negative amounts debit the account, everything else credits it.
    pub fn from_amount(amount: Decimal) -> Self {
        if amount.is_sign_negative() && !amount.is_zero() {
            ChargeType::Debit
        } else {
            ChargeType::Credit
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeType::Credit => "CREDIT",
            ChargeType::Debit => "DEBIT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CREDIT" => Some(ChargeType::Credit),
            "DEBIT" => Some(ChargeType::Debit),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChargeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A charge that has not been written yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NewCharge {
    pub account_id: String,
    /// Resolved from the balance authority at write time
    #[serde(default)]
    pub fk_balance_id: i64,
    #[serde(rename = "type_charge")]
    pub charge_type: ChargeType,
    #[schema(value_type = f64)]
    pub amount: Decimal,
    pub currency: String,
    pub tenant_id: String,
}

/// Persisted charge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ChargeRecord {
    pub id: i64,
    /// Known when the record was produced by this process; the table does not
    /// carry it.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub account_id: Option<String>,
    pub fk_balance_id: i64,
    #[serde(rename = "type_charge")]
    pub charge_type: ChargeType,
    #[schema(value_type = f64)]
    pub amount: Decimal,
    pub currency: String,
    pub tenant_id: String,
    pub charged_at: DateTime<Utc>,
}

impl ChargeRecord {
    pub fn from_new(id: i64, charged_at: DateTime<Utc>, charge: NewCharge) -> Self {
        Self {
            id,
            account_id: Some(charge.account_id),
            fk_balance_id: charge.fk_balance_id,
            charge_type: charge.charge_type,
            amount: charge.amount,
            currency: charge.currency,
            tenant_id: charge.tenant_id,
            charged_at,
        }
    }
}

/// Authoritative balance as served by the balance authority
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Balance {
    #[serde(rename = "id")]
    pub balance_id: i64,
    #[serde(default)]
    pub account_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

/// Withdrawal request body
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct WithdrawRequest {
    pub account_id: String,
    /// Signed amount; withdrawals are normally negative
    #[schema(value_type = f64)]
    pub amount: Decimal,
    pub currency: String,
    pub tenant_id: String,
}

impl WithdrawRequest {
    pub fn into_charge(self) -> NewCharge {
        NewCharge {
            charge_type: ChargeType::from_amount(self.amount),
            account_id: self.account_id,
            fk_balance_id: 0,
            amount: self.amount,
            currency: self.currency,
            tenant_id: self.tenant_id,
        }
    }
}
