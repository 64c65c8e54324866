//! API Response types and error codes
//!
//! - `ApiResponse<T>`: Unified response wrapper
//! - `ApiError`: `ChargeError` rendered as an HTTP response
//! - `error_codes`: Standard error code constants

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use utoipa::ToSchema;

use crate::error::ChargeError;

// ============================================================================
// Unified API Response Format
// ============================================================================

/// Unified API response wrapper
///
/// - code: 0 = success, non-zero = error code
/// - msg: short message description
/// - data: actual data (success) or absent (error)
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    #[schema(example = 0)]
    pub code: i32,
    #[schema(example = "ok")]
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: error_codes::SUCCESS,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: i32, msg: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::success(data)))
}

/// Error half of every handler result
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: i32,
    pub msg: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: error_codes::INVALID_PARAMETER,
            msg: msg.into(),
        }
    }
}

impl From<ChargeError> for ApiError {
    fn from(e: ChargeError) -> Self {
        let status =
            StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self {
            status,
            code: error_codes::for_error(&e),
            msg: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::error(self.code, self.msg))).into_response()
    }
}

// ============================================================================
// Response DTOs
// ============================================================================

/// Service identity for `/` and `/info`
#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceInfo {
    #[schema(example = "balance_charges")]
    pub app_name: String,
    #[schema(example = "1.0")]
    pub api_version: String,
    #[schema(example = "a1b2c3d")]
    pub git_hash: String,
    pub pod_name: String,
    pub pid: u32,
    pub breaker_state: String,
}

/// Health check response data
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Server timestamp in milliseconds
    #[schema(example = 1703494800000_u64)]
    pub timestamp_ms: u64,
}

/// Request headers as received
#[derive(Debug, Serialize, ToSchema)]
pub struct HeaderEcho {
    pub headers: BTreeMap<String, String>,
}

/// Current reservation counter for an account
#[derive(Debug, Serialize, ToSchema)]
pub struct ReservationData {
    pub account_id: String,
    #[schema(value_type = f64)]
    pub amount: Decimal,
}

// ============================================================================
// Error Codes
// ============================================================================

/// Standard API error codes
pub mod error_codes {
    use crate::error::ChargeError;

    pub const SUCCESS: i32 = 0;

    // Client errors (1xxx)
    pub const INVALID_PARAMETER: i32 = 1001;
    pub const INSUFFICIENT_FUNDS: i32 = 1002;

    // Resource errors (4xxx)
    pub const CHARGE_NOT_FOUND: i32 = 4001;
    pub const BALANCE_NOT_FOUND: i32 = 4002;

    // Server errors (5xxx)
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const SERVICE_UNAVAILABLE: i32 = 5001;
    pub const PENDING: i32 = 5002;
    pub const UPSTREAM_ERROR: i32 = 5003;
    pub const TIMEOUT: i32 = 5004;

    pub fn for_error(e: &ChargeError) -> i32 {
        match e {
            ChargeError::InvalidAmount => INVALID_PARAMETER,
            ChargeError::InsufficientFunds => INSUFFICIENT_FUNDS,
            ChargeError::NotFound(_) => CHARGE_NOT_FOUND,
            ChargeError::BalanceNotFound(_) => BALANCE_NOT_FOUND,
            ChargeError::Pending | ChargeError::CircuitOpen => PENDING,
            ChargeError::CacheUnavailable(_) => SERVICE_UNAVAILABLE,
            ChargeError::Authority(_) => UPSTREAM_ERROR,
            ChargeError::DeadlineExceeded(_) => TIMEOUT,
            ChargeError::TransactionStartFailed(_)
            | ChargeError::WriteFailed(_)
            | ChargeError::Internal(_) => INTERNAL_ERROR,
        }
    }
}
