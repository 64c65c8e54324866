//! HTTP handlers
//!
//! Thin adapters from axum extractors to the charge coordinators. All
//! failures flow through [`ApiError`], which maps `ChargeError` to a status.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};

use super::state::AppState;
use super::types::{
    ApiError, ApiResponse, ApiResult, HeaderEcho, HealthResponse, ReservationData, ServiceInfo,
    error_codes, ok,
};
use crate::models::{ChargeRecord, NewCharge, WithdrawRequest};

const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Service identity
#[utoipa::path(
    get,
    path = "/info",
    responses((status = 200, description = "Service info", body = ServiceInfo)),
    tag = "System"
)]
pub async fn info(State(state): State<Arc<AppState>>) -> ApiResult<ServiceInfo> {
    ok(ServiceInfo {
        app_name: env!("CARGO_PKG_NAME").to_string(),
        api_version: state.api_version.clone(),
        git_hash: env!("GIT_HASH").to_string(),
        pod_name: state.pod_name.clone(),
        pid: std::process::id(),
        breaker_state: state.reader.breaker_state().to_string(),
    })
}

/// Health check endpoint
///
/// - Healthy: 200 OK + {code: 0, data: {timestamp_ms}}
/// - Unhealthy: 503 Service Unavailable + {code: 5001, msg: "unavailable"}
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service healthy", body = HealthResponse),
        (status = 503, description = "Database unreachable")
    ),
    tag = "System"
)]
pub async fn health(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ApiResponse<HealthResponse>>) {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    let healthy = match state.db {
        Some(ref db) => match tokio::time::timeout(HEALTH_PROBE_TIMEOUT, db.health_check()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::error!("[HEALTH] PostgreSQL ping failed: {}", e);
                false
            }
            Err(_) => {
                tracing::error!("[HEALTH] PostgreSQL ping timed out");
                false
            }
        },
        None => false,
    };

    if healthy {
        (
            StatusCode::OK,
            Json(ApiResponse::success(HealthResponse {
                timestamp_ms: now_ms,
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse {
                code: error_codes::SERVICE_UNAVAILABLE,
                msg: "unavailable".to_string(),
                data: None,
            }),
        )
    }
}

/// Liveness probe
#[utoipa::path(
    get,
    path = "/live",
    responses((status = 200, description = "Process alive", body = bool)),
    tag = "System"
)]
pub async fn live() -> ApiResult<bool> {
    ok(true)
}

/// Echo request headers
#[utoipa::path(
    get,
    path = "/header",
    responses((status = 200, description = "Request headers", body = HeaderEcho)),
    tag = "System"
)]
pub async fn header(headers: HeaderMap) -> ApiResult<HeaderEcho> {
    let headers = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or("<binary>").to_string(),
            )
        })
        .collect::<BTreeMap<_, _>>();
    ok(HeaderEcho { headers })
}

/// Record a charge without reservation
#[utoipa::path(
    post,
    path = "/add",
    request_body = NewCharge,
    responses(
        (status = 200, description = "Charge recorded", body = ChargeRecord),
        (status = 400, description = "Zero amount"),
        (status = 404, description = "Unknown account"),
        (status = 502, description = "Balance authority failed")
    ),
    tag = "Charges"
)]
pub async fn add(
    State(state): State<Arc<AppState>>,
    Json(charge): Json<NewCharge>,
) -> ApiResult<ChargeRecord> {
    let record = state.charges.add(charge).await?;
    ok(record)
}

/// Unguarded point read
#[utoipa::path(
    get,
    path = "/get/{id}",
    params(("id" = i64, Path, description = "Charge id")),
    responses(
        (status = 200, description = "Charge found", body = ChargeRecord),
        (status = 404, description = "No such charge")
    ),
    tag = "Charges"
)]
pub async fn get(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<ChargeRecord> {
    let id = parse_id(&id)?;
    ok(state.charges.get(id).await?)
}

/// Breaker-guarded point read
#[utoipa::path(
    get,
    path = "/getCb/{id}",
    params(("id" = i64, Path, description = "Charge id")),
    responses(
        (status = 200, description = "Charge found", body = ChargeRecord),
        (status = 404, description = "No such charge"),
        (status = 503, description = "Breaker open, retry later")
    ),
    tag = "Charges"
)]
pub async fn get_guarded(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<ChargeRecord> {
    let id = parse_id(&id)?;
    ok(state.reader.get_guarded(id).await?)
}

/// Charges of an account, newest first
#[utoipa::path(
    get,
    path = "/list/{account_id}",
    params(("account_id" = String, Path, description = "Account id")),
    responses(
        (status = 200, description = "Charges", body = Vec<ChargeRecord>),
        (status = 404, description = "Unknown account")
    ),
    tag = "Charges"
)]
pub async fn list(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<String>,
) -> ApiResult<Vec<ChargeRecord>> {
    ok(state.charges.list_by_account(&account_id).await?)
}

/// Reserve, check funds, record and push a withdrawal
#[utoipa::path(
    post,
    path = "/withdraw",
    request_body = WithdrawRequest,
    responses(
        (status = 200, description = "Withdrawal recorded", body = ChargeRecord),
        (status = 400, description = "Zero amount"),
        (status = 422, description = "Insufficient funds"),
        (status = 503, description = "Reservation cache unavailable"),
        (status = 504, description = "Deadline exceeded")
    ),
    tag = "Charges"
)]
pub async fn withdraw(
    State(state): State<Arc<AppState>>,
    Json(req): Json<WithdrawRequest>,
) -> ApiResult<ChargeRecord> {
    let account_id = req.account_id.clone();
    match state.withdrawals.withdraw(req).await {
        Ok(record) => ok(record),
        Err(e) => {
            if e.is_business() {
                tracing::info!(account_id = %account_id, "Withdrawal rejected: {}", e);
            } else {
                tracing::error!(account_id = %account_id, "Withdrawal failed: {}", e);
            }
            Err(e.into())
        }
    }
}

/// Reservation counter diagnostic
#[utoipa::path(
    get,
    path = "/getCache/{account_id}",
    params(("account_id" = String, Path, description = "Account id")),
    responses(
        (status = 200, description = "Current reservation", body = ReservationData),
        (status = 503, description = "Reservation cache unavailable")
    ),
    tag = "Charges"
)]
pub async fn get_cache(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<String>,
) -> ApiResult<ReservationData> {
    let amount = state.charges.peek_reservation(&account_id).await?;
    ok(ReservationData { account_id, amount })
}

fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>()
        .map_err(|_| ApiError::bad_request(format!("invalid charge id: {}", raw)))
}
