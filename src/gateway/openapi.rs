//! OpenAPI / Swagger UI Documentation
//!
//! - Swagger UI: `http://localhost:5000/docs`
//! - OpenAPI JSON: `http://localhost:5000/api-docs/openapi.json`

use utoipa::OpenApi;

use crate::gateway::types::{HeaderEcho, HealthResponse, ReservationData, ServiceInfo};
use crate::models::{Balance, ChargeRecord, ChargeType, NewCharge, WithdrawRequest};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Balance Charges API",
        version = "1.0.0",
        description = "Append-only charge ledger with reservation-guarded withdrawals."
    ),
    paths(
        crate::gateway::handlers::info,
        crate::gateway::handlers::health,
        crate::gateway::handlers::live,
        crate::gateway::handlers::header,
        crate::gateway::handlers::add,
        crate::gateway::handlers::get,
        crate::gateway::handlers::get_guarded,
        crate::gateway::handlers::list,
        crate::gateway::handlers::withdraw,
        crate::gateway::handlers::get_cache,
    ),
    components(schemas(
        ServiceInfo,
        HealthResponse,
        HeaderEcho,
        ReservationData,
        ChargeRecord,
        ChargeType,
        NewCharge,
        WithdrawRequest,
        Balance,
    )),
    tags(
        (name = "System", description = "Identity and probes"),
        (name = "Charges", description = "Charge ledger and withdrawals")
    )
)]
pub struct ApiDoc;
