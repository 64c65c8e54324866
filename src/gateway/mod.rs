pub mod handlers;
pub mod openapi;
pub mod state;
pub mod types;

use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Request, header},
    middleware::{Next, from_fn},
    response::Response,
    routing::{get, post},
};
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::ServerConfig;
use state::AppState;

/// Logs each request and stamps JSON/CORS response headers.
async fn request_log_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    debug!(method = %method, path = %path, headers = ?request.headers(), "Request");

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(
            "Content-Type,access-control-allow-origin, access-control-allow-headers",
        ),
    );
    debug!(method = %method, path = %path, status = response.status().as_u16(), "Response");
    response
}

/// Build the complete router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::info))
        .route("/info", get(handlers::info))
        .route("/health", get(handlers::health))
        .route("/live", get(handlers::live))
        .route("/header", get(handlers::header))
        .route("/add", post(handlers::add))
        .route("/get/{id}", get(handlers::get))
        .route("/getCb/{id}", get(handlers::get_guarded))
        .route("/list/{account_id}", get(handlers::list))
        .route("/withdraw", post(handlers::withdraw))
        .route("/getCache/{account_id}", get(handlers::get_cache))
        .layer(from_fn(request_log_middleware))
        .with_state(state)
        // OpenAPI / Swagger UI (stateless, added after with_state)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

/// Start the HTTP server; returns after a graceful shutdown.
///
/// In-flight requests get `shutdown_timeout_secs` to finish once a signal
/// arrives.
pub async fn run_server(config: &ServerConfig, state: Arc<AppState>) -> std::io::Result<()> {
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("🚀 Balance charges listening on http://{}", addr);
    info!("📖 API Docs: http://{}/docs", addr);

    let stop = Arc::new(Notify::new());
    let server = axum::serve(listener, app).with_graceful_shutdown({
        let stop = stop.clone();
        async move { stop.notified().await }
    });
    let mut server = tokio::spawn(server.into_future());

    tokio::select! {
        result = &mut server => return result.map_err(std::io::Error::other)?,
        _ = shutdown_signal() => {}
    }

    stop.notify_one();
    let grace = Duration::from_secs(config.shutdown_timeout_secs);
    match tokio::time::timeout(grace, server).await {
        Ok(result) => result.map_err(std::io::Error::other)?,
        Err(_) => {
            warn!(grace_secs = grace.as_secs(), "Graceful shutdown timed out, dropping connections");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use rust_decimal::Decimal;
    use std::time::Duration;
    use tower::ServiceExt;

    use crate::authority::MockAuthority;
    use crate::breaker::Settings;
    use crate::charges::{ChargeService, ReadCoordinator, WithdrawalCoordinator};
    use crate::ledger::MemoryLedger;
    use crate::reservation::MemoryReservationCache;

    fn test_router() -> Router {
        let ledger = Arc::new(MemoryLedger::new());
        let cache = Arc::new(MemoryReservationCache::new(Duration::from_secs(60)));
        let authority = Arc::new(MockAuthority::new().with_balance("ACC-1", 7, 100));

        let charges = Arc::new(ChargeService::new(ledger.clone(), cache.clone(), authority.clone()));
        let withdrawals = Arc::new(WithdrawalCoordinator::new(
            ledger.clone(),
            cache,
            authority,
            Duration::from_secs(30),
        ));
        let reader = Arc::new(ReadCoordinator::new(ledger, Settings::new("test")));
        let state = AppState::new(charges, withdrawals, reader, None).with_identity("2.1", "pod-a");
        build_router(Arc::new(state))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_info_reports_identity() {
        let response = test_router().oneshot(get_req("/info")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );

        let body = body_json(response).await;
        assert_eq!(body["code"], 0);
        assert_eq!(body["data"]["api_version"], "2.1");
        assert_eq!(body["data"]["pod_name"], "pod-a");
        assert_eq!(body["data"]["breaker_state"], "CLOSED");
    }

    #[tokio::test]
    async fn test_health_without_database_is_unavailable() {
        let response = test_router().oneshot(get_req("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_withdraw_then_read_back() {
        let router = test_router();

        let response = router
            .clone()
            .oneshot(post_json(
                "/withdraw",
                serde_json::json!({
                    "account_id": "ACC-1",
                    "amount": -30,
                    "currency": "BRL",
                    "tenant_id": "T1"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["type_charge"], "DEBIT");
        assert_eq!(body["data"]["fk_balance_id"], 7);
        let id = body["data"]["id"].as_i64().unwrap();

        let response = router
            .clone()
            .oneshot(get_req(&format!("/getCb/{}", id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router.oneshot(get_req("/getCache/ACC-1")).await.unwrap();
        let body = body_json(response).await;
        let amount: Decimal = serde_json::from_value(body["data"]["amount"].clone()).unwrap();
        assert!(amount.is_zero());
    }

    #[tokio::test]
    async fn test_insufficient_funds_is_422() {
        let response = test_router()
            .oneshot(post_json(
                "/withdraw",
                serde_json::json!({
                    "account_id": "ACC-1",
                    "amount": -150,
                    "currency": "BRL",
                    "tenant_id": "T1"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["code"], types::error_codes::INSUFFICIENT_FUNDS);
        assert!(body.get("data").is_none());
    }

    #[tokio::test]
    async fn test_missing_charge_is_404_and_bad_id_is_400() {
        let router = test_router();
        let response = router.clone().oneshot(get_req("/get/42")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = router.oneshot(get_req("/getCb/abc")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_unknown_account_is_404() {
        let response = test_router()
            .oneshot(get_req("/list/ACC-404"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["code"], types::error_codes::BALANCE_NOT_FOUND);
    }
}
