//! Balance Charges service entry point
//!
//! Usage: `balance_charges [--env dev] [--port 5001]`

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use balance_charges::authority::{BalanceAuthority, RestBalanceAuthority};
use balance_charges::breaker::Settings;
use balance_charges::charges::{ChargeService, ReadCoordinator, WithdrawalCoordinator};
use balance_charges::config::{AppConfig, ReservationBackend, ReservationConfig};
use balance_charges::db::Database;
use balance_charges::gateway::{self, state::AppState};
use balance_charges::ledger::{LedgerStore, PgLedgerStore};
use balance_charges::reservation::{
    MemoryReservationCache, RedisReservationCache, ReservationCache,
};

/// Interval for sweeping expired in-memory counters
const PURGE_INTERVAL: Duration = Duration::from_secs(30);

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

async fn build_reservations(config: &ReservationConfig) -> anyhow::Result<Arc<dyn ReservationCache>> {
    let ttl = Duration::from_secs(config.ttl_secs);
    match config.backend {
        ReservationBackend::Redis => {
            let cache = RedisReservationCache::connect(&config.redis_url, ttl)
                .await
                .context("connecting reservation cache")?;
            cache.ping().await.context("pinging reservation cache")?;
            Ok(Arc::new(cache))
        }
        ReservationBackend::Memory => {
            tracing::warn!("Using in-memory reservations; withdrawals are only coordinated within this process");
            let cache = Arc::new(MemoryReservationCache::new(ttl));
            let sweeper = cache.clone();
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(PURGE_INTERVAL);
                loop {
                    tick.tick().await;
                    let purged = sweeper.purge_expired();
                    if purged > 0 {
                        tracing::debug!(purged, live = sweeper.len(), "Expired reservations purged");
                    }
                }
            });
            Ok(cache as Arc<dyn ReservationCache>)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let mut app_config = AppConfig::load(&env).with_context(|| format!("loading config for env {}", env))?;
    if let Some(port) = get_port_override() {
        app_config.server.port = port;
    }
    let _log_guard = balance_charges::logging::init_logging(&app_config);

    tracing::info!(
        env = %env,
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("GIT_HASH"),
        "Starting balance charges service"
    );

    let db = Arc::new(
        Database::connect_with_retry(&app_config.database)
            .await
            .context("connecting to PostgreSQL")?,
    );
    db.init_schema().await.context("initializing schema")?;

    let ledger: Arc<dyn LedgerStore> = Arc::new(PgLedgerStore::new(
        db.pool().clone(),
        app_config.database.timeout(),
    ));
    let authority: Arc<dyn BalanceAuthority> =
        Arc::new(RestBalanceAuthority::new(&app_config.authority)?);
    let reservations = build_reservations(&app_config.reservation).await?;

    let breaker = Settings::from_config(&app_config.breaker);

    let charges = Arc::new(ChargeService::new(
        ledger.clone(),
        reservations.clone(),
        authority.clone(),
    ));
    let withdrawals = Arc::new(WithdrawalCoordinator::new(
        ledger.clone(),
        reservations,
        authority,
        Duration::from_secs(app_config.server.request_timeout_secs),
    ));
    let reader = Arc::new(ReadCoordinator::new(ledger, breaker));

    let state = AppState::new(charges, withdrawals, reader, Some(db)).with_identity(
        &app_config.server.api_version,
        &app_config.server.pod_name,
    );

    gateway::run_server(&app_config.server, Arc::new(state))
        .await
        .context("HTTP server")?;

    tracing::info!("Balance charges service stopped");
    Ok(())
}
