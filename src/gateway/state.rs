use std::sync::Arc;

use crate::charges::{ChargeService, ReadCoordinator, WithdrawalCoordinator};
use crate::db::Database;

/// Gateway application state (shared)
#[derive(Clone)]
pub struct AppState {
    pub charges: Arc<ChargeService>,
    pub withdrawals: Arc<WithdrawalCoordinator>,
    pub reader: Arc<ReadCoordinator>,
    /// Probed by `/health`; absent means unhealthy
    pub db: Option<Arc<Database>>,
    pub api_version: String,
    pub pod_name: String,
}

impl AppState {
    pub fn new(
        charges: Arc<ChargeService>,
        withdrawals: Arc<WithdrawalCoordinator>,
        reader: Arc<ReadCoordinator>,
        db: Option<Arc<Database>>,
    ) -> Self {
        Self {
            charges,
            withdrawals,
            reader,
            db,
            api_version: env!("CARGO_PKG_VERSION").to_string(),
            pod_name: String::new(),
        }
    }

    pub fn with_identity(mut self, api_version: &str, pod_name: &str) -> Self {
        if !api_version.is_empty() {
            self.api_version = api_version.to_string();
        }
        self.pod_name = pod_name.to_string();
        self
    }
}
