//! REST client for the balance service

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, error};

use super::BalanceAuthority;
use crate::config::AuthorityConfig;
use crate::error::ChargeError;
use crate::models::Balance;

pub struct RestBalanceAuthority {
    client: reqwest::Client,
    url_domain: String,
    path: String,
}

impl RestBalanceAuthority {
    pub fn new(config: &AuthorityConfig) -> Result<Self, ChargeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ChargeError::Authority(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url_domain: config.url_domain.trim_end_matches('/').to_string(),
            path: config.path.clone(),
        })
    }

    fn balance_url(&self, account_id: &str) -> String {
        format!("{}{}/{}", self.url_domain, self.path, account_id)
    }

    fn update_url(&self, account_id: &str) -> String {
        format!("{}/update/{}", self.url_domain, account_id)
    }
}

/// Map a non-200 status to the error callers branch on
fn status_error(status: StatusCode, account_id: &str) -> ChargeError {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => {
            ChargeError::BalanceNotFound(account_id.to_string())
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ChargeError::Authority(format!("forbidden ({})", status.as_u16()))
        }
        other => ChargeError::Authority(format!("unexpected status {}", other.as_u16())),
    }
}

#[async_trait]
impl BalanceAuthority for RestBalanceAuthority {
    async fn get_balance(&self, account_id: &str) -> Result<Balance, ChargeError> {
        let url = self.balance_url(account_id);
        debug!(url = %url, "GET balance");

        let resp = self.client.get(&url).send().await.map_err(|e| {
            error!(url = %url, error = %e, "Balance request failed");
            ChargeError::from(e)
        })?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(status_error(status, account_id));
        }

        let mut balance: Balance = resp.json().await.map_err(|e| {
            error!(url = %url, error = %e, "Bad balance payload");
            ChargeError::Authority(format!("bad balance payload: {}", e))
        })?;
        if balance.account_id.is_empty() {
            balance.account_id = account_id.to_string();
        }
        Ok(balance)
    }

    async fn apply_balance(&self, account_id: &str, balance: &Balance) -> Result<(), ChargeError> {
        let url = self.update_url(account_id);
        debug!(url = %url, amount = %balance.amount, "POST balance update");

        let resp = self
            .client
            .post(&url)
            .json(balance)
            .send()
            .await
            .map_err(|e| {
                error!(url = %url, error = %e, "Balance update failed");
                ChargeError::from(e)
            })?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(status_error(status, account_id));
        }
        Ok(())
    }
}
