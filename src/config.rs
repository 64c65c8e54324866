use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config yaml: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },

    #[error("Failed to read secret {path}: {source}")]
    Secret {
        path: String,
        source: std::io::Error,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub authority: AuthorityConfig,
    #[serde(default)]
    pub reservation: ReservationConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound for one withdrawal flow, end to end
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub pod_name: String,
}

fn default_request_timeout() -> u64 {
    30
}

fn default_shutdown_timeout() -> u64 {
    60
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default)]
    pub user: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    /// Deadline applied to every ledger operation
    pub timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Directory holding `username` / `password` files (mounted pod secrets)
    #[serde(default)]
    pub secret_dir: Option<String>,
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_max_connections() -> u32 {
    10
}

impl DatabaseConfig {
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?options=-c%20search_path%3D{}",
            self.user, self.password, self.host, self.port, self.name, self.schema
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn load_secrets(&mut self) -> Result<(), ConfigError> {
        let Some(dir) = self.secret_dir.as_deref() else {
            return Ok(());
        };
        let dir = Path::new(dir);
        self.user = read_secret(&dir.join("username"))?;
        self.password = read_secret(&dir.join("password"))?;
        Ok(())
    }
}

fn read_secret(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|source| ConfigError::Secret {
            path: path.display().to_string(),
            source,
        })
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthorityConfig {
    pub url_domain: String,
    pub path: String,
    #[serde(default = "default_authority_timeout")]
    pub timeout_secs: u64,
}

fn default_authority_timeout() -> u64 {
    29
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReservationBackend {
    Redis,
    Memory,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReservationConfig {
    pub backend: ReservationBackend,
    pub redis_url: String,
    pub ttl_secs: u64,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            backend: ReservationBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            ttl_secs: crate::reservation::DEFAULT_TTL.as_secs(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BreakerConfig {
    pub name: String,
    pub failure_threshold: u32,
    pub interval_secs: u64,
    pub cooldown_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            name: "server-circuit-breaker".to_string(),
            failure_threshold: 3,
            interval_secs: 10,
            cooldown_secs: 5,
        }
    }
}

impl AppConfig {
    /// Load `config/<env>.yaml`, then apply environment overrides and secrets.
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path.clone(),
            source,
        })?;
        let mut config = Self::from_yaml(&content)?;
        config.database.load_secrets()?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply overrides; `lookup` returns the raw value for a variable name.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get("API_VERSION") {
            self.server.api_version = v;
        }
        if let Some(v) = get("POD_NAME") {
            self.server.pod_name = v;
        }
        if let Some(v) = get("PORT") {
            self.server.port = v
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { key: "PORT", value: v })?;
        }
        if let Some(v) = get("DB_HOST") {
            self.database.host = v;
        }
        if let Some(v) = get("DB_PORT") {
            self.database.port = v
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { key: "DB_PORT", value: v })?;
        }
        if let Some(v) = get("DB_NAME") {
            self.database.name = v;
        }
        if let Some(v) = get("DB_SCHEMA") {
            self.database.schema = v;
        }
        if let Some(v) = get("DB_USER") {
            self.database.user = v;
        }
        if let Some(v) = get("DB_PASSWORD") {
            self.database.password = v;
        }
        if let Some(v) = get("SERVER_URL_DOMAIN") {
            self.authority.url_domain = v;
        }
        if let Some(v) = get("SERVER_PATH") {
            self.authority.path = v;
        }
        if let Some(v) = get("REDIS_URL") {
            self.reservation.redis_url = v;
        }
        Ok(())
    }
}
