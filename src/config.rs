use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,

    #[serde(default = "default_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub db_min_connections: u32,
    #[serde(default = "default_connect_timeout")]
    pub db_connect_timeout_secs: u64,
    #[serde(default)]
    pub auto_migrate: bool,

    /// Upper bound on transactions attached to a single order or checkout.
    #[serde(default = "default_transaction_items_limit")]
    pub transaction_items_limit: u64,

    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Base URL prefixed to stored media paths when building redirects.
    #[serde(default = "default_media_base_url")]
    pub media_base_url: String,

    pub cors_allowed_origins: Option<Vec<String>>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_connections() -> u32 {
    100
}

fn default_min_connections() -> u32 {
    5
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_transaction_items_limit() -> u64 {
    100
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_media_base_url() -> String {
    "/media".to_string()
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Layered configuration: config/default.toml, then the RUN_ENV overlay,
/// then APP__* environment variables.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let run_env = env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

    let config = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{}", run_env)).required(false))
        .add_source(
            Environment::with_prefix("APP")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    config.try_deserialize()
}

/// Installs the global tracing subscriber. RUST_LOG wins over the
/// configured level when set.
pub fn init_tracing(log_level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: AppConfig = serde_json::from_value(serde_json::json!({
            "database_url": "sqlite::memory:"
        }))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.transaction_items_limit, 100);
        assert_eq!(config.media_base_url, "/media");
        assert!(!config.auto_migrate);
    }

    #[test]
    fn server_addr_combines_host_and_port() {
        let config: AppConfig = serde_json::from_value(serde_json::json!({
            "database_url": "sqlite::memory:",
            "host": "127.0.0.1",
            "port": 3000
        }))
        .unwrap();
        assert_eq!(config.server_addr(), "127.0.0.1:3000");
    }
}
