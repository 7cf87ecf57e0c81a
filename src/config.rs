//! Configuration types for stock-ingest
//!
//! Loaded from TOML, then overlaid from environment variables. Database
//! credentials have no defaults and are checked by [`Config::validate`].

use crate::model::{Interval, Lookback, Symbol};
use crate::provider::{RetryPolicy, YahooConfig, YAHOO_CHART_URL};
use crate::telemetry::LogFormat;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnectOptions;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const REDACTED: &str = "********";

/// Configuration failure, fatal at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing required setting '{field}'")]
    Missing { field: &'static str },

    #[error("invalid setting '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_symbols")]
    pub symbols: Vec<Symbol>,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: ScheduleConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Price provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub lookback: Lookback,
    #[serde(default)]
    pub interval: Interval,
    /// Per-request deadline
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum in-flight fetches per run
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Per-fetch retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first; 1 disables retries
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

/// PostgreSQL configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default = "default_table")]
    pub table: String,
    /// Rows per INSERT statement
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Limit on connecting and on each statement
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// Trigger loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Trigger period; triggers align to multiples of it since the epoch
    #[serde(default = "default_every_secs")]
    pub every_secs: u64,
    /// Whole-run retries after a failed run
    #[serde(default = "default_run_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    /// Fire one trigger at startup instead of waiting for the first boundary
    #[serde(default)]
    pub run_immediately: bool,
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Prometheus exporter port; no exporter when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_port: Option<u16>,
}

fn default_symbols() -> Vec<Symbol> {
    ["TSLA", "AAPL", "GOOGL", "MSFT", "AMZN"]
        .into_iter()
        .map(Symbol::new)
        .collect()
}
fn default_base_url() -> String {
    YAHOO_CHART_URL.to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_concurrency() -> usize {
    4
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (compatible; stock-ingest)".to_string()
}
fn default_max_attempts() -> u32 {
    2
}
fn default_initial_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    5000
}
fn default_db_host() -> String {
    "postgres".to_string()
}
fn default_db_port() -> u16 {
    5432
}
fn default_table() -> String {
    "stock_prices".to_string()
}
fn default_chunk_size() -> usize {
    crate::store::DEFAULT_CHUNK_SIZE
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_every_secs() -> u64 {
    3600
}
fn default_run_retries() -> u32 {
    2
}
fn default_retry_delay_secs() -> u64 {
    300
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            provider: ProviderConfig::default(),
            database: DatabaseConfig::default(),
            scheduler: ScheduleConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            lookback: Lookback::default(),
            interval: Interval::default(),
            timeout_secs: default_timeout_secs(),
            concurrency: default_concurrency(),
            user_agent: default_user_agent(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            name: None,
            user: None,
            password: None,
            table: default_table(),
            chunk_size: default_chunk_size(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            every_secs: default_every_secs(),
            retries: default_run_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            run_immediately: false,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metrics_port: None,
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| REDACTED))
            .field("table", &self.table)
            .field("chunk_size", &self.chunk_size)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Overlay values from the process environment
    pub fn apply_process_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup`; blank values are ignored
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = get("POSTGRES_HOST") {
            self.database.host = host;
        }
        if let Some(port) = get("POSTGRES_PORT") {
            self.database.port = port.trim().parse().map_err(|_| ConfigError::Invalid {
                field: "POSTGRES_PORT",
                reason: format!("'{}' is not a port number", port),
            })?;
        }
        if let Some(name) = get("POSTGRES_DB") {
            self.database.name = Some(name);
        }
        if let Some(user) = get("POSTGRES_USER") {
            self.database.user = Some(user);
        }
        if let Some(password) = get("POSTGRES_PASSWORD") {
            self.database.password = Some(password);
        }

        if let Some(symbols) = get("INGEST_SYMBOLS") {
            self.symbols = symbols
                .split(',')
                .map(Symbol::new)
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(lookback) = get("INGEST_LOOKBACK") {
            self.provider.lookback = lookback.parse().map_err(|e| ConfigError::Invalid {
                field: "INGEST_LOOKBACK",
                reason: format!("{}", e),
            })?;
        }
        if let Some(interval) = get("INGEST_INTERVAL") {
            self.provider.interval = interval.parse().map_err(|e| ConfigError::Invalid {
                field: "INGEST_INTERVAL",
                reason: format!("{}", e),
            })?;
        }

        Ok(())
    }

    /// Check the configuration before anything is fetched
    ///
    /// Database credentials are only required when `require_database` is
    /// set; dry runs skip them.
    pub fn validate(&self, require_database: bool) -> Result<(), ConfigError> {
        if self.symbols.is_empty() {
            return Err(ConfigError::Missing { field: "symbols" });
        }
        if let Some(blank) = self.symbols.iter().find(|s| s.is_empty()) {
            return Err(ConfigError::Invalid {
                field: "symbols",
                reason: format!("blank symbol '{}'", blank),
            });
        }

        let provider = &self.provider;
        if !provider.base_url.starts_with("http://") && !provider.base_url.starts_with("https://")
        {
            return Err(invalid("provider.base_url", "must be an http(s) URL"));
        }
        if provider.timeout_secs == 0 {
            return Err(invalid("provider.timeout_secs", "must be positive"));
        }
        if provider.concurrency == 0 {
            return Err(invalid("provider.concurrency", "must be positive"));
        }
        if provider.retry.max_attempts == 0 {
            return Err(invalid("provider.retry.max_attempts", "must be at least 1"));
        }
        if self.scheduler.every_secs == 0 {
            return Err(invalid("scheduler.every_secs", "must be positive"));
        }

        if require_database {
            let db = &self.database;
            if db.name.is_none() {
                return Err(ConfigError::Missing {
                    field: "database.name (POSTGRES_DB)",
                });
            }
            if db.user.is_none() {
                return Err(ConfigError::Missing {
                    field: "database.user (POSTGRES_USER)",
                });
            }
            if db.password.is_none() {
                return Err(ConfigError::Missing {
                    field: "database.password (POSTGRES_PASSWORD)",
                });
            }
            if db.chunk_size == 0 {
                return Err(invalid("database.chunk_size", "must be positive"));
            }
        }

        Ok(())
    }

    /// Copy with secrets masked, for display
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.database.password.is_some() {
            config.database.password = Some(REDACTED.to_string());
        }
        config
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

impl ProviderConfig {
    pub fn yahoo(&self) -> YahooConfig {
        YahooConfig {
            base_url: self.base_url.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            user_agent: self.user_agent.clone(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

impl DatabaseConfig {
    /// Connection options; fails if a credential is missing
    pub fn connect_options(&self) -> Result<PgConnectOptions, ConfigError> {
        let name = self.name.as_deref().ok_or(ConfigError::Missing {
            field: "database.name (POSTGRES_DB)",
        })?;
        let user = self.user.as_deref().ok_or(ConfigError::Missing {
            field: "database.user (POSTGRES_USER)",
        })?;
        let password = self.password.as_deref().ok_or(ConfigError::Missing {
            field: "database.password (POSTGRES_PASSWORD)",
        })?;

        Ok(PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(name)
            .username(user)
            .password(password))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl ScheduleConfig {
    pub fn every(&self) -> Duration {
        Duration::from_secs(self.every_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}
