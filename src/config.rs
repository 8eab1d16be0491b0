//! Configuration loading and types for Portico.
//!
//! Configuration is read from an optional YAML file and deserialized into
//! the [`Config`] struct, then environment variables are layered on top.
//! Each subsection governs a different part of the service: networking,
//! the identity provider, blob storage, the forecast source, and logging.

use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use crate::logging::LogLevel;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Deployment environment reported by `ping`.
    #[serde(default)]
    pub environment: EnvironmentType,

    /// OAuth2 / OIDC identity provider settings.
    #[serde(default)]
    pub identity: IdentityConfig,

    /// File store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Weather forecast source.
    #[serde(default)]
    pub forecast: ForecastConfig,

    /// Diagnostics and log sink settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum EnvironmentType {
    #[default]
    Unknown,
    Local,
    Development,
    Testing,
    Staging,
    Production,
}

impl From<String> for EnvironmentType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or(EnvironmentType::Unknown)
    }
}

impl FromStr for EnvironmentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(EnvironmentType::Local),
            "development" | "dev" => Ok(EnvironmentType::Development),
            "testing" | "test" => Ok(EnvironmentType::Testing),
            "staging" | "stage" => Ok(EnvironmentType::Staging),
            "production" | "prod" => Ok(EnvironmentType::Production),
            "unknown" => Ok(EnvironmentType::Unknown),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

impl fmt::Display for EnvironmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnvironmentType::Unknown => "Unknown",
            EnvironmentType::Local => "Local",
            EnvironmentType::Development => "Development",
            EnvironmentType::Testing => "Testing",
            EnvironmentType::Staging => "Staging",
            EnvironmentType::Production => "Production",
        };
        f.write_str(name)
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,

    /// Maximum upload body size in bytes (default 100 MiB).
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout: default_shutdown_timeout(),
            max_upload_size: default_max_upload_size(),
        }
    }
}

/// Identity provider settings.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,

    /// Base URL of the tenant, e.g. `https://example.us.auth0.com`.
    #[serde(default)]
    pub tenant_url: String,

    /// Registered OAuth redirect URI (this service's `token` route).
    #[serde(default)]
    pub callback_url: String,

    /// Loopback port used when a login request supplies none.
    #[serde(default = "default_loopback_port")]
    pub default_port: u16,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            tenant_url: String::new(),
            callback_url: String::new(),
            default_port: default_loopback_port(),
        }
    }
}

/// File store settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Storage account connection string, or `memory` for an in-process
    /// store.  Empty disables the file routes.
    #[serde(default)]
    pub connection_string: String,

    /// Container that uploads go to and downloads come from.
    #[serde(default = "default_container")]
    pub default_container: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            connection_string: String::new(),
            default_container: default_container(),
        }
    }
}

/// Which forecast adapter to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForecastProvider {
    /// Random five-day forecast.
    #[default]
    Mock,
    /// National Weather Service grid forecast.
    Nws,
}

/// Forecast settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ForecastConfig {
    #[serde(default)]
    pub provider: ForecastProvider,

    /// Base URL of the weather API.
    #[serde(default = "default_forecast_base_url")]
    pub base_url: String,

    /// Forecast office identifier.
    #[serde(default = "default_station")]
    pub station: String,

    /// `x,y` grid coordinates within the office's area.
    #[serde(default = "default_grid")]
    pub grid: String,

    /// The weather API rejects requests without a User-Agent.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            provider: ForecastProvider::default(),
            base_url: default_forecast_base_url(),
            station: default_station(),
            grid: default_grid(),
            user_agent: default_user_agent(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Diagnostics level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Diagnostics format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log sink connection string.  `mongodb...` selects the document
    /// store, anything else non-blank the table store, blank disables.
    #[serde(default)]
    pub connection_string: String,

    /// Records below this level are not written to the sink.
    #[serde(default)]
    pub min_level: LogLevel,

    /// Source label stamped on every record.
    #[serde(default = "default_source")]
    pub source: String,

    /// Document store database when the connection string names none.
    #[serde(default = "default_database")]
    pub database: String,

    /// Cap on records returned by a single listing.
    #[serde(default = "default_max_records")]
    pub max_records: usize,

    /// Purge document store records older than this many days at startup.
    #[serde(default)]
    pub retention_days: Option<i64>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            connection_string: String::new(),
            min_level: LogLevel::default(),
            source: default_source(),
            database: default_database(),
            max_records: default_max_records(),
            retention_days: None,
        }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    7071
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_max_upload_size() -> usize {
    100 * 1024 * 1024
}

fn default_loopback_port() -> u16 {
    crate::oauth::FALLBACK_PORT
}

fn default_container() -> String {
    "files".to_string()
}

fn default_forecast_base_url() -> String {
    "https://api.weather.gov".to_string()
}

fn default_station() -> String {
    "HGX".to_string()
}

fn default_grid() -> String {
    "65,97".to_string()
}

fn default_user_agent() -> String {
    format!("portico/{}", env!("CARGO_PKG_VERSION"))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_source() -> String {
    env!("CARGO_PKG_NAME").to_string()
}

fn default_database() -> String {
    "logs".to_string()
}

fn default_max_records() -> usize {
    200
}

// -- Loader ------------------------------------------------------------------

/// Load configuration from the YAML file at `path` (if it exists), then
/// apply environment variable overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let mut config = if path.exists() {
        let contents = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&contents)?
    } else {
        info!(
            "Configuration file {} not found, using defaults",
            path.display()
        );
        Config::default()
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Override configuration values from the environment.  `lookup` returns
/// the value of a variable, if set.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("APP_ENVIRONMENT") {
        config.environment = EnvironmentType::from(v);
    }
    if let Some(v) = get("connStr") {
        config.logging.connection_string = v;
    }
    if let Some(v) = get("ID_CLIENT_ID") {
        config.identity.client_id = v;
    }
    if let Some(v) = get("ID_CLIENT_SECRET") {
        config.identity.client_secret = v;
    }
    if let Some(v) = get("ID_TENANT_URL") {
        config.identity.tenant_url = v.trim_end_matches('/').to_string();
    }
    if let Some(v) = get("OAUTH_CALLBACK_URL") {
        config.identity.callback_url = v;
    }
    if let Some(port) = get("DEFAULT_PORT").and_then(|v| v.trim().parse().ok()) {
        config.identity.default_port = port;
    }
    if let Some(v) = get("FILE_STORE") {
        config.storage.connection_string = v;
    }
    if let Some(v) = get("DEFAULT_CONTAINER") {
        config.storage.default_container = v;
    }
    if let Some(port) = get("PORT").and_then(|v| v.trim().parse().ok()) {
        config.server.port = port;
    }
}
