//! Server Configuration
//!
//! Configuration management for the trustee server.
//! Supports environment variables, config files, and CLI arguments.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use trustee_api::{ApiConfig, NegotiationSettings, StateSettings};
use trustee_exchange::{
    ExchangeSettings, ManagementApi, PipelineSettings, DEFAULT_ASSET_ROOT, DEFAULT_LOG_CAPACITY,
};

/// Server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server binding configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// API configuration
    #[serde(default)]
    pub api: ApiSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Trusted participants file
    #[serde(default)]
    pub whitelist: WhitelistConfig,

    /// Data exchange queue
    #[serde(default)]
    pub exchange: ExchangeConfig,

    /// Local asset cache
    #[serde(default)]
    pub storage: StorageConfig,

    /// Addresses of this connector and its peers
    #[serde(default)]
    pub connector: ConnectorConfig,
}

/// Server binding settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl ServerSettings {
    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid bind address {}:{}: {e}", self.host, self.port))
    }

    /// Get the shutdown timeout duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// CORS allowed origins
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable response compression
    #[serde(default = "default_true")]
    pub enable_compression: bool,

    /// Enable request tracing
    #[serde(default = "default_true")]
    pub enable_tracing: bool,

    /// Maximum request body size in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            enable_cors: true,
            cors_origins: default_cors_origins(),
            enable_compression: true,
            enable_tracing: true,
            max_body_size: default_max_body_size(),
        }
    }
}

impl ApiSettings {
    pub fn to_api_config(&self) -> ApiConfig {
        ApiConfig {
            enable_cors: self.enable_cors,
            cors_origins: self.cors_origins.clone(),
            enable_compression: self.enable_compression,
            enable_tracing: self.enable_tracing,
            max_body_size: self.max_body_size,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Events kept for the logs endpoint
    #[serde(default = "default_log_buffer")]
    pub buffer_capacity: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            buffer_capacity: default_log_buffer(),
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable the Prometheus exporter
    #[serde(default)]
    pub enabled: bool,

    /// Metrics port (separate from main server)
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

/// Trusted participants file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhitelistConfig {
    /// JSON array of participants seeding the whitelist
    #[serde(default = "default_whitelist_file")]
    pub file: PathBuf,

    /// Write changes back to `file`
    #[serde(default)]
    pub persist: bool,
}

impl Default for WhitelistConfig {
    fn default() -> Self {
        Self {
            file: default_whitelist_file(),
            persist: false,
        }
    }
}

/// Data exchange queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Seconds an entry may wait for its second notification
    #[serde(default = "default_not_ready_timeout")]
    pub not_ready_timeout_secs: u64,

    /// Milliseconds between queue sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,

    /// URL prefixes under which a consumer may appear when it reached us through the trustee itself
    #[serde(default = "default_trustee_prefixes")]
    pub trustee_url_prefixes: Vec<String>,

    /// Base URL used for such a consumer instead
    #[serde(default = "default_consumer_fallback")]
    pub consumer_fallback_base: String,

    /// Assets requested when a negotiation names none
    #[serde(default = "default_assets")]
    pub default_assets: Vec<String>,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            not_ready_timeout_secs: default_not_ready_timeout(),
            sweep_interval_ms: default_sweep_interval(),
            trustee_url_prefixes: default_trustee_prefixes(),
            consumer_fallback_base: default_consumer_fallback(),
            default_assets: default_assets(),
        }
    }
}

impl ExchangeConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

/// Local asset cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one file per asset
    #[serde(default = "default_asset_root")]
    pub asset_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            asset_root: default_asset_root(),
        }
    }
}

/// Connector addresses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Public URL of our whitelist API; derived from each request when unset
    #[serde(default)]
    pub public_api_url: Option<String>,

    /// Our own management API, where cached assets are registered
    #[serde(default = "default_management_url")]
    pub management_url: String,

    /// Our own connector API base, the data address of cached assets
    #[serde(default = "default_local_api")]
    pub local_api_url: String,

    /// Port of the management API on every connector
    #[serde(default = "default_management_port")]
    pub management_port: u16,

    /// Path of the management API on every connector
    #[serde(default = "default_management_path")]
    pub management_path: String,

    /// Port of the connector API on every connector
    #[serde(default = "default_protocol_port")]
    pub protocol_port: u16,

    /// Timeout of outbound requests in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            public_api_url: None,
            management_url: default_management_url(),
            local_api_url: default_local_api(),
            management_port: default_management_port(),
            management_path: default_management_path(),
            protocol_port: default_protocol_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ConnectorConfig {
    pub fn management_api(&self) -> ManagementApi {
        ManagementApi {
            port: self.management_port,
            path: self.management_path.clone(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// =============================================================================
// Default Functions
// =============================================================================

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9191
}

fn default_shutdown_timeout() -> u64 {
    5
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_max_body_size() -> usize {
    50 * 1024 * 1024 // 50MB
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_log_buffer() -> usize {
    DEFAULT_LOG_CAPACITY
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_whitelist_file() -> PathBuf {
    PathBuf::from("config/trusted-participants.json")
}

fn default_not_ready_timeout() -> u64 {
    5
}

fn default_sweep_interval() -> u64 {
    1000
}

fn default_trustee_prefixes() -> Vec<String> {
    ExchangeSettings::default().trustee_url_prefixes
}

fn default_consumer_fallback() -> String {
    ExchangeSettings::default().consumer_fallback_base
}

fn default_assets() -> Vec<String> {
    NegotiationSettings::default().default_assets
}

fn default_asset_root() -> PathBuf {
    PathBuf::from(DEFAULT_ASSET_ROOT)
}

fn default_management_url() -> String {
    PipelineSettings::default().local_management_base
}

fn default_local_api() -> String {
    PipelineSettings::default().local_api_base
}

fn default_management_port() -> u16 {
    9193
}

fn default_management_path() -> String {
    "/management/v3".to_string()
}

fn default_protocol_port() -> u16 {
    9191
}

fn default_request_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Configuration Loading
// =============================================================================

impl ServerConfig {
    /// Load configuration from environment and optional config file
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        Self::load_from(Path::new("."), config_path)
    }

    /// Load configuration with the default config locations resolved under `base_dir`
    ///
    /// Later sources win: `config/default`, `config/local`, the explicit
    /// file, then `TRUSTEE__` environment variables.
    pub fn load_from(base_dir: &Path, config_path: Option<&str>) -> anyhow::Result<Self> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        let config_dir = base_dir.join("config");
        let mut builder = config::Config::builder()
            .add_source(
                config::File::with_name(&config_dir.join("default").to_string_lossy())
                    .required(false),
            )
            .add_source(
                config::File::with_name(&config_dir.join("local").to_string_lossy())
                    .required(false),
            );

        // Explicit file overrides the default locations
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        // Add environment variables with TRUSTEE__ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("TRUSTEE")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("exchange.trustee_url_prefixes")
                .with_list_parse_key("exchange.default_assets")
                .with_list_parse_key("api.cors_origins")
                .try_parsing(true),
        );

        let server_config: ServerConfig = builder.build()?.try_deserialize()?;
        Ok(server_config)
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.storage.asset_root.as_os_str().is_empty() {
            anyhow::bail!("storage.asset_root must not be empty");
        }
        if self.exchange.sweep_interval_ms == 0 {
            anyhow::bail!("exchange.sweep_interval_ms must be greater than zero");
        }
        if self.connector.management_port == 0 {
            anyhow::bail!("connector.management_port must be greater than zero");
        }
        Ok(())
    }

    /// Create a configuration for development/testing
    pub fn development() -> Self {
        Self {
            logging: LoggingConfig {
                level: "debug".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Settings for the shared application state
    pub fn state_settings(&self) -> StateSettings {
        StateSettings {
            negotiation: NegotiationSettings {
                public_api_url: self.connector.public_api_url.clone(),
                default_assets: self.exchange.default_assets.clone(),
            },
            exchange: ExchangeSettings {
                not_ready_timeout: Duration::from_secs(self.exchange.not_ready_timeout_secs),
                trustee_url_prefixes: self.exchange.trustee_url_prefixes.clone(),
                consumer_fallback_base: self.exchange.consumer_fallback_base.clone(),
            },
            pipeline: PipelineSettings {
                connector_port: self.connector.protocol_port,
                management_port: self.connector.management_port,
                management_path: self.connector.management_path.clone(),
                local_management_base: self.connector.management_url.clone(),
                local_api_base: self.connector.local_api_url.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 9191);
        assert_eq!(config.exchange.sweep_interval(), Duration::from_secs(1));
        assert_eq!(config.storage.asset_root, PathBuf::from("opt/asset-store"));
    }

    #[test]
    fn test_validation_rejects_unusable_settings() {
        let mut config = ServerConfig::default();
        config.storage.asset_root = PathBuf::new();
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.exchange.sweep_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.connector.management_port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trustee.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 39191

[exchange]
not_ready_timeout_secs = 10
default_assets = ["report"]

[connector]
public_api_url = "http://trustee-connector:39191/api/trusted-participants"
"#,
        )
        .unwrap();

        let config = ServerConfig::load(path.to_str()).unwrap();
        assert_eq!(config.server.port, 39191);
        assert_eq!(config.server.host, "0.0.0.0");

        let settings = config.state_settings();
        assert_eq!(settings.exchange.not_ready_timeout, Duration::from_secs(10));
        assert_eq!(settings.negotiation.default_assets, vec!["report".to_string()]);
        assert_eq!(
            settings.negotiation.public_api_url.as_deref(),
            Some("http://trustee-connector:39191/api/trusted-participants")
        );
        assert_eq!(settings.pipeline.management_port, 9193);
    }

    #[test]
    fn test_explicit_file_overrides_default_locations() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("config")).unwrap();
        std::fs::write(
            dir.path().join("config/default.toml"),
            "[server]\nport = 9191\n\n[logging]\nlevel = \"warn\"\n",
        )
        .unwrap();
        let explicit = dir.path().join("explicit.toml");
        std::fs::write(&explicit, "[server]\nport = 39191\n").unwrap();

        let config = ServerConfig::load_from(dir.path(), explicit.to_str()).unwrap();
        assert_eq!(config.server.port, 39191);
        // Keys the explicit file leaves out still come from config/default
        assert_eq!(config.logging.level, "warn");

        let config = ServerConfig::load_from(dir.path(), None).unwrap();
        assert_eq!(config.server.port, 9191);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        assert!(ServerConfig::load(Some("/nonexistent/trustee")).is_err());
    }
}
