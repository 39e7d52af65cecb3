//! Trustee Server
//!
//! Connector-side server for trusted data exchange. Every dataspace
//! participant (provider, consumer, data trustee) runs one instance.
//!
//! # Features
//!
//! - Trusted participants whitelist seeded from a JSON file
//! - Trustee negotiation between connectors
//! - Data exchange queue with a background sweeper
//! - Asset pull, anonymisation and push
//! - OpenAPI documentation with Swagger UI
//! - Prometheus metrics export
//! - Graceful shutdown handling
//!
//! # Usage
//!
//! ```bash
//! # Start with default settings
//! trustee-server
//!
//! # Start with custom config
//! trustee-server --config /path/to/config.toml
//!
//! # Start with environment overrides
//! TRUSTEE__SERVER__PORT=39191 trustee-server
//! ```

mod config;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use trustee_api::{create_router, AppState};
use trustee_exchange::{
    DataExchangeQueueManager, FileSystemAssetStore, HttpConnectorClient, LogBuffer,
};
use trustee_whitelist::TrustedParticipantsWhitelist;

use crate::config::ServerConfig;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Trustee Server - trusted participants whitelist and data trustee exchange
#[derive(Parser, Debug)]
#[command(name = "trustee-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML, JSON, or YAML)
    #[arg(short, long, env = "TRUSTEE_CONFIG")]
    config: Option<String>,

    /// Host to bind to
    #[arg(long, env = "TRUSTEE_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "TRUSTEE_PORT")]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "TRUSTEE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long, env = "TRUSTEE_LOG_FORMAT")]
    log_format: Option<String>,

    /// JSON file seeding the trusted participants whitelist
    #[arg(long, env = "TRUSTEE_WHITELIST_FILE")]
    whitelist_file: Option<String>,

    /// Directory of the local asset cache
    #[arg(long, env = "TRUSTEE_ASSET_ROOT")]
    asset_root: Option<String>,
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration
    let mut server_config = ServerConfig::load(args.config.as_deref())?;
    apply_args(&mut server_config, args);

    // Initialize logging
    let logs = LogBuffer::new(server_config.logging.buffer_capacity);
    init_logging(&server_config.logging, &logs);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Trustee Server"
    );

    // Validate configuration
    server_config.validate()?;

    // Create application state
    let state = Arc::new(init_state(&server_config, logs)?);

    // Sweep the exchange queue in the background
    let sweeper = spawn_sweeper(Arc::clone(&state.queue), server_config.exchange.sweep_interval());

    // Create router
    let app = create_router(Arc::clone(&state), server_config.api.to_api_config());

    // Start metrics server if enabled
    if server_config.metrics.enabled {
        start_metrics_server(&server_config.metrics)?;
    }

    // Get bind address
    let addr = server_config.server.socket_addr()?;

    tracing::info!(
        host = %server_config.server.host,
        port = %server_config.server.port,
        "Server listening"
    );

    // Start server with graceful shutdown
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(server_config.server.shutdown_timeout()))
        .await?;

    sweeper.abort();
    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Let CLI flags override the loaded configuration
fn apply_args(config: &mut ServerConfig, args: Args) {
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(file) = args.whitelist_file {
        config.whitelist.file = file.into();
    }
    if let Some(root) = args.asset_root {
        config.storage.asset_root = root.into();
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if let Some(format) = args.log_format {
        config.logging.format = format;
    }
}

// =============================================================================
// Initialization Functions
// =============================================================================

/// Initialize tracing/logging
///
/// Events go to stdout and to `logs`, which backs the logs endpoint.
fn init_logging(config: &config::LoggingConfig, logs: &LogBuffer) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(logs.layer());

    match config.format.as_str() {
        "json" => {
            subscriber
                .with(fmt::layer().json().with_target(true))
                .init();
        }
        _ => {
            subscriber
                .with(fmt::layer().pretty().with_target(true))
                .init();
        }
    }
}

/// Wire whitelist, connector client and asset store into the shared state
fn init_state(config: &ServerConfig, logs: LogBuffer) -> anyhow::Result<AppState> {
    let whitelist = TrustedParticipantsWhitelist::load_from_file(
        &config.whitelist.file,
        config.whitelist.persist,
    )?;
    tracing::info!(
        file = %config.whitelist.file.display(),
        participants = whitelist.len(),
        persist = config.whitelist.persist,
        "Whitelist ready"
    );

    let client = HttpConnectorClient::new(
        config.connector.management_api(),
        config.connector.request_timeout(),
    )?;
    let store = FileSystemAssetStore::new(&config.storage.asset_root)?;
    tracing::info!(root = %store.root().display(), "Asset store ready");

    Ok(AppState::new(
        Arc::new(whitelist),
        Arc::new(client),
        Arc::new(store),
        logs,
        config.state_settings(),
    ))
}

/// Periodically time out, complete and drop queued exchanges
fn spawn_sweeper(queue: Arc<DataExchangeQueueManager>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let report = queue.process_entries();
            if !report.removed.is_empty() || !report.timed_out.is_empty() {
                tracing::debug!(
                    timed_out = report.timed_out.len(),
                    completed = report.completed.len(),
                    removed = report.removed.len(),
                    "Queue swept"
                );
            }
        }
    })
}

/// Start Prometheus metrics server
fn start_metrics_server(config: &config::MetricsConfig) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    tracing::info!(port = config.port, "Starting metrics server");

    // Installs the recorder and serves /metrics from a background task
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    Ok(())
}

// =============================================================================
// Graceful Shutdown
// =============================================================================

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal(timeout: Duration) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }

    // Allow time for in-flight transfers to complete
    tracing::info!(
        timeout_secs = timeout.as_secs(),
        "Waiting for in-flight requests to complete..."
    );

    tokio::time::sleep(timeout).await;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use trustee_types::Participant;

    #[test]
    fn test_cli_parsing() {
        let args = Args::parse_from([
            "trustee-server",
            "--port",
            "39191",
            "--whitelist-file",
            "/etc/trustee/participants.json",
            "--log-format",
            "json",
        ]);
        assert_eq!(args.port, Some(39191));
        assert_eq!(args.log_level, None);

        let mut config = ServerConfig::default();
        apply_args(&mut config, args);
        assert_eq!(config.server.port, 39191);
        assert_eq!(config.logging.format, "json");
        assert_eq!(
            config.whitelist.file,
            std::path::PathBuf::from("/etc/trustee/participants.json")
        );
    }

    #[test]
    fn test_unset_flags_keep_configured_logging() {
        let args = Args::parse_from(["trustee-server"]);
        let mut config = ServerConfig::default();
        config.logging.level = "warn".to_string();
        config.logging.format = "json".to_string();

        apply_args(&mut config, args);
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.format, "json");

        let args = Args::parse_from(["trustee-server", "--log-level", "debug"]);
        apply_args(&mut config, args);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_development_config() {
        let config = ServerConfig::development();
        assert_eq!(config.server.port, 9191);
        assert_eq!(config.logging.level, "debug");
    }

    #[tokio::test]
    async fn test_init_state_seeds_whitelist() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("participants.json");
        let trustee = Participant::new("did:example:1", "DataTrustee1", "http://trustee:9191");
        std::fs::write(&file, serde_json::to_vec(&vec![trustee.clone()]).unwrap()).unwrap();

        let mut config = ServerConfig::default();
        config.whitelist.file = file;
        config.storage.asset_root = dir.path().join("assets");

        let state = init_state(&config, LogBuffer::default()).unwrap();
        assert!(state.whitelist.contains(&trustee));
        assert!(dir.path().join("assets").is_dir());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_times_out_lonely_notification() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServerConfig::default();
        config.whitelist.file = dir.path().join("missing.json");
        config.storage.asset_root = dir.path().join("assets");
        config.exchange.not_ready_timeout_secs = 0;

        let state = init_state(&config, LogBuffer::default()).unwrap();
        state
            .queue
            .add_provider_notification(
                Participant::anonymous("provider", "http://provider:9191/api/trusted-participants"),
                vec!["asset1".into()],
            )
            .await;
        assert_eq!(state.queue.entries().len(), 1);

        let sweeper = spawn_sweeper(Arc::clone(&state.queue), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        sweeper.abort();

        assert!(state.queue.entries().is_empty());
    }
}
