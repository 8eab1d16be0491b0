//! Portico -- HTTP gateway for identity, files, forecasts and client logs.
//!
//! Every adapter is built once at startup from the YAML configuration.
//! SIGTERM/SIGINT stop accepting connections and give in-flight requests
//! `server.shutdown_timeout` seconds to finish.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use portico::config::LoggingConfig;
use portico::logging::layer::{sink_layer, sink_targets, SinkForwarder};
use portico::logging::SinkKind;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Command-line arguments for the Portico server.
#[derive(Parser, Debug)]
#[command(
    name = "portico",
    version,
    about = "HTTP gateway fronting identity, blob storage, forecast and logging services"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "portico.yaml")]
    config: String,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

/// Console output filtered by `RUST_LOG` or `logging.level`, plus the layer
/// that copies crate events into the log sink once its forwarder runs.
fn init_tracing(logging: &LoggingConfig) -> SinkForwarder {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let console: Box<dyn Layer<Registry> + Send + Sync> =
        if logging.format.eq_ignore_ascii_case("json") {
            fmt::layer().json().with_filter(filter).boxed()
        } else {
            fmt::layer().with_filter(filter).boxed()
        };

    let (sink, forwarder) = sink_layer();
    tracing_subscriber::registry()
        .with(console)
        .with(sink.with_filter(sink_targets(logging.min_level)))
        .init();
    forwarder
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = portico::config::load_config(&cli.config)?;
    let forwarder = init_tracing(&config.logging);
    info!(
        "Loaded configuration from {} (environment {})",
        cli.config, config.environment
    );

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    // Initialize Prometheus metrics recorder and register metric descriptions.
    portico::metrics::init_metrics();
    portico::metrics::describe_metrics();
    info!("Prometheus metrics initialized");

    let identity = Arc::new(portico::identity::Auth0Client::new(&config.identity)?);
    info!("Identity provider at {}", config.identity.tenant_url);

    let forecast = portico::forecast::build_service(&config.forecast)?;
    info!("Forecast provider: {}", forecast.name());

    let blobs = portico::storage::build_backend(&config.storage).await?;
    if blobs.is_none() {
        warn!("storage.connection_string is empty; file routes will fail");
    }

    let log_sink = portico::logging::build_sink(&config.logging).await?;
    info!("Log sink: {}", log_sink.kind());
    if log_sink.kind() != SinkKind::NoOp {
        tokio::spawn(forwarder.run(log_sink.clone()));
    }

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout);
    let state = Arc::new(portico::AppState {
        config,
        identity,
        forecast,
        blobs,
        log_sink,
    });

    let app = portico::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Portico listening on {}", bind_addr);

    let (signalled_tx, signalled_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = signalled_tx.send(());
        })
        .into_future();

    // Starts counting only once a signal has arrived.
    let drain_deadline = async move {
        if signalled_rx.await.is_ok() {
            tokio::time::sleep(shutdown_timeout).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = server => result?,
        _ = drain_deadline => {
            warn!(
                "In-flight requests still running after {}s, exiting",
                shutdown_timeout.as_secs()
            );
        }
    }

    info!("Portico shut down");

    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
///
/// If a handler cannot be installed that signal is simply never observed.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        },
    }
}
