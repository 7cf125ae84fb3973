//! Prometheus exporter for Transport NSW car park occupancy.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use transport_nsw_exporter::{
    ApiClient, CarParkCollector, CarParkDescriptors, ExporterConfig, HttpServer, Lifecycle,
    ServerError,
};

/// Prometheus exporter for Transport NSW car park occupancy.
#[derive(Parser, Debug)]
#[command(name = "transport-nsw-exporter")]
#[command(about = "Export Transport NSW car park occupancy as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: PathBuf,

    /// HTTP listen address (overrides config).
    #[arg(long = "web.listen-address")]
    listen_address: Option<String>,

    /// Log level (trace, debug, info, warn, error). Overrides config.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = ExporterConfig::load_from_file(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;

    // Override listen address from CLI
    if let Some(listen) = args.listen_address {
        config.web.listen = listen;
        config.validate()?;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    transport_nsw_common::init_tracing(&config.logging)?;

    info!("Starting Transport NSW exporter");

    let token = config.api_token()?;
    let client = ApiClient::new(&config.upstream, &token)?;

    let collector = Arc::new(CarParkCollector::new(
        Arc::new(client),
        config.collectors.carpark.facility_ids.clone(),
        CarParkDescriptors::new(&config.metrics.namespace),
    ));

    info!(
        facilities = ?collector.facility_ids(),
        namespace = %collector.descriptors().namespace(),
        "Collector configured"
    );

    let listen_addr: SocketAddr = config
        .web
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    let lifecycle = Lifecycle::new();
    let http_server = HttpServer::new(
        collector.clone(),
        lifecycle.clone(),
        listen_addr,
        config.web.path.clone(),
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut http_task = tokio::spawn(async move { http_server.run(shutdown_rx).await });

    let signal_error = tokio::select! {
        signal = wait_for_signal() => match signal {
            Ok(name) => {
                info!(signal = name, "Received signal, shutting down...");
                None
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for shutdown signals, shutting down...");
                Some(e)
            }
        },
        result = &mut http_task => {
            // The server stopped before any signal arrived.
            result.context("HTTP server task panicked")??;
            info!("Exporter stopped");
            return Ok(());
        }
    };

    // Signal shutdown; the server may already be gone.
    let _ = shutdown_tx.send(true);

    let result = http_task.await.context("HTTP server task panicked")?;

    // Print final stats
    let stats = collector.stats();
    info!(
        scrapes_total = stats.scrapes_total,
        facility_errors_total = stats.facility_errors_total,
        state = %lifecycle.state(),
        "Final statistics"
    );

    exit_status(result, signal_error)?;
    info!("Exporter stopped");
    Ok(())
}

/// Combine the server outcome with a failed signal listener. Either one is
/// fatal; a server error takes precedence.
fn exit_status(
    server: Result<(), ServerError>,
    signal_error: Option<std::io::Error>,
) -> anyhow::Result<()> {
    server?;
    match signal_error {
        Some(e) => Err(e).context("failed to listen for shutdown signals"),
        None => Ok(()),
    }
}

/// Resolves with the name of the first termination signal received.
async fn wait_for_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
            _ = sigterm.recv() => Ok("SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map(|()| "Ctrl+C")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_clean_shutdown_exits_zero() {
        assert!(exit_status(Ok(()), None).is_ok());
    }

    #[test]
    fn test_signal_listener_failure_is_fatal() {
        let err = exit_status(
            Ok(()),
            Some(std::io::Error::other("signal handler unavailable")),
        )
        .unwrap_err();

        assert!(err.to_string().contains("failed to listen for shutdown signals"));
    }

    #[test]
    fn test_server_error_takes_precedence() {
        let err = exit_status(
            Err(ServerError::DrainTimeout(Duration::from_secs(5))),
            Some(std::io::Error::other("signal handler unavailable")),
        )
        .unwrap_err();

        assert!(err.downcast_ref::<ServerError>().is_some());
    }
}
