//! Vert.x Metrics - Standalone Exporter
//!
//! Boots the metrics backend described by `config.toml` and keeps it
//! alive until SIGINT. Useful to check a configuration and to scrape
//! the embedded endpoint without a host runtime attached.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Create the backend directory
//! 4. Build the per-category metrics against the configured backend
//! 5. Wait for SIGINT → shut down every backend (awaits the final InfluxDB push)

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::info;

use vertx_metrics::adapters::backends::BackendDirectory;
use vertx_metrics::adapters::vertx::VertxMetrics;
use vertx_metrics::config;

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration from config.toml ──────────────
    let config = config::loader::load_config("config.toml")
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new(&config.logging.log_level)
                }),
        )
        .json()
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        registry = %config.metrics.registry_name,
        enabled = config.metrics.enabled,
        "Starting Vert.x metrics exporter"
    );

    // ── 3. Backend directory (one per process) ──────────────
    let directory = BackendDirectory::new();

    // ── 4. Build categories against the configured backend ──
    let metrics = VertxMetrics::new(&directory, &config.metrics)
        .context("Failed to set up metrics backend")?;

    if let Some(addr) = metrics
        .backend()
        .as_prometheus()
        .and_then(|backend| backend.local_addr())
    {
        info!(%addr, endpoint = ?prometheus_endpoint(&config.metrics), "Scrape endpoint ready");
    }

    info!(
        backend = metrics.backend().kind(),
        categories = metrics.enabled_categories().len(),
        "Metrics running"
    );

    // ── 5. Wait for SIGINT ──────────────────────────────────
    signal::ctrl_c()
        .await
        .context("Failed to listen for SIGINT")?;
    info!("SIGINT received, initiating graceful shutdown");

    directory.shutdown_all().await;

    info!("Shutdown complete");
    Ok(())
}

/// Scrape path of the configured Prometheus backend.
fn prometheus_endpoint(options: &config::MetricsOptions) -> Option<&str> {
    match &options.backend {
        config::BackendOptions::Prometheus(prometheus) => Some(prometheus.endpoint.as_str()),
        _ => None,
    }
}
