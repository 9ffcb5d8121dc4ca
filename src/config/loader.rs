//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating the metrics options,
//! and providing clear error messages for misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::{AppConfig, BackendOptions, MetricsOptions};

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    registry = %config.metrics.registry_name,
    enabled = config.metrics.enabled,
    disabled_categories = config.metrics.disabled_categories.len(),
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate a TOML document.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig =
    toml::from_str(content).with_context(|| "Failed to parse config.toml")?;

  validate_options(&config.metrics)?;

  Ok(config)
}

/// Validate metrics options.
///
/// Checks for:
/// - Non-empty registry name
/// - Scrape endpoint starting with `/`
/// - Positive push step and batch size
/// - Parseable InfluxDB URI
pub fn validate_options(options: &MetricsOptions) -> Result<()> {
  anyhow::ensure!(
    !options.registry_name.trim().is_empty(),
    "registry_name must not be empty"
  );

  match &options.backend {
    BackendOptions::Prometheus(prometheus) => {
      anyhow::ensure!(
        prometheus.endpoint.starts_with('/'),
        "Prometheus endpoint must start with '/', got {:?}",
        prometheus.endpoint
      );
      if let Some(server) = &prometheus.embedded_server {
        anyhow::ensure!(
          !server.host.is_empty(),
          "Prometheus embedded_server.host must not be empty"
        );
      }
    }
    BackendOptions::InfluxDb(influx) => {
      anyhow::ensure!(
        influx.step_secs > 0,
        "InfluxDB step_secs must be positive"
      );
      anyhow::ensure!(
        influx.batch_size > 0,
        "InfluxDB batch_size must be positive"
      );
      anyhow::ensure!(!influx.db.is_empty(), "InfluxDB db must not be empty");
      reqwest::Url::parse(&influx.uri)
        .with_context(|| format!("Invalid InfluxDB uri: {}", influx.uri))?;
    }
    BackendOptions::Disabled => {}
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::InfluxDbOptions;

  #[test]
  fn test_load_nonexistent_file() {
    let result = load_config("nonexistent.toml");
    assert!(result.is_err());
  }

  #[test]
  fn test_parse_prometheus() {
    let config = parse_config(
      r#"
      [logging]
      log_level = "debug"

      [metrics]
      enabled = true
      disabled_categories = ["VERTICLES"]

      [metrics.backend]
      kind = "prometheus"
      endpoint = "/scrape"

      [metrics.backend.embedded_server]
      host = "127.0.0.1"
      port = 9100
      "#,
    )
    .unwrap();

    assert_eq!(config.logging.log_level, "debug");
    assert!(config.metrics.enabled);
    match &config.metrics.backend {
      BackendOptions::Prometheus(p) => {
        assert_eq!(p.endpoint, "/scrape");
        assert_eq!(p.embedded_server.as_ref().unwrap().port, 9100);
      }
      other => panic!("unexpected backend {other:?}"),
    }
  }

  #[test]
  fn test_minimal_config_defaults() {
    let config = parse_config("[metrics]\n").unwrap();
    assert_eq!(config.logging.log_level, "info");
    assert!(!config.metrics.enabled);
    assert_eq!(config.metrics.backend, BackendOptions::Disabled);
  }

  #[test]
  fn test_rejects_bad_endpoint() {
    let result = parse_config(
      r#"
      [metrics.backend]
      kind = "prometheus"
      endpoint = "metrics"
      "#,
    );
    assert!(result.is_err());
  }

  #[test]
  fn test_rejects_zero_batch() {
    let result = parse_config(
      r#"
      [metrics.backend]
      kind = "influxdb"
      batch_size = 0
      "#,
    );
    assert!(result.is_err());
  }

  #[test]
  fn test_influx_compression_defaults_on() {
    let config = parse_config(
      r#"
      [metrics.backend]
      kind = "influxdb"
      "#,
    )
    .unwrap();
    match config.metrics.backend {
      BackendOptions::InfluxDb(influx) => assert!(influx.compressed),
      other => panic!("expected influxdb backend, got {other:?}"),
    }

    let config = parse_config(
      r#"
      [metrics.backend]
      kind = "influxdb"
      compressed = false
      "#,
    )
    .unwrap();
    assert!(matches!(
      config.metrics.backend,
      BackendOptions::InfluxDb(InfluxDbOptions { compressed: false, .. })
    ));
  }

  #[test]
  fn test_rejects_empty_registry_name() {
    let result = parse_config("[metrics]\nregistry_name = \" \"\n");
    assert!(result.is_err());
  }
}
