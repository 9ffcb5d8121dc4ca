//! Configuration Module - Metrics Options
//!
//! Options are loaded from `config.toml` (see `loader`) or parsed from
//! JSON. Shared fields live on [`MetricsOptions`]; backend-specific
//! fields live on one variant of the [`BackendOptions`] tagged enum,
//! so the backend kind is decided once at parse time.

pub mod loader;

use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::{LabelPolicy, MetricsCategory};

/// Registry name used when none is configured.
pub const DEFAULT_REGISTRY_NAME: &str = "default";

/// Top-level file layout of `config.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Logging settings for the binary.
  #[serde(default)]
  pub logging: LoggingConfig,
  /// Metrics options.
  pub metrics: MetricsOptions,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      log_level: default_log_level(),
    }
  }
}

/// Metrics options shared by every backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsOptions {
  /// Master switch. When false the no-op backend is used.
  #[serde(default)]
  pub enabled: bool,
  /// Name of the backend registry in the directory.
  #[serde(default = "default_registry_name")]
  pub registry_name: String,
  /// Categories that are never built.
  #[serde(default)]
  pub disabled_categories: BTreeSet<MetricsCategory>,
  /// Remote-label cardinality policy.
  #[serde(default)]
  pub labels: LabelPolicy,
  /// Backend selection and its settings.
  #[serde(default)]
  pub backend: BackendOptions,
}

impl Default for MetricsOptions {
  fn default() -> Self {
    Self {
      enabled: false,
      registry_name: default_registry_name(),
      disabled_categories: BTreeSet::new(),
      labels: LabelPolicy::default(),
      backend: BackendOptions::default(),
    }
  }
}

impl MetricsOptions {
  /// Parse options from a JSON document.
  pub fn from_json(json: &str) -> Result<Self> {
    serde_json::from_str(json).context("Failed to parse metrics options JSON")
  }

  /// Serialize options to JSON.
  pub fn to_json(&self) -> Result<String> {
    serde_json::to_string(self).context("Failed to serialize metrics options")
  }

  /// Whether a category is switched off.
  pub fn is_category_disabled(&self, category: MetricsCategory) -> bool {
    self.disabled_categories.contains(&category)
  }

  /// Switch off one category.
  pub fn disable_category(mut self, category: MetricsCategory) -> Self {
    self.disabled_categories.insert(category);
    self
  }

  /// Backend actually used: disabled when the master switch is off.
  pub fn effective_backend(&self) -> BackendOptions {
    if self.enabled {
      self.backend.clone()
    } else {
      BackendOptions::Disabled
    }
  }
}

/// Backend kind and settings.
///
/// Unknown kinds deserialize to `Disabled`, so a typo in the
/// configuration silently falls back to discarding metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendOptions {
  /// Pull-based Prometheus text exposition.
  Prometheus(PrometheusOptions),
  /// Push-based InfluxDB line protocol.
  #[serde(rename = "influxdb")]
  InfluxDb(InfluxDbOptions),
  /// Discard everything.
  #[default]
  #[serde(other)]
  Disabled,
}

/// Prometheus backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrometheusOptions {
  /// Bind a dedicated scrape server when set.
  #[serde(default)]
  pub embedded_server: Option<EmbeddedServerOptions>,
  /// Path the scrape server answers on.
  #[serde(default = "default_endpoint")]
  pub endpoint: String,
}

impl Default for PrometheusOptions {
  fn default() -> Self {
    Self {
      embedded_server: None,
      endpoint: default_endpoint(),
    }
  }
}

/// Bind address of the embedded scrape server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedServerOptions {
  /// Host or IP to bind.
  #[serde(default = "default_host")]
  pub host: String,
  /// Port to bind; 0 picks an ephemeral port.
  #[serde(default = "default_port")]
  pub port: u16,
}

impl Default for EmbeddedServerOptions {
  fn default() -> Self {
    Self {
      host: default_host(),
      port: default_port(),
    }
  }
}

/// InfluxDB backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfluxDbOptions {
  /// Base URI of the InfluxDB server.
  #[serde(default = "default_influx_uri")]
  pub uri: String,
  /// Database to write to (created on first push).
  #[serde(default = "default_db")]
  pub db: String,
  /// Basic-auth user name.
  #[serde(default)]
  pub user_name: Option<String>,
  /// Basic-auth password.
  #[serde(default)]
  pub password: Option<String>,
  /// Retention policy for written points.
  #[serde(default)]
  pub retention_policy: Option<String>,
  /// Push interval in seconds.
  #[serde(default = "default_step")]
  pub step_secs: u64,
  /// Connect timeout in seconds.
  #[serde(default = "default_connect_timeout")]
  pub connect_timeout_secs: u64,
  /// Read timeout in seconds.
  #[serde(default = "default_read_timeout")]
  pub read_timeout_secs: u64,
  /// Maximum lines per write request.
  #[serde(default = "default_batch_size")]
  pub batch_size: usize,
  /// Gzip request bodies.
  #[serde(default = "default_compressed")]
  pub compressed: bool,
}

impl Default for InfluxDbOptions {
  fn default() -> Self {
    Self {
      uri: default_influx_uri(),
      db: default_db(),
      user_name: None,
      password: None,
      retention_policy: None,
      step_secs: default_step(),
      connect_timeout_secs: default_connect_timeout(),
      read_timeout_secs: default_read_timeout(),
      batch_size: default_batch_size(),
      compressed: default_compressed(),
    }
  }
}

impl InfluxDbOptions {
  pub fn step(&self) -> Duration {
    Duration::from_secs(self.step_secs)
  }

  pub fn connect_timeout(&self) -> Duration {
    Duration::from_secs(self.connect_timeout_secs)
  }

  pub fn read_timeout(&self) -> Duration {
    Duration::from_secs(self.read_timeout_secs)
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_registry_name() -> String {
  DEFAULT_REGISTRY_NAME.to_string()
}

fn default_endpoint() -> String {
  "/metrics".to_string()
}

fn default_host() -> String {
  "0.0.0.0".to_string()
}

fn default_port() -> u16 {
  9090
}

fn default_influx_uri() -> String {
  "http://localhost:8086".to_string()
}

fn default_db() -> String {
  "default".to_string()
}

fn default_step() -> u64 {
  10
}

fn default_connect_timeout() -> u64 {
  1
}

fn default_read_timeout() -> u64 {
  10
}

fn default_batch_size() -> usize {
  10_000
}

fn default_compressed() -> bool {
  true
}
