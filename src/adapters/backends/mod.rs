//! Metrics Backends - Prometheus, InfluxDB and No-op
//!
//! A backend owns the `MeterRegistry` the families register with, plus
//! whatever background machinery exports the meters (an embedded scrape
//! server or a push loop). Backends are created and torn down through
//! the `BackendDirectory`.

pub mod directory;
pub mod influxdb;
pub mod prometheus;
pub mod store;

use std::sync::Arc;

pub use directory::BackendDirectory;
pub use influxdb::{HttpLineWriter, InfluxDbBackend};
pub use prometheus::PrometheusBackend;
pub use store::{MeterStore, NoopRegistry};

use crate::config::BackendOptions;
use crate::error::Result;
use crate::ports::meter_registry::MeterRegistry;

/// A live backend.
#[derive(Debug)]
pub enum BackendRegistry {
    Prometheus(PrometheusBackend),
    InfluxDb(InfluxDbBackend),
    /// Discards every meter.
    Noop,
}

impl BackendRegistry {
    /// Build the backend selected by `options`.
    pub fn from_options(options: &BackendOptions) -> Result<Self> {
        Ok(match options {
            BackendOptions::Prometheus(prometheus) => {
                Self::Prometheus(PrometheusBackend::new(prometheus)?)
            }
            BackendOptions::InfluxDb(influx) => Self::InfluxDb(InfluxDbBackend::from_options(influx)?),
            BackendOptions::Disabled => Self::Noop,
        })
    }

    /// Registry the families register their meters with.
    pub fn meter_registry(&self) -> Arc<dyn MeterRegistry> {
        match self {
            Self::Prometheus(backend) => backend.meter_registry(),
            Self::InfluxDb(backend) => backend.meter_registry(),
            Self::Noop => Arc::new(NoopRegistry),
        }
    }

    /// Short name of the backend kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Prometheus(_) => "prometheus",
            Self::InfluxDb(_) => "influxdb",
            Self::Noop => "disabled",
        }
    }

    pub fn as_prometheus(&self) -> Option<&PrometheusBackend> {
        match self {
            Self::Prometheus(backend) => Some(backend),
            _ => None,
        }
    }

    pub fn as_influxdb(&self) -> Option<&InfluxDbBackend> {
        match self {
            Self::InfluxDb(backend) => Some(backend),
            _ => None,
        }
    }

    /// Stop background work and release exported state.
    pub fn close(&self) {
        match self {
            Self::Prometheus(backend) => backend.close(),
            Self::InfluxDb(backend) => backend.close(),
            Self::Noop => {}
        }
    }

    /// Like `close`, but waits until a push backend's final flush ends.
    pub async fn shutdown(&self) {
        match self {
            Self::Prometheus(backend) => backend.close(),
            Self::InfluxDb(backend) => backend.shutdown().await,
            Self::Noop => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PrometheusOptions;

    #[test]
    fn test_disabled_is_noop() {
        let backend = BackendRegistry::from_options(&BackendOptions::Disabled).unwrap();
        assert_eq!(backend.kind(), "disabled");
        assert!(backend.as_prometheus().is_none());
        assert!(backend.meter_registry().meters().is_empty());
    }

    #[test]
    fn test_prometheus_without_server_needs_no_runtime() {
        let backend =
            BackendRegistry::from_options(&BackendOptions::Prometheus(PrometheusOptions::default()))
                .unwrap();
        assert_eq!(backend.kind(), "prometheus");
        assert!(backend.as_prometheus().is_some());
        assert!(backend.as_influxdb().is_none());
    }
}
