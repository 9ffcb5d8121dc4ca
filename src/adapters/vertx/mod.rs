//! Vert.x Metrics SPI - Per-Category Lifecycle Adapters
//!
//! `VertxMetrics` is the root the runtime talks to. It resolves the
//! configured backend through the directory once, builds every enabled
//! category against that backend's registry, and hands out per-server,
//! per-client, per-socket and per-pool instances. A disabled category
//! yields `None`, and the runtime skips its callbacks entirely.

mod connection;
pub mod datagram;
pub mod event_bus;
pub mod http_client;
pub mod http_server;
pub mod net_client;
pub mod net_server;
pub mod pool;
pub mod verticle;

use std::sync::Arc;

use tracing::info;

pub use datagram::{DatagramMetrics, DatagramSocketInstance};
pub use event_bus::{EventBusHandler, VertxEventBusMetrics};
pub use http_client::{ClientRequest, HttpClientInstance, HttpClientMetrics};
pub use http_server::{HttpServerInstance, HttpServerMetrics, ServerRequest};
pub use net_client::{NetClientInstance, NetClientMetrics};
pub use net_server::{NetServerInstance, NetServerMetrics};
pub use pool::{PoolInstance, VertxPoolMetrics};
pub use verticle::VertxVerticleMetrics;

use super::backends::{BackendDirectory, BackendRegistry};
use crate::config::MetricsOptions;
use crate::domain::MetricsCategory;
use crate::error::Result;
use crate::ports::meter_registry::MeterRegistry;

/// Metrics SPI root for one runtime instance.
pub struct VertxMetrics {
    /// Name of the backend in the directory.
    registry_name: String,
    /// Backend the categories register with.
    backend: Arc<BackendRegistry>,
    event_bus: Option<Arc<VertxEventBusMetrics>>,
    datagram: Option<Arc<DatagramMetrics>>,
    net_client: Option<Arc<NetClientMetrics>>,
    net_server: Option<Arc<NetServerMetrics>>,
    http_client: Option<Arc<HttpClientMetrics>>,
    http_server: Option<Arc<HttpServerMetrics>>,
    pools: Option<Arc<VertxPoolMetrics>>,
    verticles: Option<Arc<VertxVerticleMetrics>>,
}

impl VertxMetrics {
    /// Set up the configured backend and build every enabled category.
    pub fn new(directory: &BackendDirectory, options: &MetricsOptions) -> Result<Self> {
        let backend = directory.setup_backend(&options.registry_name, &options.effective_backend())?;
        let registry = backend.meter_registry();

        let enabled = |category: MetricsCategory| !options.is_category_disabled(category);
        let build = |category: MetricsCategory| enabled(category).then_some(&registry);
        let policy = &options.labels;

        let metrics = Self {
            registry_name: options.registry_name.clone(),
            event_bus: build(MetricsCategory::EventBus)
                .map(|r| Arc::new(VertxEventBusMetrics::new(r))),
            datagram: build(MetricsCategory::DatagramSocket)
                .map(|r| Arc::new(DatagramMetrics::new(r))),
            net_client: build(MetricsCategory::NetClient)
                .map(|r| Arc::new(NetClientMetrics::new(policy, r))),
            net_server: build(MetricsCategory::NetServer)
                .map(|r| Arc::new(NetServerMetrics::new(policy, r))),
            http_client: build(MetricsCategory::HttpClient)
                .map(|r| Arc::new(HttpClientMetrics::new(policy, r))),
            http_server: build(MetricsCategory::HttpServer)
                .map(|r| Arc::new(HttpServerMetrics::new(policy, r))),
            pools: build(MetricsCategory::NamedPools)
                .map(|r| Arc::new(VertxPoolMetrics::new(r))),
            verticles: build(MetricsCategory::Verticles)
                .map(|r| Arc::new(VertxVerticleMetrics::new(r))),
            backend,
        };

        info!(
            registry = %metrics.registry_name,
            backend = metrics.backend.kind(),
            enabled = ?metrics.enabled_categories(),
            "Vert.x metrics initialized"
        );

        Ok(metrics)
    }

    /// Backend the categories register with.
    pub fn backend(&self) -> &Arc<BackendRegistry> {
        &self.backend
    }

    pub fn meter_registry(&self) -> Arc<dyn MeterRegistry> {
        self.backend.meter_registry()
    }

    /// Categories that were built.
    pub fn enabled_categories(&self) -> Vec<MetricsCategory> {
        MetricsCategory::ALL
            .into_iter()
            .filter(|c| self.is_enabled(*c))
            .collect()
    }

    pub fn is_enabled(&self, category: MetricsCategory) -> bool {
        match category {
            MetricsCategory::EventBus => self.event_bus.is_some(),
            MetricsCategory::DatagramSocket => self.datagram.is_some(),
            MetricsCategory::NetClient => self.net_client.is_some(),
            MetricsCategory::NetServer => self.net_server.is_some(),
            MetricsCategory::HttpClient => self.http_client.is_some(),
            MetricsCategory::HttpServer => self.http_server.is_some(),
            MetricsCategory::NamedPools => self.pools.is_some(),
            MetricsCategory::Verticles => self.verticles.is_some(),
        }
    }

    /// Event bus metrics, shared by the whole runtime.
    pub fn event_bus(&self) -> Option<Arc<VertxEventBusMetrics>> {
        self.event_bus.clone()
    }

    pub fn datagram_socket(&self) -> Option<DatagramSocketInstance> {
        self.datagram.as_ref().map(|d| d.socket())
    }

    pub fn net_client(&self, local_address: Option<&str>) -> Option<NetClientInstance> {
        self.net_client
            .as_ref()
            .map(|m| m.for_address(local_address))
    }

    pub fn net_server(&self, host: Option<&str>, port: u16) -> Option<NetServerInstance> {
        self.net_server.as_ref().map(|m| m.for_address(host, port))
    }

    pub fn http_client(&self, local_address: Option<&str>) -> Option<HttpClientInstance> {
        self.http_client
            .as_ref()
            .map(|m| m.for_address(local_address))
    }

    pub fn http_server(&self, host: Option<&str>, port: u16) -> Option<HttpServerInstance> {
        self.http_server.as_ref().map(|m| m.for_address(host, port))
    }

    pub fn pool(&self, pool_type: &str, pool_name: &str, max_pool_size: u32) -> Option<PoolInstance> {
        self.pools
            .as_ref()
            .map(|m| m.for_pool(pool_type, pool_name, max_pool_size))
    }

    pub fn verticles(&self) -> Option<Arc<VertxVerticleMetrics>> {
        self.verticles.clone()
    }

    /// Stop the backend this runtime set up.
    pub fn close(&self, directory: &BackendDirectory) {
        directory.stop(&self.registry_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendOptions, PrometheusOptions};

    fn prometheus_options() -> MetricsOptions {
        MetricsOptions {
            enabled: true,
            backend: BackendOptions::Prometheus(PrometheusOptions::default()),
            ..MetricsOptions::default()
        }
    }

    #[test]
    fn test_disabled_categories_are_not_built() {
        let directory = BackendDirectory::new();
        let options = prometheus_options()
            .disable_category(MetricsCategory::EventBus)
            .disable_category(MetricsCategory::NamedPools);
        let metrics = VertxMetrics::new(&directory, &options).unwrap();

        assert!(metrics.event_bus().is_none());
        assert!(metrics.pool("worker", "w", 1).is_none());
        assert!(metrics.net_client(None).is_some());
        assert_eq!(metrics.enabled_categories().len(), MetricsCategory::ALL.len() - 2);
    }

    #[test]
    fn test_master_switch_off_uses_noop() {
        let directory = BackendDirectory::new();
        let options = MetricsOptions {
            enabled: false,
            ..prometheus_options()
        };
        let metrics = VertxMetrics::new(&directory, &options).unwrap();
        assert_eq!(metrics.backend().kind(), "disabled");

        use crate::ports::metrics_spi::VerticleMetrics;
        metrics.verticles().unwrap().deployed("app");
        assert!(metrics.meter_registry().meters().is_empty());
    }

    #[test]
    fn test_scrape_reflects_adapter_activity() {
        use crate::ports::metrics_spi::VerticleMetrics;

        let directory = BackendDirectory::new();
        let metrics = VertxMetrics::new(&directory, &prometheus_options()).unwrap();
        metrics.verticles().unwrap().deployed("app");

        let text = metrics
            .backend()
            .as_prometheus()
            .unwrap()
            .scrape()
            .unwrap();
        assert!(text.contains(r#"vertx_verticle{name="app"} 1"#));

        metrics.close(&directory);
        assert!(directory.get_now("default").is_none());
    }
}
