//! Prometheus Backend - Text Exposition and Embedded Scrape Server
//!
//! Meters registered by the families are kept in a `MeterStore`. A
//! single custom collector turns the store into metric families at
//! gather time, so the `prometheus::Registry` never needs to know the
//! individual label tuples. When an embedded server is configured, an
//! axum 0.7 router answers scrapes on the configured endpoint until the
//! backend is closed.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::core::{Collector, Desc};
use prometheus::proto::{self, LabelPair, MetricFamily, MetricType};
use prometheus::{Encoder, Registry, TextEncoder};
use tokio::sync::broadcast;
use tracing::{error, info, instrument};

use super::store::MeterStore;
use crate::config::{EmbeddedServerOptions, PrometheusOptions};
use crate::domain::{Meter, RegisteredMeter, Tag};
use crate::error::{MetricsError, Result};
use crate::ports::meter_registry::MeterRegistry;

/// Pull-based backend rendering the Prometheus text format.
pub struct PrometheusBackend {
    /// Meters registered by the families.
    store: Arc<MeterStore>,
    /// Registry holding the store collector.
    registry: Registry,
    /// Embedded scrape server, when configured.
    server: Option<EmbeddedServer>,
}

impl PrometheusBackend {
    /// Build the backend and start the embedded server if configured.
    ///
    /// Binding happens synchronously so a busy port is reported here.
    pub fn new(options: &PrometheusOptions) -> Result<Self> {
        let store = Arc::new(MeterStore::new());
        let registry = Registry::new();
        registry.register(Box::new(StoreCollector {
            store: Arc::clone(&store),
        }))?;

        let server = match &options.embedded_server {
            Some(server) => Some(EmbeddedServer::start(
                server,
                &options.endpoint,
                registry.clone(),
            )?),
            None => None,
        };

        Ok(Self {
            store,
            registry,
            server,
        })
    }

    /// Registry the families register their meters with.
    pub fn meter_registry(&self) -> Arc<dyn MeterRegistry> {
        Arc::clone(&self.store) as Arc<dyn MeterRegistry>
    }

    /// Underlying Prometheus registry, for embedding in a host server.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Current metrics in the text exposition format.
    pub fn scrape(&self) -> Result<String> {
        render(&self.registry)
    }

    /// Bound address of the embedded server.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(|s| s.local_addr)
    }

    /// Stop the embedded server and forget all meters.
    pub fn close(&self) {
        if let Some(server) = &self.server {
            server.shutdown();
        }
        self.store.clear();
    }
}

impl Drop for PrometheusBackend {
    fn drop(&mut self) {
        if let Some(server) = &self.server {
            server.shutdown();
        }
    }
}

impl std::fmt::Debug for PrometheusBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusBackend")
            .field("meters", &self.store.len())
            .field("local_addr", &self.local_addr())
            .finish()
    }
}

/// Encode everything the registry gathers.
fn render(registry: &Registry) -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

// ── Embedded server ──

struct EmbeddedServer {
    local_addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
}

impl EmbeddedServer {
    fn start(options: &EmbeddedServerOptions, endpoint: &str, registry: Registry) -> Result<Self> {
        if !endpoint.starts_with('/') {
            return Err(MetricsError::InvalidUri {
                uri: endpoint.to_string(),
                reason: "endpoint must start with '/'".to_string(),
            });
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| MetricsError::NoRuntime("prometheus"))?;

        let requested = format!("{}:{}", options.host, options.port);
        let listener = std::net::TcpListener::bind((options.host.as_str(), options.port))
            .map_err(|e| MetricsError::bind(&requested, e))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| MetricsError::bind(&requested, e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| MetricsError::bind(&requested, e))?;

        let app = Router::new()
            .route(endpoint, get(scrape_handler))
            .with_state(registry);

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        runtime.spawn(serve(listener, app, local_addr, shutdown_rx));

        Ok(Self {
            local_addr,
            shutdown_tx,
        })
    }

    fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

#[instrument(skip(listener, app, shutdown_rx))]
async fn serve(
    listener: std::net::TcpListener,
    app: Router,
    local_addr: SocketAddr,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let listener = match tokio::net::TcpListener::from_std(listener) {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, "Failed to register metrics listener with runtime");
            return;
        }
    };

    info!(address = %local_addr, "Prometheus scrape server started");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await;

    match result {
        Ok(()) => info!(address = %local_addr, "Prometheus scrape server stopped"),
        Err(e) => error!(address = %local_addr, error = %e, "Prometheus scrape server failed"),
    }
}

async fn scrape_handler(State(registry): State<Registry>) -> Response {
    match render(&registry) {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

// ── Collector ──

/// Exposes the meter store as Prometheus metric families.
struct StoreCollector {
    store: Arc<MeterStore>,
}

impl Collector for StoreCollector {
    fn desc(&self) -> Vec<&Desc> {
        Vec::new()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        families(&self.store.meters())
    }
}

/// Group meters into metric families by exported name.
fn families(meters: &[RegisteredMeter]) -> Vec<MetricFamily> {
    let mut out: BTreeMap<String, MetricFamily> = BTreeMap::new();

    for registered in meters {
        let name = sanitize(&registered.id.name);
        let help = registered.id.description.as_str();
        let tags = registered.id.tags.as_slice();

        match &registered.meter {
            Meter::Counter(counter) => {
                let family_name = if name.ends_with("_total") {
                    name
                } else {
                    format!("{name}_total")
                };
                let mut metric = metric(tags);
                let mut value = proto::Counter::default();
                value.set_value(counter.count());
                metric.set_counter(value);
                family(&mut out, family_name, help, MetricType::COUNTER)
                    .mut_metric()
                    .push(metric);
            }
            Meter::Gauge(gauge) => {
                push_gauge(&mut out, name, help, tags, gauge.value());
            }
            Meter::Timer(timer) => {
                let base = format!("{name}_seconds");
                push_summary(
                    &mut out,
                    base.clone(),
                    help,
                    tags,
                    timer.count(),
                    timer.total_time().as_secs_f64(),
                );
                push_gauge(
                    &mut out,
                    format!("{base}_max"),
                    help,
                    tags,
                    timer.max().as_secs_f64(),
                );
            }
            Meter::Summary(summary) => {
                push_summary(
                    &mut out,
                    name.clone(),
                    help,
                    tags,
                    summary.count(),
                    summary.total(),
                );
                push_gauge(&mut out, format!("{name}_max"), help, tags, summary.max());
            }
        }
    }

    out.into_values().collect()
}

fn push_gauge(
    out: &mut BTreeMap<String, MetricFamily>,
    name: String,
    help: &str,
    tags: &[Tag],
    value: f64,
) {
    let mut metric = metric(tags);
    let mut gauge = proto::Gauge::default();
    gauge.set_value(value);
    metric.set_gauge(gauge);
    family(out, name, help, MetricType::GAUGE)
        .mut_metric()
        .push(metric);
}

fn push_summary(
    out: &mut BTreeMap<String, MetricFamily>,
    name: String,
    help: &str,
    tags: &[Tag],
    count: u64,
    sum: f64,
) {
    let mut metric = metric(tags);
    let mut summary = proto::Summary::default();
    summary.set_sample_count(count);
    summary.set_sample_sum(sum);
    metric.set_summary(summary);
    family(out, name, help, MetricType::SUMMARY)
        .mut_metric()
        .push(metric);
}

fn family<'a>(
    out: &'a mut BTreeMap<String, MetricFamily>,
    name: String,
    help: &str,
    kind: MetricType,
) -> &'a mut MetricFamily {
    out.entry(name.clone())
        .or_insert_with(|| {
            let mut family = MetricFamily::default();
            family.set_name(name);
            family.set_help(help.to_string());
            family.set_field_type(kind);
            family
        })
}

fn metric(tags: &[Tag]) -> proto::Metric {
    let mut metric = proto::Metric::default();
    for tag in tags {
        let mut pair = LabelPair::default();
        pair.set_name(sanitize(&tag.key));
        pair.set_value(tag.value.clone());
        metric.mut_label().push(pair);
    }
    metric
}

/// Replace characters Prometheus does not allow in names.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == ':' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::{Counter, Gauge, MeterId, Summary, Timer};

    fn register(backend: &PrometheusBackend, name: &str, keys: &[&str], values: &[&str], meter: Meter) {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        backend
            .meter_registry()
            .register(MeterId::new(name, "help text", &keys, values), meter)
            .unwrap();
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("vertx.http.requests"), "vertx_http_requests");
        assert_eq!(sanitize("ok_name:sub"), "ok_name:sub");
    }

    #[test]
    fn test_scrape_renders_all_kinds() {
        let backend = PrometheusBackend::new(&PrometheusOptions::default()).unwrap();

        let counter = Arc::new(Counter::default());
        counter.increment_by(3.0);
        register(&backend, "vertx_net_client_errors", &["local", "class"], &["?", "IoError"], Meter::Counter(counter));

        let gauge = Arc::new(Gauge::default());
        gauge.set(2.0);
        register(&backend, "vertx_net_client_connections", &["local"], &["?"], Meter::Gauge(gauge));

        let timer = Arc::new(Timer::default());
        timer.record(Duration::from_millis(500));
        register(&backend, "vertx_http_client_response_time", &["local"], &["?"], Meter::Timer(timer));

        let summary = Arc::new(Summary::default());
        summary.record(10.0);
        summary.record(30.0);
        register(&backend, "vertx_net_client_bytes_received", &["local"], &["?"], Meter::Summary(summary));

        let text = backend.scrape().unwrap();
        assert!(text.contains("# TYPE vertx_net_client_errors_total counter"));
        assert!(text.contains(r#"vertx_net_client_errors_total{local="?",class="IoError"} 3"#));
        assert!(text.contains(r#"vertx_net_client_connections{local="?"} 2"#));
        assert!(text.contains("# TYPE vertx_http_client_response_time_seconds summary"));
        assert!(text.contains(r#"vertx_http_client_response_time_seconds_count{local="?"} 1"#));
        assert!(text.contains(r#"vertx_http_client_response_time_seconds_sum{local="?"} 0.5"#));
        assert!(text.contains(r#"vertx_http_client_response_time_seconds_max{local="?"} 0.5"#));
        assert!(text.contains(r#"vertx_net_client_bytes_received_sum{local="?"} 40"#));
        assert!(text.contains(r#"vertx_net_client_bytes_received_max{local="?"} 30"#));
    }

    #[test]
    fn test_empty_scrape() {
        let backend = PrometheusBackend::new(&PrometheusOptions::default()).unwrap();
        assert_eq!(backend.scrape().unwrap(), "");
        assert!(backend.local_addr().is_none());
    }

    #[test]
    fn test_close_clears_meters() {
        let backend = PrometheusBackend::new(&PrometheusOptions::default()).unwrap();
        register(&backend, "g", &[], &[], Meter::Gauge(Arc::new(Gauge::default())));
        backend.close();
        assert!(backend.meter_registry().meters().is_empty());
    }

    #[test]
    fn test_embedded_server_requires_runtime() {
        let options = PrometheusOptions {
            embedded_server: Some(EmbeddedServerOptions {
                host: "127.0.0.1".to_string(),
                port: 0,
            }),
            ..PrometheusOptions::default()
        };
        let err = PrometheusBackend::new(&options).unwrap_err();
        assert!(matches!(err, MetricsError::NoRuntime("prometheus")));
    }

    #[tokio::test]
    async fn test_embedded_server_serves_endpoint() {
        let options = PrometheusOptions {
            embedded_server: Some(EmbeddedServerOptions {
                host: "127.0.0.1".to_string(),
                port: 0,
            }),
            endpoint: "/custom".to_string(),
        };
        let backend = PrometheusBackend::new(&options).unwrap();
        let gauge = Arc::new(Gauge::default());
        gauge.set(7.0);
        register(&backend, "vertx_verticle", &["name"], &["app"], Meter::Gauge(gauge));

        let addr = backend.local_addr().unwrap();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        let body = client
            .get(format!("http://{addr}/custom"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.contains(r#"vertx_verticle{name="app"} 7"#));

        backend.close();
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        let options = PrometheusOptions {
            embedded_server: Some(EmbeddedServerOptions {
                host: "127.0.0.1".to_string(),
                port,
            }),
            ..PrometheusOptions::default()
        };
        let err = PrometheusBackend::new(&options).unwrap_err();
        assert!(matches!(err, MetricsError::Bind { .. }));
    }
}
