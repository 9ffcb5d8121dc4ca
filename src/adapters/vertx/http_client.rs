//! HTTP Client Metrics - Requests, Responses and WebSockets

use std::sync::Arc;

use super::connection::ConnectionFamilies;
use crate::domain::{Direction, LabelPolicy, LabelSet, TimerSample, labels};
use crate::ports::meter_registry::MeterRegistry;
use crate::ports::metrics_spi::{HttpClientMetrics as HttpClientSpi, TcpMetrics};
use crate::usecases::{Counters, Gauges, Timers};

/// Families of the HTTP client category.
pub struct HttpClientMetrics {
    connections: ConnectionFamilies,
    labels: LabelSet,
    requests: Gauges,
    request_count: Counters,
    response_time: Timers,
    response_count: Counters,
    ws_connections: Gauges,
}

impl HttpClientMetrics {
    pub fn new(policy: &LabelPolicy, registry: &Arc<dyn MeterRegistry>) -> Self {
        let label_set = policy.label_set(Direction::Client);
        let base = label_set.keys(&[]);
        Self {
            connections: ConnectionFamilies::new("vertx_http", Direction::Client, label_set, registry),
            labels: label_set,
            requests: Gauges::new(
                "vertx_http_client_requests",
                "Number of requests waiting for a response",
                Arc::clone(registry),
                &base,
            ),
            request_count: Counters::new(
                "vertx_http_client_request_count",
                "Number of requests sent",
                Arc::clone(registry),
                &label_set.keys(&[labels::METHOD]),
            ),
            response_time: Timers::new(
                "vertx_http_client_response_time",
                "Response time",
                Arc::clone(registry),
                &base,
            ),
            response_count: Counters::new(
                "vertx_http_client_response_count",
                "Response count with codes",
                Arc::clone(registry),
                &label_set.keys(&[labels::CODE]),
            ),
            ws_connections: Gauges::new(
                "vertx_http_client_ws_connections",
                "Number of websockets currently opened",
                Arc::clone(registry),
                &base,
            ),
        }
    }

    /// Metrics for one client bound to `local_address` (`?` if unknown).
    pub fn for_address(self: &Arc<Self>, local_address: Option<&str>) -> HttpClientInstance {
        HttpClientInstance {
            metrics: Arc::clone(self),
            local: local_address.unwrap_or(labels::UNKNOWN).to_string(),
        }
    }
}

/// A request waiting for its response.
#[derive(Debug)]
pub struct ClientRequest {
    remote: String,
    timer: TimerSample,
}

/// HTTP client metrics bound to a local address.
pub struct HttpClientInstance {
    metrics: Arc<HttpClientMetrics>,
    local: String,
}

impl HttpClientInstance {
    pub fn local(&self) -> &str {
        &self.local
    }

    fn base_values<'a>(&'a self, remote: &'a str) -> Vec<&'a str> {
        self.metrics.labels.values(&self.local, remote, &[])
    }
}

impl TcpMetrics for HttpClientInstance {
    type Socket = String;

    fn connected(&self, remote_host: Option<&str>, remote_port: u16) -> String {
        self.metrics
            .connections
            .connected(&self.local, remote_host, remote_port)
    }

    fn disconnected(&self, socket: String) {
        self.metrics.connections.disconnected(&self.local, &socket);
    }

    fn bytes_read(&self, socket: &String, bytes: u64) {
        self.metrics.connections.bytes_read(&self.local, socket, bytes);
    }

    fn bytes_written(&self, socket: &String, bytes: u64) {
        self.metrics
            .connections
            .bytes_written(&self.local, socket, bytes);
    }

    fn exception_occurred(&self, socket: &String, error_class: &str) {
        self.metrics
            .connections
            .exception_occurred(&self.local, socket, error_class);
    }
}

impl HttpClientSpi for HttpClientInstance {
    type Request = ClientRequest;
    type WebSocket = String;

    fn request_begin(&self, socket: &String, method: &str) -> ClientRequest {
        let values = self.base_values(socket);
        self.metrics.requests.get(&values).increment();
        self.metrics
            .request_count
            .get(&self.metrics.labels.values(&self.local, socket, &[method]))
            .increment();
        ClientRequest {
            remote: socket.clone(),
            timer: self.metrics.response_time.start(&values),
        }
    }

    fn request_reset(&self, request: ClientRequest) {
        self.metrics
            .requests
            .get(&self.base_values(&request.remote))
            .decrement();
    }

    fn response_end(&self, request: ClientRequest, status: u16) {
        let code = status.to_string();
        self.metrics
            .requests
            .get(&self.base_values(&request.remote))
            .decrement();
        self.metrics
            .response_count
            .get(&self.metrics.labels.values(&self.local, &request.remote, &[code.as_str()]))
            .increment();
        request.timer.end();
    }

    fn websocket_connected(&self, socket: &String) -> String {
        self.metrics
            .ws_connections
            .get(&self.base_values(socket))
            .increment();
        socket.clone()
    }

    fn websocket_disconnected(&self, websocket: String) {
        self.metrics
            .ws_connections
            .get(&self.base_values(&websocket))
            .decrement();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::backends::MeterStore;
    use crate::domain::Meter;

    #[test]
    fn test_response_is_counted_per_code() {
        let store = Arc::new(MeterStore::new());
        let registry: Arc<dyn MeterRegistry> = store.clone();
        let metrics = Arc::new(HttpClientMetrics::new(&LabelPolicy::default(), &registry));
        let client = metrics.for_address(None);

        let socket = client.connected(Some("api.example.com"), 443);
        for status in [200, 200, 503] {
            let request = client.request_begin(&socket, "GET");
            client.response_end(request, status);
        }
        let reset = client.request_begin(&socket, "DELETE");
        client.request_reset(reset);

        let by_id: Vec<(String, Meter)> = store
            .meters()
            .into_iter()
            .map(|m| (m.id.to_string(), m.meter))
            .collect();
        let lookup = |id: &str| {
            by_id
                .iter()
                .find(|(k, _)| k == id)
                .map(|(_, m)| m.clone())
                .unwrap_or_else(|| panic!("missing meter {id}"))
        };

        match lookup("vertx_http_client_response_count[local=?,remote=api.example.com:443,code=200]") {
            Meter::Counter(c) => assert!((c.count() - 2.0).abs() < f64::EPSILON),
            other => panic!("unexpected meter {other:?}"),
        }
        match lookup("vertx_http_client_response_count[local=?,remote=api.example.com:443,code=503]") {
            Meter::Counter(c) => assert!((c.count() - 1.0).abs() < f64::EPSILON),
            other => panic!("unexpected meter {other:?}"),
        }
        match lookup("vertx_http_client_request_count[local=?,remote=api.example.com:443,method=DELETE]") {
            Meter::Counter(c) => assert!((c.count() - 1.0).abs() < f64::EPSILON),
            other => panic!("unexpected meter {other:?}"),
        }
        match lookup("vertx_http_client_requests[local=?,remote=api.example.com:443]") {
            Meter::Gauge(g) => assert!(g.value().abs() < f64::EPSILON),
            other => panic!("unexpected meter {other:?}"),
        }
        match lookup("vertx_http_client_response_time[local=?,remote=api.example.com:443]") {
            Meter::Timer(t) => assert_eq!(t.count(), 3),
            other => panic!("unexpected meter {other:?}"),
        }
    }
}
