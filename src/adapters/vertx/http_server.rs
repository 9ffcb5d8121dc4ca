//! HTTP Server Metrics - Requests, Responses and WebSockets
//!
//! Builds on the connection families with the `vertx_http_server`
//! prefix. A request holds its remote label, method and timing handle
//! from `request_begin` until it ends or is reset. Pushed responses are
//! counted but not timed.

use std::sync::Arc;

use super::connection::ConnectionFamilies;
use crate::domain::{Direction, LabelPolicy, LabelSet, TimerSample, labels};
use crate::ports::meter_registry::MeterRegistry;
use crate::ports::metrics_spi::{HttpServerMetrics as HttpServerSpi, TcpMetrics};
use crate::usecases::{Counters, Gauges, Timers};

/// Families of the HTTP server category.
pub struct HttpServerMetrics {
    connections: ConnectionFamilies,
    labels: LabelSet,
    requests: Gauges,
    request_count: Counters,
    request_reset_count: Counters,
    response_time: Timers,
    ws_connections: Gauges,
}

impl HttpServerMetrics {
    pub fn new(policy: &LabelPolicy, registry: &Arc<dyn MeterRegistry>) -> Self {
        let label_set = policy.label_set(Direction::Server);
        let base = label_set.keys(&[]);
        Self {
            connections: ConnectionFamilies::new("vertx_http", Direction::Server, label_set, registry),
            labels: label_set,
            requests: Gauges::new(
                "vertx_http_server_requests",
                "Number of requests being processed",
                Arc::clone(registry),
                &base,
            ),
            request_count: Counters::new(
                "vertx_http_server_request_count",
                "Number of processed requests",
                Arc::clone(registry),
                &label_set.keys(&[labels::METHOD, labels::CODE]),
            ),
            request_reset_count: Counters::new(
                "vertx_http_server_request_reset_count",
                "Number of requests reset",
                Arc::clone(registry),
                &base,
            ),
            response_time: Timers::new(
                "vertx_http_server_response_time",
                "Request processing time",
                Arc::clone(registry),
                &base,
            ),
            ws_connections: Gauges::new(
                "vertx_http_server_ws_connections",
                "Number of websockets currently opened",
                Arc::clone(registry),
                &base,
            ),
        }
    }

    /// Metrics for one server listening on `host:port`.
    pub fn for_address(self: &Arc<Self>, host: Option<&str>, port: u16) -> HttpServerInstance {
        HttpServerInstance {
            metrics: Arc::clone(self),
            local: labels::from_address(host, port),
        }
    }
}

/// An in-flight server request.
#[derive(Debug)]
pub struct ServerRequest {
    remote: String,
    method: String,
    timer: Option<TimerSample>,
}

/// HTTP server metrics bound to a listening address.
pub struct HttpServerInstance {
    metrics: Arc<HttpServerMetrics>,
    local: String,
}

impl HttpServerInstance {
    pub fn local(&self) -> &str {
        &self.local
    }

    fn base_values<'a>(&'a self, remote: &'a str) -> Vec<&'a str> {
        self.metrics.labels.values(&self.local, remote, &[])
    }
}

impl TcpMetrics for HttpServerInstance {
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

impl HttpServerSpi for HttpServerInstance {
    type Request = ServerRequest;
    type WebSocket = String;

    fn request_begin(&self, socket: &String, method: &str) -> ServerRequest {
        let values = self.base_values(socket);
        self.metrics.requests.get(&values).increment();
        ServerRequest {
            remote: socket.clone(),
            method: method.to_string(),
            timer: Some(self.metrics.response_time.start(&values)),
        }
    }

    fn request_reset(&self, request: ServerRequest) {
        let values = self.base_values(&request.remote);
        self.metrics.request_reset_count.get(&values).increment();
        self.metrics.requests.get(&values).decrement();
    }

    fn response_pushed(&self, socket: &String, method: &str) -> ServerRequest {
        self.metrics
            .requests
            .get(&self.base_values(socket))
            .increment();
        ServerRequest {
            remote: socket.clone(),
            method: method.to_string(),
            timer: None,
        }
    }

    fn response_end(&self, request: ServerRequest, status: u16) {
        if let Some(timer) = request.timer {
            timer.end();
        }
        let code = status.to_string();
        self.metrics
            .request_count
            .get(&self.metrics.labels.values(
                &self.local,
                &request.remote,
                &[request.method.as_str(), code.as_str()],
            ))
            .increment();
        self.metrics
            .requests
            .get(&self.base_values(&request.remote))
            .decrement();
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
