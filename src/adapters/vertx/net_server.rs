//! Net Server Metrics - TCP Server Connections
//!
//! Server families omit the `remote` label unless the policy turns it
//! on: a public server sees an unbounded set of peers.

use std::sync::Arc;

use super::connection::ConnectionFamilies;
use crate::domain::{Direction, LabelPolicy, labels};
use crate::ports::meter_registry::MeterRegistry;
use crate::ports::metrics_spi::TcpMetrics;

/// Families of the net server category.
pub struct NetServerMetrics {
    connections: ConnectionFamilies,
}

impl NetServerMetrics {
    pub fn new(policy: &LabelPolicy, registry: &Arc<dyn MeterRegistry>) -> Self {
        Self {
            connections: ConnectionFamilies::new(
                "vertx_net",
                Direction::Server,
                policy.label_set(Direction::Server),
                registry,
            ),
        }
    }

    pub fn has_remote_label(&self) -> bool {
        self.connections.labels().has_remote()
    }

    /// Metrics for one server listening on `host:port`.
    pub fn for_address(self: &Arc<Self>, host: Option<&str>, port: u16) -> NetServerInstance {
        NetServerInstance {
            metrics: Arc::clone(self),
            local: labels::from_address(host, port),
        }
    }
}

/// Net server metrics bound to a listening address.
pub struct NetServerInstance {
    metrics: Arc<NetServerMetrics>,
    local: String,
}

impl NetServerInstance {
    pub fn local(&self) -> &str {
        &self.local
    }
}

impl TcpMetrics for NetServerInstance {
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
