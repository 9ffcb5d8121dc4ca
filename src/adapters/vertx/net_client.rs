//! Net Client Metrics - TCP Client Connections
//!
//! One `NetClientMetrics` per runtime, one `NetClientInstance` per
//! client. Whether client families carry the `remote` label is decided
//! by the label policy when the category is built.

use std::sync::Arc;

use super::connection::ConnectionFamilies;
use crate::domain::{Direction, LabelPolicy, labels};
use crate::ports::meter_registry::MeterRegistry;
use crate::ports::metrics_spi::TcpMetrics;

/// Families of the net client category.
pub struct NetClientMetrics {
    connections: ConnectionFamilies,
}

impl NetClientMetrics {
    pub fn new(policy: &LabelPolicy, registry: &Arc<dyn MeterRegistry>) -> Self {
        Self {
            connections: ConnectionFamilies::new(
                "vertx_net",
                Direction::Client,
                policy.label_set(Direction::Client),
                registry,
            ),
        }
    }

    /// Whether families are tagged with the remote address.
    pub fn has_remote_label(&self) -> bool {
        self.connections.labels().has_remote()
    }

    /// Metrics for one client bound to `local_address` (`?` if unknown).
    pub fn for_address(self: &Arc<Self>, local_address: Option<&str>) -> NetClientInstance {
        NetClientInstance {
            metrics: Arc::clone(self),
            local: local_address.unwrap_or(labels::UNKNOWN).to_string(),
        }
    }
}

/// Net client metrics bound to a local address.
pub struct NetClientInstance {
    metrics: Arc<NetClientMetrics>,
    local: String,
}

impl NetClientInstance {
    pub fn local(&self) -> &str {
        &self.local
    }
}

impl TcpMetrics for NetClientInstance {
    /// Remote label value.
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
