//! Connection Families - Shared TCP Connection Metrics
//!
//! Net and HTTP categories both track open connections, bytes in each
//! direction and errors. They differ only in the name prefix
//! (`vertx_net` / `vertx_http`) and in which side of the connection is
//! measured, so the four families live here once.

use std::sync::Arc;

use crate::domain::{Direction, LabelSet, labels};
use crate::ports::meter_registry::MeterRegistry;
use crate::usecases::{Counters, Gauges, Summaries};

/// The four connection-level families of one category.
pub(crate) struct ConnectionFamilies {
    labels: LabelSet,
    connections: Gauges,
    bytes_received: Summaries,
    bytes_sent: Summaries,
    errors: Counters,
}

impl ConnectionFamilies {
    pub(crate) fn new(
        prefix: &str,
        direction: Direction,
        label_set: LabelSet,
        registry: &Arc<dyn MeterRegistry>,
    ) -> Self {
        let (side, connections_help, received_help, sent_help) = match direction {
            Direction::Client => (
                "client",
                "Number of connections to the remote host currently opened",
                "Number of bytes received from the remote host",
                "Number of bytes sent to the remote host",
            ),
            Direction::Server => (
                "server",
                "Number of opened connections to the server",
                "Number of bytes received by the server",
                "Number of bytes sent by the server",
            ),
        };
        let base = label_set.keys(&[]);
        Self {
            labels: label_set,
            connections: Gauges::new(
                &format!("{prefix}_{side}_connections"),
                connections_help,
                Arc::clone(registry),
                &base,
            ),
            bytes_received: Summaries::new(
                &format!("{prefix}_{side}_bytes_received"),
                received_help,
                Arc::clone(registry),
                &base,
            ),
            bytes_sent: Summaries::new(
                &format!("{prefix}_{side}_bytes_sent"),
                sent_help,
                Arc::clone(registry),
                &base,
            ),
            errors: Counters::new(
                &format!("{prefix}_{side}_errors"),
                "Number of errors",
                Arc::clone(registry),
                &label_set.keys(&[labels::CLASS]),
            ),
        }
    }

    pub(crate) fn labels(&self) -> LabelSet {
        self.labels
    }

    /// Count a new connection and return the remote label value.
    pub(crate) fn connected(&self, local: &str, host: Option<&str>, port: u16) -> String {
        let remote = labels::from_address(host, port);
        self.connections
            .get(&self.labels.values(local, &remote, &[]))
            .increment();
        remote
    }

    pub(crate) fn disconnected(&self, local: &str, remote: &str) {
        self.connections
            .get(&self.labels.values(local, remote, &[]))
            .decrement();
    }

    pub(crate) fn bytes_read(&self, local: &str, remote: &str, bytes: u64) {
        self.bytes_received
            .get(&self.labels.values(local, remote, &[]))
            .record(bytes as f64);
    }

    pub(crate) fn bytes_written(&self, local: &str, remote: &str, bytes: u64) {
        self.bytes_sent
            .get(&self.labels.values(local, remote, &[]))
            .record(bytes as f64);
    }

    pub(crate) fn exception_occurred(&self, local: &str, remote: &str, error_class: &str) {
        self.errors
            .get(&self.labels.values(local, remote, &[error_class]))
            .increment();
    }
}
