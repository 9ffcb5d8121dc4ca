//! Datagram Socket Metrics
//!
//! Received bytes are tagged with the local address once the socket
//! reports it is listening; reads before that are not recorded. Sent
//! bytes and errors carry no address.

use std::sync::{Arc, PoisonError, RwLock};

use crate::domain::labels;
use crate::ports::meter_registry::MeterRegistry;
use crate::ports::metrics_spi::DatagramSocketMetrics;
use crate::usecases::{Counters, Summaries};

/// Families of the datagram socket category.
pub struct DatagramMetrics {
    bytes_received: Summaries,
    bytes_sent: Summaries,
    errors: Counters,
}

impl DatagramMetrics {
    pub fn new(registry: &Arc<dyn MeterRegistry>) -> Self {
        Self {
            bytes_received: Summaries::new(
                "vertx_datagram_bytes_received",
                "Total number of datagram bytes received",
                Arc::clone(registry),
                &[labels::LOCAL],
            ),
            bytes_sent: Summaries::new(
                "vertx_datagram_bytes_sent",
                "Total number of datagram bytes sent",
                Arc::clone(registry),
                &[],
            ),
            errors: Counters::new(
                "vertx_datagram_errors",
                "Total number of datagram errors",
                Arc::clone(registry),
                &[labels::CLASS],
            ),
        }
    }

    /// Metrics for one datagram socket.
    pub fn socket(self: &Arc<Self>) -> DatagramSocketInstance {
        DatagramSocketInstance {
            metrics: Arc::clone(self),
            local: RwLock::new(None),
        }
    }
}

/// Metrics of one datagram socket.
pub struct DatagramSocketInstance {
    metrics: Arc<DatagramMetrics>,
    /// Set by `listening`.
    local: RwLock<Option<String>>,
}

impl DatagramSocketInstance {
    pub fn local(&self) -> Option<String> {
        self.local
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl DatagramSocketMetrics for DatagramSocketInstance {
    fn listening(&self, local_host: Option<&str>, local_port: u16) {
        let address = labels::from_address(local_host, local_port);
        *self.local.write().unwrap_or_else(PoisonError::into_inner) = Some(address);
    }

    fn bytes_read(&self, bytes: u64) {
        let local = self.local.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(local) = local.as_deref() {
            self.metrics.bytes_received.get(&[local]).record(bytes as f64);
        }
    }

    fn bytes_written(&self, bytes: u64) {
        self.metrics
            .bytes_sent
            .get::<&str>(&[])
            .record(bytes as f64);
    }

    fn exception_occurred(&self, error_class: &str) {
        self.metrics.errors.get(&[error_class]).increment();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::backends::MeterStore;
    use crate::domain::Meter;

    #[test]
    fn test_reads_recorded_only_after_listening() {
        let store = Arc::new(MeterStore::new());
        let registry: Arc<dyn MeterRegistry> = store.clone();
        let socket = Arc::new(DatagramMetrics::new(&registry)).socket();

        socket.bytes_read(10);
        assert!(socket.local().is_none());
        assert!(store.meters().is_empty());

        socket.listening(Some("127.0.0.1"), 5353);
        socket.bytes_read(20);
        socket.bytes_written(7);
        socket.exception_occurred("AddrInUse");

        let ids: Vec<String> = store.meters().into_iter().map(|m| m.id.to_string()).collect();
        assert_eq!(
            ids,
            vec![
                "vertx_datagram_bytes_received[local=127.0.0.1:5353]",
                "vertx_datagram_bytes_sent",
                "vertx_datagram_errors[class=AddrInUse]",
            ]
        );
        let received = store
            .meters()
            .into_iter()
            .find(|m| m.id.name == "vertx_datagram_bytes_received")
            .unwrap();
        match received.meter {
            Meter::Summary(s) => {
                assert_eq!(s.count(), 1);
                assert!((s.total() - 20.0).abs() < f64::EPSILON);
            }
            other => panic!("unexpected meter {other:?}"),
        }
    }
}
