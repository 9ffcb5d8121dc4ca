//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) between the metric families and the
//! outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `MeterRegistry`: where instruments are registered (Prometheus, InfluxDB, no-op)
//! - `LineWriter`: transport for InfluxDB line protocol batches
//! - `metrics_spi`: lifecycle callbacks fired by the host runtime

pub mod line_writer;
pub mod meter_registry;
pub mod metrics_spi;
