//! Line Writer Port - InfluxDB Write Transport
//!
//! The InfluxDB backend renders meters into line protocol and hands
//! each batch to a writer. The production writer POSTs over HTTP; tests
//! substitute a mock.

use async_trait::async_trait;

use crate::error::Result;

/// Transport for batches of InfluxDB line protocol.
#[async_trait]
pub trait LineWriter: Send + Sync + 'static {
    /// Write one batch. Lines carry no trailing newline.
    async fn write(&self, lines: &[String]) -> Result<()>;
}
