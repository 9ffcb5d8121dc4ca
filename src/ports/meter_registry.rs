//! Meter Registry Port - Downstream Backend Interface
//!
//! The families register each lazily created instrument here and keep
//! whatever instrument the registry hands back. Backends read the
//! registered meters back when they scrape or push.

use crate::domain::{Meter, MeterId, RegisteredMeter};
use crate::error::Result;

/// Sink for named, labeled instruments.
///
/// Implementations must be safe to call from any thread. Several
/// runtimes may share one registry, so the same [`MeterId`] can be
/// registered more than once.
pub trait MeterRegistry: Send + Sync + 'static {
    /// Register a live instrument under `id` and return the canonical one.
    ///
    /// When `id` is already registered with the same kind, the existing
    /// meter is returned and `meter` is dropped. A kind mismatch is
    /// [`MetricsError::DuplicateMeter`](crate::error::MetricsError::DuplicateMeter).
    fn register(&self, id: MeterId, meter: Meter) -> Result<Meter>;

    /// Snapshot of everything registered so far.
    fn meters(&self) -> Vec<RegisteredMeter>;
}
