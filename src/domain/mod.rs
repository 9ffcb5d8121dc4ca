//! Domain layer - Instruments, labels, and cardinality policy.
//!
//! Pure types with no backend dependency: the lock-free instruments,
//! label keys and label-name constants, the metrics categories, and the
//! remote-label policy. Everything here is testable in isolation.

pub mod category;
pub mod instruments;
pub mod labels;
pub mod policy;

// Re-export core types for convenience
pub use category::MetricsCategory;
pub use instruments::{
    Counter, Gauge, Instrument, Meter, MeterId, MeterKind, RegisteredMeter, Summary, Tag, Timer,
    TimerSample,
};
pub use labels::LabelKey;
pub use policy::{Direction, LabelPolicy, LabelSet};
