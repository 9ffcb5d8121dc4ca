//! Use Cases Layer - Metric Families
//!
//! Orchestrates the domain instruments with the `MeterRegistry` port:
//! a family lazily creates one instrument per label tuple and registers
//! it with whatever backend the directory handed out.

pub mod families;

pub use families::{Counters, Family, Gauges, Summaries, Timers};
