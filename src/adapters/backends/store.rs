//! Meter Store - In-Memory Meter Registry
//!
//! Keeps every registered meter keyed by identity so backends can read
//! live values back at scrape or push time. `NoopRegistry` is the
//! disabled-backend counterpart that keeps nothing.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::domain::{Meter, MeterId, RegisteredMeter};
use crate::error::{MetricsError, Result};
use crate::ports::meter_registry::MeterRegistry;

/// Registry that holds meters until cleared.
#[derive(Debug, Default)]
pub struct MeterStore {
    /// Registered meters by identity.
    meters: DashMap<MeterId, Meter>,
}

impl MeterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered meters.
    pub fn len(&self) -> usize {
        self.meters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meters.is_empty()
    }

    /// Forget every registered meter.
    pub fn clear(&self) {
        self.meters.clear();
    }
}

impl MeterRegistry for MeterStore {
    fn register(&self, id: MeterId, meter: Meter) -> Result<Meter> {
        match self.meters.entry(id) {
            Entry::Occupied(entry) if entry.get().kind() == meter.kind() => Ok(entry.get().clone()),
            Entry::Occupied(entry) => Err(MetricsError::DuplicateMeter {
                id: entry.key().to_string(),
                existing: entry.get().kind(),
                requested: meter.kind(),
            }),
            Entry::Vacant(entry) => {
                entry.insert(meter.clone());
                Ok(meter)
            }
        }
    }

    /// Meters sorted by name, then tags, for stable output.
    fn meters(&self) -> Vec<RegisteredMeter> {
        let mut meters: Vec<RegisteredMeter> = self
            .meters
            .iter()
            .map(|entry| RegisteredMeter {
                id: entry.key().clone(),
                meter: entry.value().clone(),
            })
            .collect();
        meters.sort_by(|a, b| {
            a.id.name
                .cmp(&b.id.name)
                .then_with(|| a.id.tags.cmp(&b.id.tags))
        });
        meters
    }
}

/// Registry for the disabled backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRegistry;

impl MeterRegistry for NoopRegistry {
    fn register(&self, _id: MeterId, meter: Meter) -> Result<Meter> {
        Ok(meter)
    }

    fn meters(&self) -> Vec<RegisteredMeter> {
        Vec::new()
    }
}
