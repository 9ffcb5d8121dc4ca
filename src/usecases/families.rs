//! Metric Families - Lazy Per-Label Instrument Registry
//!
//! A family is a metric name, a description and an ordered set of
//! label names. Instruments are created on first use of each distinct
//! label-value tuple and registered with the backend.
//!
//! Creation is compute-if-absent over a `DashMap`:
//! 1. Fast path: shared lookup of the existing instrument.
//! 2. Miss: build a candidate and register it outside any shard lock.
//!    The registry returns the canonical instrument for the id, which
//!    belongs to another family when several runtimes share a backend.
//! 3. Insert the canonical instrument through the entry API; a racing
//!    loser returns the winner's instrument.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, error};

use crate::domain::{
    Counter, Gauge, Instrument, LabelKey, MeterId, MeterKind, Summary, Timer, TimerSample,
};
use crate::ports::meter_registry::MeterRegistry;

/// Template from which per-label-combination instruments are created.
pub struct Family<I: Instrument> {
    /// Metric name.
    name: String,
    /// Help text.
    description: String,
    /// Declared label names, in order.
    keys: Vec<String>,
    /// Backend the instruments are registered with.
    registry: Arc<dyn MeterRegistry>,
    /// One instrument per distinct label tuple. Never shrinks.
    instruments: DashMap<LabelKey, Arc<I>>,
}

/// Family of monotonic counters.
pub type Counters = Family<Counter>;
/// Family of gauges.
pub type Gauges = Family<Gauge>;
/// Family of duration timers.
pub type Timers = Family<Timer>;
/// Family of magnitude summaries.
pub type Summaries = Family<Summary>;

impl<I: Instrument> Family<I> {
    /// Declare a family. Nothing is registered until the first `get`.
    pub fn new(
        name: &str,
        description: &str,
        registry: Arc<dyn MeterRegistry>,
        keys: &[&str],
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            keys: keys.iter().map(|k| k.to_string()).collect(),
            registry,
            instruments: DashMap::new(),
        }
    }

    /// Instrument for this exact label-value tuple, created on first use.
    ///
    /// Values beyond the declared label count are ignored. A shorter
    /// tuple is accepted and registered with the truncated tag set.
    pub fn get<S: AsRef<str>>(&self, values: &[S]) -> Arc<I> {
        let key = LabelKey::new(values, self.keys.len());

        if let Some(existing) = self.instruments.get(&key) {
            return Arc::clone(existing.value());
        }

        if key.len() < self.keys.len() {
            debug!(
                metric = %self.name,
                declared = self.keys.len(),
                supplied = key.len(),
                "Fewer label values than declared keys, truncating tag set"
            );
        }

        let canonical = self.resolve(&key);
        match self.instruments.entry(key) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&canonical));
                canonical
            }
        }
    }

    /// Register a fresh instrument and keep the one the registry returns.
    ///
    /// Another family sharing the registry may already own the id, in
    /// which case its instrument is returned and ours is dropped.
    fn resolve(&self, key: &LabelKey) -> Arc<I> {
        let candidate = Arc::new(I::default());
        let id = MeterId::new(&self.name, &self.description, &self.keys, key.values());
        match self.registry.register(id, I::to_meter(&candidate)) {
            Ok(meter) => I::from_meter(&meter).unwrap_or(candidate),
            Err(e) => {
                error!(
                    metric = %self.name,
                    labels = ?key,
                    error = %e,
                    "Instrument registration failed"
                );
                candidate
            }
        }
    }

    /// Metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared label names.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Instrument kind of this family.
    pub fn kind(&self) -> MeterKind {
        I::KIND
    }

    /// Number of distinct label tuples seen so far.
    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}

impl Family<Timer> {
    /// Resolve the timer for `values` and start timing now.
    pub fn start<S: AsRef<str>>(&self, values: &[S]) -> TimerSample {
        TimerSample::start(self.get(values))
    }
}

impl<I: Instrument> std::fmt::Debug for Family<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Family")
            .field("name", &self.name)
            .field("kind", &I::KIND)
            .field("keys", &self.keys)
            .field("instruments", &self.instruments.len())
            .finish()
    }
}
