//! Instruments - Lock-free Metric Accumulators
//!
//! Counter, Gauge, Timer and Summary values are plain atomics so that
//! lifecycle callbacks arriving from many I/O threads can update them
//! without taking a lock. Floating point values are stored as their
//! bit pattern in an `AtomicU64` and updated with a CAS loop.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::debug;

/// Kind of instrument held by a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeterKind {
    Counter,
    Gauge,
    Timer,
    Summary,
}

impl fmt::Display for MeterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Counter => write!(f, "counter"),
            Self::Gauge => write!(f, "gauge"),
            Self::Timer => write!(f, "timer"),
            Self::Summary => write!(f, "summary"),
        }
    }
}

/// `f64` stored as bits in an `AtomicU64`.
#[derive(Debug, Default)]
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    fn set(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Release);
    }

    fn add(&self, delta: f64) -> f64 {
        self.update(|current| current + delta)
    }

    fn max(&self, candidate: f64) {
        self.update(|current| current.max(candidate));
    }

    /// Apply `f` atomically and return the value it stored.
    fn update(&self, f: impl Fn(f64) -> f64) -> f64 {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let next = f(f64::from_bits(current));
            match self.0.compare_exchange_weak(
                current,
                next.to_bits(),
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Monotonic, non-negative accumulator.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicF64,
}

impl Counter {
    /// Add one.
    pub fn increment(&self) {
        self.increment_by(1.0);
    }

    /// Add `amount`. Negative or non-finite amounts are ignored.
    pub fn increment_by(&self, amount: f64) {
        if !amount.is_finite() || amount < 0.0 {
            debug!(amount, "Ignoring invalid counter increment");
            return;
        }
        self.value.add(amount);
    }

    /// Accumulated total.
    pub fn count(&self) -> f64 {
        self.value.get()
    }
}

/// Signed accumulator that can move in both directions or be overridden.
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicF64,
}

impl Gauge {
    pub fn increment(&self) {
        self.add(1.0);
    }

    pub fn decrement(&self) {
        self.add(-1.0);
    }

    /// Add a signed delta.
    pub fn add(&self, delta: f64) {
        self.value.add(delta);
    }

    /// Add a signed delta and return the value this update produced.
    pub fn add_and_get(&self, delta: f64) -> f64 {
        self.value.add(delta)
    }

    /// Absolute override of the current value.
    pub fn set(&self, value: f64) {
        self.value.set(value);
    }

    pub fn value(&self) -> f64 {
        self.value.get()
    }
}

/// Count, total and max of recorded durations.
#[derive(Debug, Default)]
pub struct Timer {
    count: AtomicU64,
    total_nanos: AtomicU64,
    max_nanos: AtomicU64,
}

impl Timer {
    /// Record one observation.
    pub fn record(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.count.fetch_add(1, Ordering::AcqRel);
        self.total_nanos.fetch_add(nanos, Ordering::AcqRel);
        self.max_nanos.fetch_max(nanos, Ordering::AcqRel);
    }

    /// Number of recorded observations.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    /// Sum of all recorded durations.
    pub fn total_time(&self) -> Duration {
        Duration::from_nanos(self.total_nanos.load(Ordering::Acquire))
    }

    /// Largest recorded duration.
    pub fn max(&self) -> Duration {
        Duration::from_nanos(self.max_nanos.load(Ordering::Acquire))
    }

    /// Average duration, zero when nothing was recorded.
    pub fn mean(&self) -> Duration {
        match self.count() {
            0 => Duration::ZERO,
            n => self.total_time() / u32::try_from(n).unwrap_or(u32::MAX),
        }
    }
}

/// In-flight timing bound to one timer.
///
/// `end` consumes the sample, so an observation is recorded at most
/// once. Dropping a sample without ending it records nothing.
#[must_use = "a timer sample records nothing unless `end` is called"]
#[derive(Debug)]
pub struct TimerSample {
    timer: Arc<Timer>,
    started: Instant,
}

impl TimerSample {
    /// Start timing against `timer` now.
    pub fn start(timer: Arc<Timer>) -> Self {
        Self {
            timer,
            started: Instant::now(),
        }
    }

    /// Record the elapsed time and return it.
    pub fn end(self) -> Duration {
        let elapsed = self.started.elapsed();
        self.timer.record(elapsed);
        elapsed
    }
}

/// Count, total and max of recorded magnitudes (e.g. byte counts).
#[derive(Debug, Default)]
pub struct Summary {
    count: AtomicU64,
    total: AtomicF64,
    max: AtomicF64,
}

impl Summary {
    /// Record one observation. Non-finite values are ignored.
    pub fn record(&self, amount: f64) {
        if !amount.is_finite() {
            debug!(amount, "Ignoring non-finite summary observation");
            return;
        }
        self.count.fetch_add(1, Ordering::AcqRel);
        self.total.add(amount);
        self.max.max(amount);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    pub fn total(&self) -> f64 {
        self.total.get()
    }

    pub fn max(&self) -> f64 {
        self.max.get()
    }

    pub fn mean(&self) -> f64 {
        match self.count() {
            0 => 0.0,
            n => self.total() / n as f64,
        }
    }
}

/// A named tag attached to a registered meter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Identity of a meter as seen by a backend.
///
/// Two meters with the same name and tags are the same meter;
/// the description is informational only.
#[derive(Debug, Clone)]
pub struct MeterId {
    /// Metric name (`vertx_net_client_connections`).
    pub name: String,
    /// Human-readable help text.
    pub description: String,
    /// Tags in declaration order.
    pub tags: Vec<Tag>,
}

impl MeterId {
    /// Pair `keys` with `values` positionally, truncated to the shorter.
    pub fn new<S: AsRef<str>>(
        name: &str,
        description: &str,
        keys: &[String],
        values: &[S],
    ) -> Self {
        let tags = keys
            .iter()
            .zip(values.iter())
            .map(|(k, v)| Tag::new(k.as_str(), v.as_ref()))
            .collect();
        Self {
            name: name.to_string(),
            description: description.to_string(),
            tags,
        }
    }
}

impl PartialEq for MeterId {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.tags == other.tags
    }
}

impl Eq for MeterId {}

impl std::hash::Hash for MeterId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.tags.hash(state);
    }
}

impl fmt::Display for MeterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.tags.is_empty() {
            let tags: Vec<String> = self
                .tags
                .iter()
                .map(|t| format!("{}={}", t.key, t.value))
                .collect();
            write!(f, "[{}]", tags.join(","))?;
        }
        Ok(())
    }
}

/// A live instrument handed to a backend.
#[derive(Debug, Clone)]
pub enum Meter {
    Counter(Arc<Counter>),
    Gauge(Arc<Gauge>),
    Timer(Arc<Timer>),
    Summary(Arc<Summary>),
}

impl Meter {
    pub fn kind(&self) -> MeterKind {
        match self {
            Self::Counter(_) => MeterKind::Counter,
            Self::Gauge(_) => MeterKind::Gauge,
            Self::Timer(_) => MeterKind::Timer,
            Self::Summary(_) => MeterKind::Summary,
        }
    }
}

/// Instruments that can be lazily created by a family.
pub trait Instrument: Default + Send + Sync + 'static {
    /// Kind reported to backends.
    const KIND: MeterKind;

    /// Wrap a shared instrument for registration.
    fn to_meter(this: &Arc<Self>) -> Meter;

    /// Shared instrument inside `meter`, if it is of this kind.
    fn from_meter(meter: &Meter) -> Option<Arc<Self>>;
}

impl Instrument for Counter {
    const KIND: MeterKind = MeterKind::Counter;

    fn to_meter(this: &Arc<Self>) -> Meter {
        Meter::Counter(Arc::clone(this))
    }

    fn from_meter(meter: &Meter) -> Option<Arc<Self>> {
        match meter {
            Meter::Counter(inner) => Some(Arc::clone(inner)),
            _ => None,
        }
    }
}

impl Instrument for Gauge {
    const KIND: MeterKind = MeterKind::Gauge;

    fn to_meter(this: &Arc<Self>) -> Meter {
        Meter::Gauge(Arc::clone(this))
    }

    fn from_meter(meter: &Meter) -> Option<Arc<Self>> {
        match meter {
            Meter::Gauge(inner) => Some(Arc::clone(inner)),
            _ => None,
        }
    }
}

impl Instrument for Timer {
    const KIND: MeterKind = MeterKind::Timer;

    fn to_meter(this: &Arc<Self>) -> Meter {
        Meter::Timer(Arc::clone(this))
    }

    fn from_meter(meter: &Meter) -> Option<Arc<Self>> {
        match meter {
            Meter::Timer(inner) => Some(Arc::clone(inner)),
            _ => None,
        }
    }
}

impl Instrument for Summary {
    const KIND: MeterKind = MeterKind::Summary;

    fn to_meter(this: &Arc<Self>) -> Meter {
        Meter::Summary(Arc::clone(this))
    }

    fn from_meter(meter: &Meter) -> Option<Arc<Self>> {
        match meter {
            Meter::Summary(inner) => Some(Arc::clone(inner)),
            _ => None,
        }
    }
}

/// A meter together with its identity, as stored by a backend.
#[derive(Debug, Clone)]
pub struct RegisteredMeter {
    pub id: MeterId,
    pub meter: Meter,
}
