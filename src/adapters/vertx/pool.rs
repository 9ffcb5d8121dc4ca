//! Pool Metrics - Named Worker Pools and Datasources
//!
//! A task is queued (`submitted`), then either rejected or started
//! (`begin`), and finally released (`end`). Queue delay and usage are
//! timed separately. The usage ratio is only published when the pool
//! reports a positive maximum size.

use std::sync::Arc;

use crate::domain::{TimerSample, labels};
use crate::ports::meter_registry::MeterRegistry;
use crate::ports::metrics_spi::PoolMetrics;
use crate::usecases::{Counters, Gauges, Timers};

/// Families of the named pools category.
pub struct VertxPoolMetrics {
    queue_delay: Timers,
    queue_size: Gauges,
    usage: Timers,
    in_use: Gauges,
    ratio: Gauges,
    completed: Counters,
}

impl VertxPoolMetrics {
    pub fn new(registry: &Arc<dyn MeterRegistry>) -> Self {
        let pool = [labels::POOL_TYPE, labels::POOL_NAME];
        Self {
            queue_delay: Timers::new(
                "vertx_pool_queue_delay",
                "Queue time for a resource",
                Arc::clone(registry),
                &pool,
            ),
            queue_size: Gauges::new(
                "vertx_pool_queue_size",
                "Number of elements waiting for a resource",
                Arc::clone(registry),
                &pool,
            ),
            usage: Timers::new(
                "vertx_pool_usage",
                "Time using a resource",
                Arc::clone(registry),
                &pool,
            ),
            in_use: Gauges::new(
                "vertx_pool_in_use",
                "Number of resources used",
                Arc::clone(registry),
                &pool,
            ),
            ratio: Gauges::new(
                "vertx_pool_ratio",
                "Pool usage ratio, only present if maximum pool size could be determined",
                Arc::clone(registry),
                &[labels::POOL_TYPE, labels::POOL_NAME, labels::MAX_POOL_SIZE],
            ),
            completed: Counters::new(
                "vertx_pool_completed",
                "Number of elements done with the resource",
                Arc::clone(registry),
                &pool,
            ),
        }
    }

    /// Metrics for one pool. `max_pool_size` of 0 means unknown.
    pub fn for_pool(
        self: &Arc<Self>,
        pool_type: &str,
        pool_name: &str,
        max_pool_size: u32,
    ) -> PoolInstance {
        PoolInstance {
            metrics: Arc::clone(self),
            pool_type: pool_type.to_string(),
            pool_name: pool_name.to_string(),
            max_pool_size,
        }
    }
}

/// Metrics of one named pool.
pub struct PoolInstance {
    metrics: Arc<VertxPoolMetrics>,
    pool_type: String,
    pool_name: String,
    max_pool_size: u32,
}

impl PoolInstance {
    fn values(&self) -> [&str; 2] {
        [self.pool_type.as_str(), self.pool_name.as_str()]
    }

    fn update_ratio(&self, in_use: f64) {
        if self.max_pool_size == 0 {
            return;
        }
        let max = self.max_pool_size.to_string();
        self.metrics
            .ratio
            .get(&[self.pool_type.as_str(), self.pool_name.as_str(), max.as_str()])
            .set(in_use / f64::from(self.max_pool_size));
    }
}

impl PoolMetrics for PoolInstance {
    /// Queue delay timing.
    type Task = TimerSample;
    /// Usage timing.
    type Usage = TimerSample;

    fn submitted(&self) -> TimerSample {
        let values = self.values();
        self.metrics.queue_size.get(&values).increment();
        self.metrics.queue_delay.start(&values)
    }

    fn rejected(&self, task: TimerSample) {
        self.metrics.queue_size.get(&self.values()).decrement();
        task.end();
    }

    fn begin(&self, task: TimerSample) -> TimerSample {
        let values = self.values();
        self.metrics.queue_size.get(&values).decrement();
        task.end();
        let in_use = self.metrics.in_use.get(&values).add_and_get(1.0);
        self.update_ratio(in_use);
        self.metrics.usage.start(&values)
    }

    fn end(&self, usage: TimerSample, _succeeded: bool) {
        let values = self.values();
        let in_use = self.metrics.in_use.get(&values).add_and_get(-1.0);
        self.update_ratio(in_use);
        usage.end();
        self.metrics.completed.get(&values).increment();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::backends::MeterStore;
    use crate::domain::Meter;

    fn value(store: &MeterStore, id: &str) -> f64 {
        match store
            .meters()
            .into_iter()
            .find(|m| m.id.to_string() == id)
            .unwrap_or_else(|| panic!("missing meter {id}"))
            .meter
        {
            Meter::Counter(c) => c.count(),
            Meter::Gauge(g) => g.value(),
            Meter::Timer(t) => t.count() as f64,
            Meter::Summary(s) => s.count() as f64,
        }
    }

    #[test]
    fn test_task_lifecycle() {
        let store = Arc::new(MeterStore::new());
        let registry: Arc<dyn MeterRegistry> = store.clone();
        let pool = Arc::new(VertxPoolMetrics::new(&registry)).for_pool("worker", "blocking", 4);

        let first = pool.submitted();
        let second = pool.submitted();
        let third = pool.submitted();
        assert_eq!(value(&store, "vertx_pool_queue_size[pool_type=worker,pool_name=blocking]"), 3.0);

        pool.rejected(third);
        let u1 = pool.begin(first);
        let u2 = pool.begin(second);
        assert_eq!(value(&store, "vertx_pool_in_use[pool_type=worker,pool_name=blocking]"), 2.0);
        assert_eq!(
            value(&store, "vertx_pool_ratio[pool_type=worker,pool_name=blocking,max_pool_size=4]"),
            0.5
        );

        pool.end(u1, true);
        pool.end(u2, false);

        assert_eq!(value(&store, "vertx_pool_queue_size[pool_type=worker,pool_name=blocking]"), 0.0);
        assert_eq!(value(&store, "vertx_pool_in_use[pool_type=worker,pool_name=blocking]"), 0.0);
        assert_eq!(value(&store, "vertx_pool_completed[pool_type=worker,pool_name=blocking]"), 2.0);
        assert_eq!(value(&store, "vertx_pool_queue_delay[pool_type=worker,pool_name=blocking]"), 3.0);
        assert_eq!(value(&store, "vertx_pool_usage[pool_type=worker,pool_name=blocking]"), 2.0);
    }

    #[test]
    fn test_ratio_follows_every_step() {
        let store = Arc::new(MeterStore::new());
        let registry: Arc<dyn MeterRegistry> = store.clone();
        let pool = Arc::new(VertxPoolMetrics::new(&registry)).for_pool("worker", "w", 4);
        let in_use = "vertx_pool_in_use[pool_type=worker,pool_name=w]";
        let ratio = "vertx_pool_ratio[pool_type=worker,pool_name=w,max_pool_size=4]";

        let mut usages = Vec::new();
        for step in 1..=4 {
            usages.push(pool.begin(pool.submitted()));
            assert_eq!(value(&store, in_use), f64::from(step));
            assert_eq!(value(&store, ratio), f64::from(step) / 4.0);
        }
        for step in (0..4).rev() {
            pool.end(usages.pop().unwrap(), true);
            assert_eq!(value(&store, in_use), f64::from(step));
            assert_eq!(value(&store, ratio), f64::from(step) / 4.0);
        }
    }

    #[test]
    fn test_unknown_max_size_has_no_ratio() {
        let store = Arc::new(MeterStore::new());
        let registry: Arc<dyn MeterRegistry> = store.clone();
        let pool = Arc::new(VertxPoolMetrics::new(&registry)).for_pool("datasource", "db", 0);
        let usage = pool.begin(pool.submitted());
        pool.end(usage, true);
        assert!(!store.meters().iter().any(|m| m.id.name == "vertx_pool_ratio"));
    }
}
