//! Verticle Metrics - Deployed Instances per Verticle Name

use std::sync::Arc;

use crate::domain::labels;
use crate::ports::meter_registry::MeterRegistry;
use crate::ports::metrics_spi::VerticleMetrics;
use crate::usecases::Gauges;

/// Number of deployed instances per verticle name.
pub struct VertxVerticleMetrics {
    deployed: Gauges,
}

impl VertxVerticleMetrics {
    pub fn new(registry: &Arc<dyn MeterRegistry>) -> Self {
        Self {
            deployed: Gauges::new(
                "vertx_verticle",
                "Number of verticle instances deployed",
                Arc::clone(registry),
                &[labels::NAME],
            ),
        }
    }
}

impl VerticleMetrics for VertxVerticleMetrics {
    fn deployed(&self, name: &str) {
        self.deployed.get(&[name]).increment();
    }

    fn undeployed(&self, name: &str) {
        self.deployed.get(&[name]).decrement();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::backends::MeterStore;

    #[test]
    fn test_deploy_undeploy() {
        let store = Arc::new(MeterStore::new());
        let registry: Arc<dyn MeterRegistry> = store.clone();
        let verticles = VertxVerticleMetrics::new(&registry);

        verticles.deployed("web");
        verticles.deployed("web");
        verticles.deployed("worker");
        verticles.undeployed("web");

        assert!((verticles.deployed.get(&["web"]).value() - 1.0).abs() < f64::EPSILON);
        assert!((verticles.deployed.get(&["worker"]).value() - 1.0).abs() < f64::EPSILON);
        assert_eq!(store.len(), 2);
    }
}
