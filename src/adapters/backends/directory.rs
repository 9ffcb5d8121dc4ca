//! Backend Directory - Named Backend Lifecycle
//!
//! Maps a registry name to its live backend. Setup is compute-if-absent:
//! concurrent callers for the same name observe a single backend, the
//! first configuration wins and later options are ignored. `stop`
//! removes and closes the backend; setting the name up again afterwards
//! builds a fresh one.
//!
//! The directory is an owned service. Hand it around by reference or
//! `Arc` instead of reaching for a process-wide static.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info};

use super::BackendRegistry;
use crate::config::BackendOptions;
use crate::error::Result;

/// Name to backend map.
#[derive(Debug, Default)]
pub struct BackendDirectory {
    backends: DashMap<String, Arc<BackendRegistry>>,
}

impl BackendDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend registered under `name`, built from `options` if absent.
    ///
    /// Construction happens under the entry lock, so at most one backend
    /// is ever built per name. A construction error leaves the name
    /// absent.
    pub fn setup_backend(&self, name: &str, options: &BackendOptions) -> Result<Arc<BackendRegistry>> {
        if let Some(existing) = self.backends.get(name) {
            debug!(registry = %name, "Reusing existing metrics backend");
            return Ok(Arc::clone(existing.value()));
        }

        match self.backends.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let backend = Arc::new(BackendRegistry::from_options(options)?);
                info!(registry = %name, backend = backend.kind(), "Metrics backend started");
                entry.insert(Arc::clone(&backend));
                Ok(backend)
            }
        }
    }

    /// Backend registered under `name`, if any.
    pub fn get_now(&self, name: &str) -> Option<Arc<BackendRegistry>> {
        self.backends.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove and close the backend registered under `name`.
    pub fn stop(&self, name: &str) {
        if let Some((_, backend)) = self.backends.remove(name) {
            backend.close();
            info!(registry = %name, backend = backend.kind(), "Metrics backend stopped");
        }
    }

    /// Stop every registered backend.
    pub fn stop_all(&self) {
        for name in self.names() {
            self.stop(&name);
        }
    }

    /// Stop every registered backend and wait for final pushes.
    pub async fn shutdown_all(&self) {
        for name in self.names() {
            if let Some((_, backend)) = self.backends.remove(&name) {
                backend.shutdown().await;
                info!(registry = %name, backend = backend.kind(), "Metrics backend stopped");
            }
        }
    }

    /// Names of the registered backends.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PrometheusOptions;

    fn prometheus() -> BackendOptions {
        BackendOptions::Prometheus(PrometheusOptions::default())
    }

    #[test]
    fn test_first_writer_wins() {
        let directory = BackendDirectory::new();
        let first = directory.setup_backend("a", &prometheus()).unwrap();
        let second = directory.setup_backend("a", &BackendOptions::Disabled).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.kind(), "prometheus");
    }

    #[test]
    fn test_concurrent_setup_builds_once() {
        let directory = BackendDirectory::new();
        let backends: Vec<Arc<BackendRegistry>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| directory.setup_backend("shared", &prometheus()).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(backends.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        let now = directory.get_now("shared").unwrap();
        assert!(Arc::ptr_eq(&now, &backends[0]));
    }

    #[test]
    fn test_stop_and_resetup() {
        let directory = BackendDirectory::new();
        let first = directory.setup_backend("a", &prometheus()).unwrap();
        directory.stop("a");
        assert!(directory.get_now("a").is_none());

        directory.stop("a");

        let fresh = directory.setup_backend("a", &prometheus()).unwrap();
        assert!(!Arc::ptr_eq(&first, &fresh));
    }

    #[test]
    fn test_stop_all() {
        let directory = BackendDirectory::new();
        directory.setup_backend("b", &BackendOptions::Disabled).unwrap();
        directory.setup_backend("a", &prometheus()).unwrap();
        assert_eq!(directory.names(), vec!["a", "b"]);

        directory.stop_all();
        assert!(directory.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_all_empties_directory() {
        let directory = BackendDirectory::new();
        let options = BackendOptions::Prometheus(PrometheusOptions {
            embedded_server: Some(crate::config::EmbeddedServerOptions {
                host: "127.0.0.1".to_string(),
                port: 0,
            }),
            ..PrometheusOptions::default()
        });
        directory.setup_backend("a", &options).unwrap();
        directory.setup_backend("b", &BackendOptions::Disabled).unwrap();

        directory.shutdown_all().await;
        assert!(directory.is_empty());
        directory.shutdown_all().await;
    }

    #[test]
    fn test_failed_setup_leaves_name_absent() {
        let directory = BackendDirectory::new();
        let options = BackendOptions::Prometheus(PrometheusOptions {
            embedded_server: Some(Default::default()),
            ..PrometheusOptions::default()
        });
        // No tokio runtime in a plain test.
        assert!(directory.setup_backend("a", &options).is_err());
        assert!(directory.get_now("a").is_none());
    }
}
