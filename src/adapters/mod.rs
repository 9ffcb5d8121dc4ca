//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (Prometheus registry, HTTP push to InfluxDB,
//! an embedded axum scrape server). Each sub-module groups adapters by
//! concern.
//!
//! Adapter categories:
//! - `backends`: meter registries, exporters and the backend directory
//! - `vertx`: lifecycle callbacks translated into metric families

pub mod backends;
pub mod vertx;
