//! Metrics Errors - Library Error Type
//!
//! One error enum for everything the library surface can report.
//! The binary and the config loader wrap these in `anyhow` with context.

use std::fmt::Display;

use thiserror::Error;

use crate::domain::MeterKind;

/// Errors raised while building backends or registering meters.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// The embedded scrape server could not bind its listener.
    #[error("failed to bind embedded metrics server on {addr}: {source}")]
    Bind {
        /// Requested bind address.
        addr: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// A backend needs background tasks but no tokio runtime is active.
    #[error("backend `{0}` requires a running tokio runtime")]
    NoRuntime(&'static str),

    /// A configured URI or endpoint path is unusable.
    #[error("invalid URI `{uri}`: {reason}")]
    InvalidUri {
        /// The configured URI.
        uri: String,
        /// Parser message.
        reason: String,
    },

    /// A meter with the same name and tags exists with another kind.
    #[error("meter `{id}` is already registered as a {existing}, not a {requested}")]
    DuplicateMeter {
        /// Rendered meter identity.
        id: String,
        /// Kind of the meter already registered.
        existing: MeterKind,
        /// Kind that was requested.
        requested: MeterKind,
    },

    /// Error from the Prometheus registry or text encoder.
    #[error("prometheus: {0}")]
    Prometheus(#[from] prometheus::Error),

    /// A push body could not be gzip-encoded.
    #[error("failed to compress InfluxDB batch: {0}")]
    Compress(#[source] std::io::Error),

    /// Transport error talking to InfluxDB.
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    /// InfluxDB answered a write with a non-success status.
    #[error("InfluxDB write rejected with status {status}: {body}")]
    InfluxWrite {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },
}

impl MetricsError {
    /// Build a bind error for the given address.
    pub fn bind(addr: impl Display, source: std::io::Error) -> Self {
        Self::Bind {
            addr: addr.to_string(),
            source,
        }
    }
}

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, MetricsError>;
