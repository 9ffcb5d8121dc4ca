//! Metrics Categories - Independently Toggleable Metric Groups
//!
//! Each category maps to one adapter in `adapters::vertx`. A disabled
//! category is never built, so none of its families are registered.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Group of metrics that can be disabled as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricsCategory {
    HttpServer,
    HttpClient,
    NetServer,
    NetClient,
    DatagramSocket,
    EventBus,
    NamedPools,
    Verticles,
}

impl MetricsCategory {
    /// All categories, in a stable order.
    pub const ALL: [MetricsCategory; 8] = [
        Self::HttpServer,
        Self::HttpClient,
        Self::NetServer,
        Self::NetClient,
        Self::DatagramSocket,
        Self::EventBus,
        Self::NamedPools,
        Self::Verticles,
    ];
}

impl fmt::Display for MetricsCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::HttpServer => "HTTP_SERVER",
            Self::HttpClient => "HTTP_CLIENT",
            Self::NetServer => "NET_SERVER",
            Self::NetClient => "NET_CLIENT",
            Self::DatagramSocket => "DATAGRAM_SOCKET",
            Self::EventBus => "EVENT_BUS",
            Self::NamedPools => "NAMED_POOLS",
            Self::Verticles => "VERTICLES",
        };
        f.write_str(name)
    }
}
