//! Cardinality Policy - Remote Label Toggle per Direction
//!
//! A server may accept connections from an unbounded set of peers, so
//! tagging its families with the remote address can explode the number
//! of instruments. Clients usually talk to a small, known set of
//! backends. The policy decides, once per category, whether the
//! `remote` label is part of the family key set; the resulting
//! [`LabelSet`] is then used to build every family of that category.

use serde::{Deserialize, Serialize};

use super::labels;

/// Which side of a connection a category measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Client,
    Server,
}

/// Remote-label configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelPolicy {
    /// Tag client families with the remote peer address.
    #[serde(default = "default_remote_for_clients")]
    pub remote_for_clients: bool,
    /// Tag server families with the remote peer address.
    #[serde(default)]
    pub remote_for_servers: bool,
}

impl Default for LabelPolicy {
    fn default() -> Self {
        Self {
            remote_for_clients: default_remote_for_clients(),
            remote_for_servers: false,
        }
    }
}

impl LabelPolicy {
    /// Resolve the label set for one category.
    pub fn label_set(&self, direction: Direction) -> LabelSet {
        let with_remote = match direction {
            Direction::Client => self.remote_for_clients,
            Direction::Server => self.remote_for_servers,
        };
        LabelSet { with_remote }
    }
}

fn default_remote_for_clients() -> bool {
    true
}

/// Label layout shared by every family of a category.
///
/// Keys are always `local`, then `remote` when enabled, then the
/// family-specific extras. Values are laid out the same way, so
/// adapters never branch on the remote toggle themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelSet {
    with_remote: bool,
}

impl LabelSet {
    /// Whether the `remote` label is included.
    pub fn has_remote(&self) -> bool {
        self.with_remote
    }

    /// Ordered label names for a family with the given extras.
    pub fn keys(&self, extra: &[&'static str]) -> Vec<&'static str> {
        let mut keys = Vec::with_capacity(2 + extra.len());
        keys.push(labels::LOCAL);
        if self.with_remote {
            keys.push(labels::REMOTE);
        }
        keys.extend_from_slice(extra);
        keys
    }

    /// Ordered label values matching [`LabelSet::keys`].
    pub fn values<'a>(&self, local: &'a str, remote: &'a str, extra: &[&'a str]) -> Vec<&'a str> {
        let mut values = Vec::with_capacity(2 + extra.len());
        values.push(local);
        if self.with_remote {
            values.push(remote);
        }
        values.extend_from_slice(extra);
        values
    }
}
