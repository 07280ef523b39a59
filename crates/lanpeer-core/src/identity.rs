//! Node identity — the values this process announces about itself.

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

/// Opaque unique peer identifier, generated once per process at startup.
///
/// Stable for the process lifetime. Used as the dedup and eviction key in
/// both peer registries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Generate a fresh random id. Called exactly once per process.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything a node announces about itself: who it is and where its
/// liveness endpoints live.
#[derive(Debug, Clone)]
pub struct LocalIdentity {
    pub id: PeerId,

    /// Hostname, announced as the peer's display name.
    pub hostname: String,

    /// Detected private IPv4 address. The liveness HTTP server binds here.
    pub ip: Ipv4Addr,

    /// Subnet broadcast address for the detected interface.
    pub broadcast: Ipv4Addr,

    /// Port the liveness HTTP server listens on.
    pub http_port: u16,
}
