//! lanpeer-store — the discovered and active peer registries.
//!
//! Two stores form a pipeline: `DiscoveredPeerStore` runs the UDP
//! announce/respond protocol and accumulates every peer seen on the
//! broadcast port; `ActivePeerStore` consumes its change stream, performs
//! an HTTP handshake per newly-discovered peer, and keeps a peer in the
//! active set for as long as its recurring liveness poll keeps succeeding.
//! Both publish insertion-ordered snapshots to subscribers.

pub mod active;
pub mod discovered;
pub mod liveness;
pub mod notify;

mod http;

pub use active::{ActivePeer, ActivePeerStore};
pub use discovered::{DiscoveredPeer, DiscoveredPeerStore};
pub use liveness::LivenessClient;
pub use notify::{Notifier, Subscription};

use std::net::SocketAddr;

/// Errors from starting a store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The discovery socket could not be bound. Unrecoverable for the
    /// process — without it the node cannot be found.
    #[error("failed to bind discovery socket on udp port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// The liveness HTTP server could not be started.
    #[error("failed to bind liveness server on {addr}: {source}")]
    HttpBind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}
