//! Discovered peer store — the UDP announce/respond protocol.
//!
//! On start the store binds the well-known discovery port, fires one
//! broadcast announce, and then answers datagrams one at a time in arrival
//! order. Peers enter the set the first time their id is seen and stay
//! there until `clear()` — there is no discovery-side eviction timer; only
//! the active store evicts.
//!
//! Reply rule: a unicast announce goes back to the sender iff the sender is
//! new to us or its message was a broadcast. Every broadcaster therefore
//! gets a reply from every live listener (bidirectional first contact),
//! while repeat unicast chatter to already-known peers is suppressed.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use lanpeer_core::wire::AnnounceMessage;
use lanpeer_core::{LocalIdentity, PeerId};

use crate::notify::{Notifier, Subscription};
use crate::StoreError;

/// A peer learned via the announce protocol, regardless of HTTP
/// reachability. Immutable after first insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredPeer {
    pub id: PeerId,
    /// Peer's announced hostname.
    pub name: String,
    /// Transport-observed UDP source address. The payload `ip` field is
    /// informational only and never stored.
    pub ip: String,
    pub http_port: u16,
}

struct Inner {
    identity: LocalIdentity,
    /// Insertion order is the public iteration order.
    peers: Mutex<Vec<DiscoveredPeer>>,
    notifier: Notifier<DiscoveredPeer>,
}

struct RunState {
    socket: Arc<UdpSocket>,
    recv_task: JoinHandle<()>,
}

/// Registry of peers seen on the discovery port.
pub struct DiscoveredPeerStore {
    inner: Arc<Inner>,
    discover_port: u16,
    runtime: Mutex<Option<RunState>>,
}

impl DiscoveredPeerStore {
    pub fn new(identity: LocalIdentity, discover_port: u16) -> Self {
        Self {
            inner: Arc::new(Inner {
                identity,
                peers: Mutex::new(Vec::new()),
                notifier: Notifier::new(),
            }),
            discover_port,
            runtime: Mutex::new(None),
        }
    }

    /// Bind the discovery socket, send the initial broadcast announce, and
    /// spawn the receive loop. A second call while running is a no-op.
    ///
    /// Bind failure is returned to the caller — without the discovery port
    /// this node cannot be found, so the process should treat it as fatal.
    pub async fn start(&self) -> Result<(), StoreError> {
        let socket = {
            let mut run = lock(&self.runtime);
            if run.is_some() {
                return Ok(());
            }
            let socket = Arc::new(bind_discovery_socket(self.discover_port).map_err(
                |source| StoreError::Bind {
                    port: self.discover_port,
                    source,
                },
            )?);
            let recv_task = tokio::spawn(recv_loop(socket.clone(), self.inner.clone()));
            *run = Some(RunState {
                socket: socket.clone(),
                recv_task,
            });
            socket
        };

        tracing::info!(port = self.discover_port, "discovery listening");

        // Announce ourselves once. A send error here does not stop the
        // server — peers can still find us by broadcasting.
        let dest = SocketAddrV4::new(self.inner.identity.broadcast, self.discover_port);
        match AnnounceMessage::announce(&self.inner.identity, true).encode() {
            Ok(bytes) => {
                if let Err(e) = socket.send_to(&bytes, dest).await {
                    tracing::warn!(error = %e, dest = %dest, "initial broadcast failed");
                } else {
                    tracing::debug!(dest = %dest, "initial broadcast sent");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to encode initial broadcast"),
        }

        Ok(())
    }

    /// Close the discovery socket and stop the receive loop.
    /// Stopping a never-started or already-stopped store is a no-op.
    pub fn stop(&self) {
        if let Some(run) = lock(&self.runtime).take() {
            run.recv_task.abort();
            drop(run.socket);
            tracing::info!(port = self.discover_port, "discovery stopped");
        }
    }

    /// Empty the discovered set and notify with an empty snapshot.
    /// Does not touch the socket.
    pub fn clear(&self) {
        lock(&self.inner.peers).clear();
        self.inner.notifier.notify(&[]);
    }

    /// Current peers, in discovery order.
    pub fn get_discovered_peers(&self) -> Vec<DiscoveredPeer> {
        lock(&self.inner.peers).clone()
    }

    /// Subscribe to snapshot notifications. The listener fires on every
    /// insertion and on `clear()`.
    pub fn subscribe(
        &self,
        listener: impl Fn(&[DiscoveredPeer]) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.inner.notifier.subscribe(listener);
        let inner = self.inner.clone();
        Subscription::new(move || inner.notifier.unsubscribe(id))
    }
}

impl Drop for DiscoveredPeerStore {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Receive loop ──────────────────────────────────────────────────────────────

async fn recv_loop(socket: Arc<UdpSocket>, inner: Arc<Inner>) {
    let mut buf = vec![0u8; 2048];
    loop {
        let (len, src) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                // Socket-level failure is terminal for discovery; the
                // caller decides whether to restart.
                tracing::error!(error = %e, "discovery socket error, receive loop stopping");
                break;
            }
        };
        handle_datagram(&socket, &inner, &buf[..len], src).await;
    }
}

/// Handle one announce datagram. Never fails the receive loop — every
/// per-message problem is logged and the next datagram is processed.
async fn handle_datagram(socket: &UdpSocket, inner: &Inner, payload: &[u8], src: SocketAddr) {
    let msg = match AnnounceMessage::decode(payload) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::debug!(from = %src, error = %e, "discarding datagram");
            return;
        }
    };

    // Self-echo suppression: our own broadcast comes back to us.
    if msg.id == inner.identity.id {
        return;
    }

    let peer = DiscoveredPeer {
        id: msg.id.clone(),
        name: msg.name.clone(),
        ip: src.ip().to_string(),
        http_port: msg.http_port,
    };

    let (is_new, snapshot) = {
        let mut peers = lock(&inner.peers);
        if peers.iter().any(|p| p.id == peer.id) {
            (false, Vec::new())
        } else {
            peers.push(peer.clone());
            (true, peers.clone())
        }
    };

    if is_new {
        tracing::info!(peer = %peer.id, name = %peer.name, addr = %src, "peer discovered");
        inner.notifier.notify(&snapshot);
    }

    // Reply iff new or broadcast. Known unicast senders already have us.
    if is_new || msg.is_broadcast {
        match AnnounceMessage::announce(&inner.identity, false).encode() {
            Ok(bytes) => {
                if let Err(e) = socket.send_to(&bytes, src).await {
                    tracing::warn!(error = %e, dest = %src, "announce reply failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to encode announce reply"),
        }
    }
}

/// Build the discovery socket: reuse-address so several nodes can share a
/// host, broadcast-capable for the initial announce, bound on all
/// interfaces.
fn bind_discovery_socket(port: u16) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into())?;
    UdpSocket::from_std(socket.into())
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
