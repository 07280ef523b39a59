//! Active peer store — handshake plus recurring liveness polling.
//!
//! Consumes the discovered store's change stream. Each newly-discovered
//! peer gets exactly one HTTP handshake, no matter how many notifications
//! mention it; on success the peer enters the active set and a poll loop
//! runs until the first failure, which evicts it. A peer whose handshake
//! fails simply stays discovered-only — there is no retry.
//!
//! The store also owns this node's side of the protocol: the liveness HTTP
//! endpoints that remote peers handshake and poll against.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;

use lanpeer_core::{LocalIdentity, PeerId};

use crate::discovered::{DiscoveredPeer, DiscoveredPeerStore};
use crate::http::{self, LivenessServer};
use crate::liveness::LivenessClient;
use crate::notify::{Notifier, Subscription};
use crate::StoreError;

/// A discovered peer that completed the handshake and is passing its
/// liveness polls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivePeer {
    pub id: PeerId,
    pub name: String,
    pub ip: String,
    pub http_port: u16,
}

impl From<&DiscoveredPeer> for ActivePeer {
    fn from(peer: &DiscoveredPeer) -> Self {
        Self {
            id: peer.id.clone(),
            name: peer.name.clone(),
            ip: peer.ip.clone(),
            http_port: peer.http_port,
        }
    }
}

pub(crate) struct ActiveInner {
    peers: Mutex<Vec<ActivePeer>>,
    /// Ids a handshake has been initiated for. Never shrunk by eviction —
    /// an evicted peer is not re-handshaked until `clear()` resets both
    /// stores.
    attempted: Mutex<HashSet<PeerId>>,
    notifier: Notifier<ActivePeer>,
    client: LivenessClient,
}

struct RunState {
    server: LivenessServer,
    // Held so the discovery listener stays registered while running.
    _discovery_sub: Subscription,
}

enum Runtime {
    Idle,
    /// A `start()` call is between binding the server and recording it.
    /// Makes concurrent `start()` calls no-ops instead of double binds.
    Starting,
    Running(RunState),
}

/// Registry of handshaked, currently-responsive peers.
pub struct ActivePeerStore {
    identity: LocalIdentity,
    discovered: Arc<DiscoveredPeerStore>,
    inner: Arc<ActiveInner>,
    alive_check_delay: Duration,
    runtime: Mutex<Runtime>,
}

impl ActivePeerStore {
    pub fn new(
        identity: LocalIdentity,
        discovered: Arc<DiscoveredPeerStore>,
        alive_check_delay: Duration,
    ) -> Self {
        Self {
            identity,
            discovered,
            inner: Arc::new(ActiveInner {
                peers: Mutex::new(Vec::new()),
                attempted: Mutex::new(HashSet::new()),
                notifier: Notifier::new(),
                client: LivenessClient::new(),
            }),
            alive_check_delay,
            runtime: Mutex::new(Runtime::Idle),
        }
    }

    /// Start the liveness endpoints, hook into the discovery change stream,
    /// and start discovery itself. A second call while running is a no-op.
    pub async fn start(&self) -> Result<(), StoreError> {
        {
            let mut runtime = lock(&self.runtime);
            if !matches!(*runtime, Runtime::Idle) {
                return Ok(());
            }
            *runtime = Runtime::Starting;
        }

        let addr = SocketAddr::from((self.identity.ip, self.identity.http_port));
        let server = match http::serve(
            http::AppState {
                discovered: self.discovered.clone(),
                active: self.inner.clone(),
                alive_check_delay: self.alive_check_delay,
            },
            addr,
        )
        .await
        {
            Ok(server) => server,
            Err(e) => {
                *lock(&self.runtime) = Runtime::Idle;
                return Err(e);
            }
        };

        // Subscribe before starting discovery so the snapshot carrying the
        // very first reply is not missed.
        let inner = self.inner.clone();
        let discovery_sub = self
            .discovered
            .subscribe(move |snapshot| inner.on_discovered(snapshot));

        if let Err(e) = self.discovered.start().await {
            server.shutdown();
            *lock(&self.runtime) = Runtime::Idle;
            return Err(e);
        }

        let mut runtime = lock(&self.runtime);
        if matches!(*runtime, Runtime::Starting) {
            *runtime = Runtime::Running(RunState {
                server,
                _discovery_sub: discovery_sub,
            });
        } else {
            // stop() landed while we were starting; undo the bind
            drop(runtime);
            server.shutdown();
            self.discovered.stop();
        }
        Ok(())
    }

    /// Shut down the liveness endpoints, detach from discovery, and stop
    /// the discovered store. Idempotent. Outstanding polls against peers we
    /// evict are abandoned, not cancelled remotely.
    pub fn stop(&self) {
        let prev = std::mem::replace(&mut *lock(&self.runtime), Runtime::Idle);
        if let Runtime::Running(run) = prev {
            run.server.shutdown();
        }
        self.discovered.stop();
    }

    /// Empty the active set, notify, and cascade to the discovered store.
    /// Active state has no independent existence from discovery state, so
    /// the handshake-attempted set resets too.
    pub fn clear(&self) {
        lock(&self.inner.peers).clear();
        lock(&self.inner.attempted).clear();
        self.inner.notifier.notify(&[]);
        self.discovered.clear();
    }

    /// Address the liveness endpoints are actually bound on, once started.
    /// Differs from the configured port when an ephemeral port was used.
    pub fn http_addr(&self) -> Option<SocketAddr> {
        match &*lock(&self.runtime) {
            Runtime::Running(run) => Some(run.server.local_addr),
            _ => None,
        }
    }

    /// Current active peers, in handshake-completion order.
    pub fn get_active_peers(&self) -> Vec<ActivePeer> {
        lock(&self.inner.peers).clone()
    }

    /// Subscribe to snapshot notifications. The listener fires on every
    /// promotion, every eviction, and on `clear()`.
    pub fn subscribe(
        &self,
        listener: impl Fn(&[ActivePeer]) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.inner.notifier.subscribe(listener);
        let inner = self.inner.clone();
        Subscription::new(move || inner.notifier.unsubscribe(id))
    }
}

impl Drop for ActivePeerStore {
    fn drop(&mut self) {
        let prev = std::mem::replace(&mut *lock(&self.runtime), Runtime::Idle);
        if let Runtime::Running(run) = prev {
            run.server.shutdown();
        }
    }
}

// ── Per-peer lifecycle ────────────────────────────────────────────────────────

impl ActiveInner {
    /// Discovery change notification: handshake every peer we have not
    /// tried yet. Handshakes run concurrently — one slow peer never blocks
    /// another.
    fn on_discovered(self: &Arc<Self>, snapshot: &[DiscoveredPeer]) {
        for peer in snapshot {
            if !self.mark_attempted(&peer.id) {
                continue;
            }
            let inner = self.clone();
            let peer = peer.clone();
            tokio::spawn(async move {
                inner.run_handshake(peer).await;
            });
        }
    }

    /// Record a handshake attempt. Returns false if one was already made.
    fn mark_attempted(&self, id: &PeerId) -> bool {
        lock(&self.attempted).insert(id.clone())
    }

    async fn run_handshake(self: Arc<Self>, peer: DiscoveredPeer) {
        match self.client.handshake(&peer).await {
            Ok(()) => {
                let active = ActivePeer::from(&peer);
                // only the handshake that promoted the peer owns a poll
                // loop; a concurrent duplicate must not start a second one
                if self.insert(active.clone()) {
                    tracing::info!(peer = %active.id, name = %active.name, "peer active");
                    self.poll_liveness(active).await;
                }
            }
            Err(e) => {
                // No retry from here; the peer stays discovered-only.
                tracing::debug!(peer = %peer.id, error = %e, "handshake failed");
            }
        }
    }

    /// Tail-recursive poll loop: each successful check immediately issues
    /// the next one — the remote's response delay is the interval. The
    /// first failure evicts the peer and ends the loop.
    async fn poll_liveness(self: Arc<Self>, peer: ActivePeer) {
        loop {
            match self.client.alive_check(&peer).await {
                Ok(active) => {
                    tracing::trace!(peer = %peer.id, active, "liveness poll ok");
                }
                Err(e) => {
                    tracing::warn!(peer = %peer.id, error = %e, "liveness poll failed, evicting");
                    self.remove(&peer.id);
                    break;
                }
            }
        }
    }

    /// Insert unless the id is already present. Notifies on insertion.
    fn insert(&self, peer: ActivePeer) -> bool {
        let snapshot = {
            let mut peers = lock(&self.peers);
            if peers.iter().any(|p| p.id == peer.id) {
                return false;
            }
            peers.push(peer);
            peers.clone()
        };
        self.notifier.notify(&snapshot);
        true
    }

    /// Remove by id. Notifies only if the peer was present.
    fn remove(&self, id: &PeerId) {
        let snapshot = {
            let mut peers = lock(&self.peers);
            let before = peers.len();
            peers.retain(|p| &p.id != id);
            if peers.len() == before {
                return;
            }
            peers.clone()
        };
        self.notifier.notify(&snapshot);
    }

    pub(crate) fn snapshot(&self) -> Vec<ActivePeer> {
        lock(&self.peers).clone()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
