//! This node's liveness HTTP endpoints.
//!
//! Remote peers handshake against `/get-active-peer` and poll
//! `/active-peer-alive-check`. The alive-check handler sleeps before
//! answering on purpose — that server-side delay is what paces every remote
//! poll loop, so it must not be optimized away. `/peers` exposes both
//! registries as a snapshot for the CLI client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};

use crate::active::{ActiveInner, ActivePeer};
use crate::discovered::{DiscoveredPeer, DiscoveredPeerStore};
use crate::StoreError;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) discovered: Arc<DiscoveredPeerStore>,
    pub(crate) active: Arc<ActiveInner>,
    pub(crate) alive_check_delay: Duration,
}

/// Running liveness server. Shut down via `shutdown()`; in-flight requests
/// are drained rather than dropped.
pub(crate) struct LivenessServer {
    shutdown_tx: oneshot::Sender<()>,
    _task: JoinHandle<()>,
    pub(crate) local_addr: SocketAddr,
}

impl LivenessServer {
    pub(crate) fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
    }
}

pub(crate) async fn serve(state: AppState, addr: SocketAddr) -> Result<LivenessServer, StoreError> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/get-active-peer", get(handle_get_active_peer))
        .route("/active-peer-alive-check", get(handle_alive_check))
        .route("/peers", get(handle_peers))
        .with_state(state)
        .layer(cors);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| StoreError::HttpBind { addr, source })?;
    let local_addr = listener
        .local_addr()
        .map_err(|source| StoreError::HttpBind { addr, source })?;

    tracing::info!(addr = %local_addr, "liveness endpoints listening");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        let serve = axum::serve(listener, app).with_graceful_shutdown(async {
            shutdown_rx.await.ok();
        });
        if let Err(e) = serve.await {
            tracing::error!(error = %e, "liveness server failed");
        }
    });

    Ok(LivenessServer {
        shutdown_tx,
        _task: task,
        local_addr,
    })
}

// ── Handlers ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct HandshakeReply {
    msg: &'static str,
}

#[derive(Serialize)]
struct AliveReply {
    active: bool,
}

#[derive(Serialize)]
struct PeersReply {
    discovered: Vec<DiscoveredPeer>,
    active: Vec<ActivePeer>,
}

/// Handshake endpoint — answers immediately.
async fn handle_get_active_peer() -> Json<HandshakeReply> {
    Json(HandshakeReply { msg: "peer active" })
}

/// Liveness poll endpoint — answers after the configured delay, which sets
/// the remote poller's interval.
async fn handle_alive_check(State(state): State<AppState>) -> Json<AliveReply> {
    tokio::time::sleep(state.alive_check_delay).await;
    Json(AliveReply { active: true })
}

/// Snapshot of both registries for CLI/TUI consumers.
async fn handle_peers(State(state): State<AppState>) -> Json<PeersReply> {
    Json(PeersReply {
        discovered: state.discovered.get_discovered_peers(),
        active: state.active.snapshot(),
    })
}
