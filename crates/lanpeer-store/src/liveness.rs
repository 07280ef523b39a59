//! Liveness HTTP client — handshake and recurring poll against one peer.
//!
//! The client deliberately carries no request timeout: the remote's
//! `/active-peer-alive-check` handler delays its response, and that delay is
//! the poll interval. Adding a client timeout would change the protocol's
//! observed pacing.

use serde::Deserialize;

use crate::active::ActivePeer;
use crate::discovered::DiscoveredPeer;

/// Shared HTTP client for handshakes and liveness polls.
#[derive(Clone)]
pub struct LivenessClient {
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct HandshakeBody {
    #[allow(dead_code)]
    msg: String,
}

#[derive(Debug, Deserialize)]
struct AliveBody {
    active: bool,
}

/// A handshake or poll that did not succeed. Any variant means the peer is
/// not (or no longer) considered reachable.
#[derive(Debug, thiserror::Error)]
pub enum LivenessError {
    #[error("liveness request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl LivenessClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// One-time handshake: is this discovered peer alive and speaking our
    /// protocol? Success requires a 2xx response with a parseable body.
    pub async fn handshake(&self, peer: &DiscoveredPeer) -> Result<(), LivenessError> {
        let url = format!("http://{}:{}/get-active-peer", peer.ip, peer.http_port);
        self.http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<HandshakeBody>()
            .await?;
        Ok(())
    }

    /// One liveness poll. The remote holds the request for its configured
    /// delay before answering, which paces the caller's poll loop.
    pub async fn alive_check(&self, peer: &ActivePeer) -> Result<bool, LivenessError> {
        let url = format!("http://{}:{}/active-peer-alive-check", peer.ip, peer.http_port);
        let body = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<AliveBody>()
            .await?;
        Ok(body.active)
    }
}

impl Default for LivenessClient {
    fn default() -> Self {
        Self::new()
    }
}
