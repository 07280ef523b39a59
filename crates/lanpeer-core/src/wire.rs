//! Announce wire format — the UDP discovery message.
//!
//! Every discovery datagram, broadcast or unicast, is one UTF-8 JSON
//! `AnnounceMessage`. Field names are camelCase on the wire. The only
//! method in this protocol version is `"SELF"`; a parseable message with
//! any other method is rejected at decode time and the caller discards it.

use serde::{Deserialize, Serialize};

use crate::identity::{LocalIdentity, PeerId};

/// Well-known UDP port for announce traffic. Both broadcast and unicast
/// replies use this port.
pub const DISCOVER_PORT: u16 = 8008;

/// Fallback liveness HTTP port, used when ephemeral allocation fails.
pub const DEFAULT_HTTP_PORT: u16 = 8009;

/// The only announce method in this protocol version.
pub const METHOD_SELF: &str = "SELF";

/// A discovery announce, as sent on the wire.
///
/// The `ip` field is informational — receivers trust the transport-observed
/// UDP source address instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnounceMessage {
    pub method: String,
    pub id: PeerId,
    pub name: String,
    pub ip: String,
    pub http_port: u16,
    pub is_broadcast: bool,
}

impl AnnounceMessage {
    /// Build the announce for this node.
    pub fn announce(identity: &LocalIdentity, is_broadcast: bool) -> Self {
        Self {
            method: METHOD_SELF.to_string(),
            id: identity.id.clone(),
            name: identity.hostname.clone(),
            ip: identity.ip.to_string(),
            http_port: identity.http_port,
            is_broadcast,
        }
    }

    /// Serialize to JSON bytes for the wire.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        serde_json::to_vec(self).map_err(WireError::Encode)
    }

    /// Strict decode of a received datagram.
    ///
    /// Malformed JSON or missing fields fail with `Malformed`; a parseable
    /// message whose method is not `"SELF"` fails with `UnknownMethod`.
    /// Neither failure may terminate the receive loop — callers log and
    /// move on to the next datagram.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let msg: AnnounceMessage =
            serde_json::from_slice(bytes).map_err(WireError::Malformed)?;
        if msg.method != METHOD_SELF {
            return Err(WireError::UnknownMethod(msg.method));
        }
        Ok(msg)
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting announce datagrams.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("malformed announce message: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("unknown announce method: {0:?}")]
    UnknownMethod(String),

    #[error("failed to encode announce message: {0}")]
    Encode(#[source] serde_json::Error),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
