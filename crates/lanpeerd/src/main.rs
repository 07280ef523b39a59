//! lanpeerd — zero-configuration LAN peer discovery daemon.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use lanpeer_core::config::LanpeerConfig;
use lanpeer_core::{netinfo, LocalIdentity, PeerId};
use lanpeer_store::{ActivePeerStore, DiscoveredPeerStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = LanpeerConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = LanpeerConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        LanpeerConfig::default()
    });

    // Local network identity. Without a private IPv4 address this node can
    // neither announce nor be polled — nothing to do but exit.
    let info = netinfo::local_info().context("unable to get local info")?;
    tracing::info!(
        hostname = %info.hostname,
        ip = %info.ip,
        broadcast = %info.broadcast,
        "local network identity resolved"
    );

    let http_port = if config.network.http_port != 0 {
        config.network.http_port
    } else {
        netinfo::allocate_http_port()
    };

    let identity = LocalIdentity {
        id: PeerId::generate(),
        hostname: info.hostname,
        ip: info.ip,
        broadcast: info.broadcast,
        http_port,
    };
    tracing::info!(id = %identity.id, http_port, "identity ready");

    // Stores
    let discovered = Arc::new(DiscoveredPeerStore::new(
        identity.clone(),
        config.network.discover_port,
    ));
    let active = ActivePeerStore::new(
        identity,
        discovered.clone(),
        Duration::from_secs(config.liveness.alive_check_delay_secs),
    );

    // Log every change in the peer sets.
    let _discovered_sub = discovered.subscribe(|snapshot| {
        tracing::info!(discovered = snapshot.len(), "discovered set changed");
    });
    let _active_sub = active.subscribe(|snapshot| {
        tracing::info!(active = snapshot.len(), "active set changed");
        for peer in snapshot {
            tracing::info!(peer = %peer.id, name = %peer.name, addr = %peer.ip, "  active peer");
        }
    });

    active.start().await.context("failed to start peer stores")?;

    tokio::signal::ctrl_c().await.ok();
    tracing::info!("shutdown signal received");

    active.stop();
    Ok(())
}
