//! lanpeer-ctl — command-line client for a running lanpeerd.

use anyhow::{Context, Result};
use serde::Deserialize;

use lanpeer_core::netinfo;
use lanpeer_core::wire::DEFAULT_HTTP_PORT;

// ── Response types ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct PeersResponse {
    discovered: Vec<PeerInfo>,
    active: Vec<PeerInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PeerInfo {
    id: String,
    name: String,
    ip: String,
    http_port: u16,
}

// ── HTTP helpers ──────────────────────────────────────────────────────────────

async fn get_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    reqwest::get(url)
        .await
        .with_context(|| format!("failed to connect to lanpeerd at {} — is it running?", url))?
        .json::<T>()
        .await
        .context("failed to parse response")
}

/// The daemon binds its detected private IPv4, not loopback, so default the
/// host to the same detection the daemon performs.
fn default_host() -> String {
    netinfo::local_info()
        .map(|info| info.ip.to_string())
        .unwrap_or_else(|_| "127.0.0.1".to_string())
}

// ── Subcommand handlers ───────────────────────────────────────────────────────

async fn cmd_peers(host: &str, port: u16) -> Result<()> {
    let resp: PeersResponse = get_json(&format!("http://{host}:{port}/peers")).await?;

    println!("Discovered peers: {}", resp.discovered.len());
    for p in &resp.discovered {
        println!("  {}  {}  {}:{}", p.id, p.name, p.ip, p.http_port);
    }
    println!("Active peers: {}", resp.active.len());
    for p in &resp.active {
        println!("  {}  {}  {}:{}", p.id, p.name, p.ip, p.http_port);
    }
    Ok(())
}

async fn cmd_status(host: &str, port: u16) -> Result<()> {
    let resp: PeersResponse = get_json(&format!("http://{host}:{port}/peers")).await?;
    println!(
        "lanpeerd at {}:{} — {} discovered, {} active",
        host,
        port,
        resp.discovered.len(),
        resp.active.len()
    );
    Ok(())
}

fn usage() -> ! {
    eprintln!("usage: lanpeer-ctl [peers|status] [port] [host]");
    eprintln!("  port defaults to {DEFAULT_HTTP_PORT}, host to the detected local address");
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let command = args.first().map(String::as_str).unwrap_or("peers");
    let port: u16 = match args.get(1) {
        Some(v) => v.parse().with_context(|| format!("invalid port: {v}"))?,
        None => DEFAULT_HTTP_PORT,
    };
    let host = args
        .get(2)
        .cloned()
        .unwrap_or_else(default_host);

    match command {
        "peers" => cmd_peers(&host, port).await,
        "status" => cmd_status(&host, port).await,
        _ => usage(),
    }
}
