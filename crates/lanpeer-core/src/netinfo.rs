//! Local network identity — hostname, private IPv4, subnet broadcast.
//!
//! Discovery announces are broadcast on the subnet of the first non-loopback
//! RFC 1918 address found on any interface. A node with no usable private
//! address cannot participate — resolution failure is fatal to store
//! construction.

use std::net::Ipv4Addr;

use nix::ifaddrs::getifaddrs;
use nix::net::if_::InterfaceFlags;

use crate::wire::DEFAULT_HTTP_PORT;

/// Resolved local network identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalNetInfo {
    pub hostname: String,
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub broadcast: Ipv4Addr,
}

/// Errors from local identity resolution.
#[derive(Debug, thiserror::Error)]
pub enum NetInfoError {
    #[error("no private IPv4 address found on any interface")]
    NoPrivateIpv4,

    #[error("failed to enumerate network interfaces: {0}")]
    Interfaces(#[source] nix::Error),

    #[error("failed to read hostname: {0}")]
    Hostname(#[source] nix::Error),
}

/// Resolve this node's hostname, private IPv4 address, and the broadcast
/// address of its subnet.
///
/// Interfaces are scanned in OS order; the first non-loopback RFC 1918
/// address with a netmask wins.
pub fn local_info() -> Result<LocalNetInfo, NetInfoError> {
    let hostname = nix::unistd::gethostname()
        .map_err(NetInfoError::Hostname)?
        .to_string_lossy()
        .into_owned();

    let addrs = getifaddrs().map_err(NetInfoError::Interfaces)?;
    for ifaddr in addrs {
        if ifaddr.flags.contains(InterfaceFlags::IFF_LOOPBACK) {
            continue;
        }
        let (Some(addr), Some(mask)) = (ifaddr.address, ifaddr.netmask) else {
            continue;
        };
        let (Some(addr), Some(mask)) = (addr.as_sockaddr_in(), mask.as_sockaddr_in()) else {
            continue;
        };
        let ip = addr.ip();
        if !is_private_ipv4(ip) {
            continue;
        }
        let netmask = mask.ip();
        return Ok(LocalNetInfo {
            hostname,
            ip,
            netmask,
            broadcast: broadcast_address(ip, netmask),
        });
    }

    Err(NetInfoError::NoPrivateIpv4)
}

/// Is this address in one of the RFC 1918 private ranges?
pub fn is_private_ipv4(ip: Ipv4Addr) -> bool {
    let [a, b, _, _] = ip.octets();
    match a {
        10 => true,
        172 => (16..=31).contains(&b),
        192 => b == 168,
        _ => false,
    }
}

/// Subnet broadcast address: host bits all set.
pub fn broadcast_address(ip: Ipv4Addr, netmask: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(ip) | !u32::from(netmask))
}

/// Allocate an ephemeral TCP port for the liveness HTTP server.
///
/// Binds port 0, reads the assigned port, and releases the listener. Falls
/// back to `DEFAULT_HTTP_PORT` if the OS refuses.
pub fn allocate_http_port() -> u16 {
    let allocated = std::net::TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port());

    match allocated {
        Ok(port) => port,
        Err(e) => {
            tracing::warn!(error = %e, fallback = DEFAULT_HTTP_PORT, "port allocation failed");
            DEFAULT_HTTP_PORT
        }
    }
}
