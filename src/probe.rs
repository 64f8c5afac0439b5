use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use log::debug;
use serde::{Deserialize, Serialize};

/// An open TCP port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// The target as it was given, e.g. `example.com:443`.
    pub target: String,
    /// The address the connection succeeded on.
    pub addr: SocketAddr,
    /// Time taken by the successful connect, in milliseconds.
    pub elapsed_ms: u64,
}

/// Addresses a host name resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// The host as it was given.
    pub host: String,
    /// Resolved addresses, deduplicated, in resolver order.
    pub addrs: Vec<IpAddr>,
}

/// Tries a TCP connect to `target` (`host:port`).
///
/// Returns `None` when the target does not resolve or no address accepts the
/// connection within `timeout`.
pub fn probe(target: &str, timeout: Duration) -> Option<ProbeResult> {
    let addrs = match target.to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            debug!("Cannot resolve {}: {}", target, e);
            return None;
        }
    };

    for addr in addrs {
        let start = Instant::now();
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(_) => {
                return Some(ProbeResult {
                    target: target.to_owned(),
                    addr,
                    elapsed_ms: start.elapsed().as_millis() as u64,
                });
            }
            Err(e) => debug!("{} ({}): {}", target, addr, e),
        }
    }
    None
}

/// Resolves `host` to its IP addresses. `None` if it resolves to nothing.
pub fn resolve(host: &str) -> Option<Resolution> {
    let resolved = match (host, 0).to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            debug!("Cannot resolve {}: {}", host, e);
            return None;
        }
    };

    let mut addrs: Vec<IpAddr> = Vec::new();
    for addr in resolved {
        if !addrs.contains(&addr.ip()) {
            addrs.push(addr.ip());
        }
    }
    if addrs.is_empty() {
        return None;
    }
    Some(Resolution {
        host: host.to_owned(),
        addrs,
    })
}
