// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Local interface discovery and host-name resolution.
//!
//! Discovery matching and residency checks compare dotted-decimal IPv4
//! strings, the form the wire protocol carries.

use std::io;
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};

/// The set of IPv4 addresses this machine answers on. Loopback is always a
/// member: a service bound to 127.0.0.1 is local by definition.
#[derive(Debug, Clone)]
pub struct LocalAddrs {
    addrs: Vec<String>,
}

impl LocalAddrs {
    /// Enumerate the machine's IPv4 addresses.
    ///
    /// Interface enumeration failure is not fatal for discovery (an
    /// anywhere search still works), so this degrades to loopback-only
    /// with a warning instead of erroring.
    pub fn detect() -> Self {
        let mut addrs = vec![Ipv4Addr::LOCALHOST.to_string()];
        match local_ip_address::list_afinet_netifas() {
            Ok(ifaces) => {
                for (_name, ip) in ifaces {
                    if let IpAddr::V4(v4) = ip {
                        let s = v4.to_string();
                        if !addrs.contains(&s) {
                            addrs.push(s);
                        }
                    }
                }
            }
            Err(e) => {
                log::warn!("[IFACE] cannot enumerate local interfaces: {}", e);
            }
        }
        log::debug!("[IFACE] local addresses: {:?}", addrs);
        Self { addrs }
    }

    /// Build from an explicit list (tests).
    pub fn from_addrs(addrs: Vec<String>) -> Self {
        Self { addrs }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.addrs
    }

    pub fn contains(&self, addr: &str) -> bool {
        self.addrs.iter().any(|a| a == addr)
    }

    /// True if any of `addrs` is one of ours. Used by the local/remote
    /// accept filters during discovery.
    pub fn intersects(&self, addrs: &[String]) -> bool {
        addrs.iter().any(|a| self.contains(a))
    }

    /// True if every one of `addrs` is ours (and the list is non-empty).
    /// Used for residency: a responder advertising only our addresses
    /// lives on this machine.
    pub fn contains_all(&self, addrs: &[String]) -> bool {
        !addrs.is_empty() && addrs.iter().all(|a| self.contains(a))
    }
}

/// Resolve a host name or dotted address to its IPv4 addresses as
/// dotted-decimal strings, preserving resolver order.
pub fn resolve_host(host: &str) -> io::Result<Vec<String>> {
    let mut addrs = Vec::new();
    for sa in (host, 0u16).to_socket_addrs()? {
        if let IpAddr::V4(v4) = sa.ip() {
            let s = v4.to_string();
            if !addrs.contains(&s) {
                addrs.push(s);
            }
        }
    }
    if addrs.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no IPv4 address for host {}", host),
        ));
    }
    Ok(addrs)
}
