// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP discovery search.
//!
//! The coordinator builds one probe socket per configured broadcast and
//! multicast address (plus a unicast socket when the host specifier names
//! a concrete host), fans out one-shot listener threads, and runs the
//! send/wait rounds of the backoff schedule. Replies are decoded, filtered
//! against the host specifier, and accumulated in reply order; the
//! response policy then picks exactly one.
//!
//! ```text
//! send probe on all sockets
//!     v
//! recv_timeout(round budget) over the shared channel
//!     v
//! decode_reply() -> host filter -> candidate table
//!     v                                v
//! restart listener (drain backlog)   host-specific match: stop now
//! ```
//!
//! Malformed datagrams and momentary socket errors are non-matches, never
//! fatal.

pub mod listener;
pub mod responder;

pub use responder::{Responder, ResponderTable, ResponsePolicy};

use crate::config::{DRAIN_WAIT_MS, ROUND_TIMEOUTS_MS};
use crate::error::{Error, Result};
use crate::protocol::probe::{decode_reply, encode_probe};
use crate::session::{HostSpec, SessionConfig};
use crate::transport::ifaces::{resolve_host, LocalAddrs};
use crate::transport::udp::{probe_socket, ProbeKind};
use crossbeam::channel::{self, RecvTimeoutError};
use listener::{ListenEvent, ReplyListener};
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a successful search: the server to connect to, whether it is
/// co-resident, and every candidate that was accepted along the way.
#[derive(Debug)]
pub struct Discovered {
    pub addresses: Vec<String>,
    pub port: u16,
    pub local: bool,
    pub responders: Vec<Responder>,
}

/// One probe socket and the destinations it sends to.
struct SendTarget {
    socket: Arc<UdpSocket>,
    dests: Vec<SocketAddr>,
}

/// Run the discovery search for a non-direct configuration.
pub fn run(config: &SessionConfig, local: &LocalAddrs) -> Result<Discovered> {
    let probe = encode_probe(config.name());

    // A concrete host gets resolved once per search; the resolved set is
    // both a unicast destination and the reply acceptance filter.
    let known: Option<Vec<String>> = match config.host() {
        HostSpec::LocalOnly => Some(local.as_slice().to_vec()),
        HostSpec::Name(h) => Some(resolve_host(h)?),
        HostSpec::Anywhere | HostSpec::RemoteOnly => None,
    };
    let targets = build_send_targets(config, known.as_deref())?;
    if targets.is_empty() {
        return Err(Error::Config(
            "no probe destinations for this contact method".into(),
        ));
    }

    let (tx, rx) = channel::unbounded::<ListenEvent>();
    let sockets: Vec<Arc<UdpSocket>> = targets.iter().map(|t| Arc::clone(&t.socket)).collect();
    let mut listeners: Vec<Option<ReplyListener>> = Vec::with_capacity(sockets.len());
    for (index, socket) in sockets.iter().enumerate() {
        listeners.push(Some(ReplyListener::spawn(
            Arc::clone(socket),
            index,
            tx.clone(),
        )?));
    }

    let mut table = ResponderTable::new();
    let mut chosen: Option<Discovered> = None;
    let mut matched = false;

    'rounds: for (round, budget_ms) in ROUND_TIMEOUTS_MS.iter().enumerate() {
        for target in &targets {
            for dest in &target.dests {
                if let Err(e) = target.socket.send_to(&probe, dest) {
                    log::debug!("[DISC] probe send to {} failed: {}", dest, e);
                }
            }
        }
        log::debug!(
            "[DISC] round {} sent on {} sockets, waiting {} ms",
            round,
            targets.len(),
            budget_ms
        );

        let deadline = std::time::Instant::now() + Duration::from_millis(*budget_ms);
        loop {
            // After a match only short drain windows remain; otherwise the
            // round's budget keeps shrinking no matter how much noise
            // arrives.
            let wait = if matched {
                Duration::from_millis(DRAIN_WAIT_MS)
            } else {
                deadline.saturating_duration_since(std::time::Instant::now())
            };
            if wait.is_zero() {
                continue 'rounds;
            }
            match rx.recv_timeout(wait) {
                Ok(event) => {
                    match event.result {
                        Ok((data, src)) => {
                            if let Ok(reply) = decode_reply(&data) {
                                log::debug!(
                                    "[DISC] reply from {}: port {} addrs {:?}",
                                    src,
                                    reply.port,
                                    reply.addresses
                                );
                                match judge(config.host(), local, known.as_deref(), &reply) {
                                    Verdict::Store => {
                                        table.upsert(reply.addresses, reply.port);
                                        matched = true;
                                    }
                                    Verdict::Take => {
                                        let is_local = local.contains_all(&reply.addresses);
                                        chosen = Some(Discovered {
                                            addresses: reply.addresses,
                                            port: reply.port,
                                            local: is_local,
                                            responders: Vec::new(),
                                        });
                                        matched = true;
                                        break 'rounds;
                                    }
                                    Verdict::Ignore => {}
                                }
                            } else {
                                log::debug!("[DISC] unparseable datagram from {}, ignored", src);
                            }
                            // Restart this socket's listener to drain any
                            // backlogged replies.
                            listeners[event.socket_index] = ReplyListener::spawn(
                                Arc::clone(&sockets[event.socket_index]),
                                event.socket_index,
                                tx.clone(),
                            )
                            .ok();
                        }
                        Err(e) => {
                            // This socket is done for the search; the
                            // others keep listening.
                            log::debug!(
                                "[DISC] listener {} failed: {}",
                                event.socket_index,
                                e
                            );
                            listeners[event.socket_index] = None;
                            if listeners.iter().all(Option::is_none) {
                                break 'rounds;
                            }
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if matched {
                        // Drain window expired; the table is complete.
                        break 'rounds;
                    }
                    continue 'rounds;
                }
                Err(RecvTimeoutError::Disconnected) => break 'rounds,
            }
        }
    }

    // Unblock and join every still-running listener before returning.
    for listener in listeners.iter().flatten() {
        listener.cancel();
    }
    drop(listeners);

    if !matched {
        log::debug!("[DISC] no matching reply after {} rounds", ROUND_TIMEOUTS_MS.len());
        return Err(Error::NotFound);
    }

    if let Some(mut found) = chosen {
        found.responders = table.into_entries();
        return Ok(found);
    }

    let picked = table.select(config.policy(), local)?.clone();
    let is_local = local.contains_all(&picked.addresses);
    Ok(Discovered {
        addresses: picked.addresses,
        port: picked.port,
        local: is_local,
        responders: table.into_entries(),
    })
}

/// What to do with a decoded reply under the configured host specifier.
enum Verdict {
    /// Accept into the candidate table; the search continues.
    Store,
    /// Accept and stop the search (host-specific match).
    Take,
    /// Not the system we are looking for.
    Ignore,
}

fn judge(
    host: &HostSpec,
    local: &LocalAddrs,
    known: Option<&[String]>,
    reply: &crate::protocol::ProbeReply,
) -> Verdict {
    match host {
        HostSpec::Anywhere => Verdict::Store,
        HostSpec::RemoteOnly => {
            if local.intersects(&reply.addresses) {
                Verdict::Ignore
            } else {
                Verdict::Store
            }
        }
        HostSpec::LocalOnly => {
            if local.intersects(&reply.addresses) {
                Verdict::Take
            } else {
                Verdict::Ignore
            }
        }
        HostSpec::Name(_) => {
            let known = known.unwrap_or(&[]);
            if reply.addresses.iter().any(|a| known.contains(a)) {
                Verdict::Take
            } else {
                Verdict::Ignore
            }
        }
    }
}

fn build_send_targets(
    config: &SessionConfig,
    known: Option<&[String]>,
) -> Result<Vec<SendTarget>> {
    let port = config.udp_port();
    let mut targets = Vec::new();

    // Known host: one unicast probe per resolved address, on one socket.
    if let Some(known) = known {
        let socket = Arc::new(probe_socket(ProbeKind::Unicast)?);
        let mut dests = Vec::with_capacity(known.len());
        for addr in known {
            match addr.parse::<std::net::Ipv4Addr>() {
                Ok(ip) => dests.push(SocketAddr::new(ip.into(), port)),
                Err(_) => log::debug!("[DISC] skipping unparseable address {}", addr),
            }
        }
        if !dests.is_empty() {
            log::debug!("[DISC] unicast probe to {:?}", dests);
            targets.push(SendTarget { socket, dests });
        }
    }

    if config.method().uses_broadcast() {
        let addrs = config.broadcast_addrs_or_default();
        for addr in addrs {
            let socket = Arc::new(probe_socket(ProbeKind::Broadcast)?);
            log::debug!("[DISC] broadcasting to {}:{}", addr, port);
            targets.push(SendTarget {
                socket,
                dests: vec![SocketAddr::new(addr.into(), port)],
            });
        }
    }

    if config.method().uses_multicast() {
        for addr in config.multicast_addrs() {
            let socket = Arc::new(probe_socket(ProbeKind::Multicast { ttl: config.ttl() })?);
            log::debug!("[DISC] multicasting to {}:{} ttl {}", addr, port, config.ttl());
            targets.push(SendTarget {
                socket,
                dests: vec![SocketAddr::new((*addr).into(), port)],
            });
        }
    }

    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CAST_BROADCAST, MAGIC, VERSION};
    use crate::protocol::codec::{put_string, put_u32};
    use crate::protocol::probe::ProbeReply;
    use crate::protocol::CastType;

    fn reply(addresses: &[&str]) -> ProbeReply {
        ProbeReply {
            port: 11111,
            cast: CastType::Broadcast,
            replied_ip: "10.0.0.7".into(),
            uname: "node1".into(),
            canonical: "node1.lab.net".into(),
            addresses: addresses.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    fn local() -> LocalAddrs {
        LocalAddrs::from_addrs(vec!["127.0.0.1".into(), "10.0.0.5".into()])
    }

    #[test]
    fn anywhere_accepts_everything() {
        let v = judge(&HostSpec::Anywhere, &local(), None, &reply(&["192.168.1.1"]));
        assert!(matches!(v, Verdict::Store));
        let v = judge(&HostSpec::Anywhere, &local(), None, &reply(&[]));
        assert!(matches!(v, Verdict::Store));
    }

    #[test]
    fn remote_rejects_replies_with_local_addresses() {
        let host = HostSpec::RemoteOnly;
        let v = judge(&host, &local(), None, &reply(&["10.0.0.5", "192.168.1.1"]));
        assert!(matches!(v, Verdict::Ignore));
        let v = judge(&host, &local(), None, &reply(&["192.168.1.1"]));
        assert!(matches!(v, Verdict::Store));
    }

    #[test]
    fn local_accepts_only_resident_replies() {
        let host = HostSpec::LocalOnly;
        let v = judge(&host, &local(), None, &reply(&["10.0.0.5"]));
        assert!(matches!(v, Verdict::Take));
        let v = judge(&host, &local(), None, &reply(&["192.168.1.1"]));
        assert!(matches!(v, Verdict::Ignore));
    }

    #[test]
    fn literal_host_matches_against_resolved_set() {
        let host = HostSpec::Name("node1".into());
        let known = vec!["192.168.1.40".to_string()];
        let v = judge(&host, &local(), Some(&known), &reply(&["192.168.1.40"]));
        assert!(matches!(v, Verdict::Take));
        let v = judge(&host, &local(), Some(&known), &reply(&["192.168.1.41"]));
        assert!(matches!(v, Verdict::Ignore));
    }

    /// A minimal live round trip over loopback: a fake server answers a
    /// unicast probe and discovery reports it as the chosen system.
    #[test]
    fn unicast_search_finds_fake_server() {
        let server = UdpSocket::bind("127.0.0.1:0").expect("bind should succeed");
        let udp_port = server.local_addr().unwrap().port();

        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; 512];
            let (len, src) = server.recv_from(&mut buf).expect("probe expected");
            assert!(len > 16);

            let mut out = Vec::new();
            for magic in MAGIC {
                put_u32(&mut out, magic);
            }
            put_u32(&mut out, VERSION);
            put_u32(&mut out, 23456); // control port
            put_u32(&mut out, CAST_BROADCAST);
            put_string(&mut out, "127.0.0.1");
            put_string(&mut out, "localhost");
            put_string(&mut out, "localhost");
            put_u32(&mut out, 1);
            put_u32(&mut out, 0x7F00_0001);
            put_string(&mut out, "127.0.0.1");
            server.send_to(&out, src).expect("reply send should succeed");
        });

        let config = SessionConfig::new("ring0", HostSpec::Name("127.0.0.1".into()))
            .expect("config should build")
            .with_udp_port(udp_port)
            .expect("port should set");

        let local = LocalAddrs::from_addrs(vec!["127.0.0.1".into()]);
        let found = run(&config, &local).expect("discovery should succeed");

        assert_eq!(found.port, 23456);
        assert_eq!(found.addresses, vec!["127.0.0.1".to_string()]);
        assert!(found.local);
        handle.join().expect("fake server should finish");
    }
}
