// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Probe socket construction for the discovery search.
//!
//! One datagram socket per send target, bound to an ephemeral port and
//! used both to send the probe and to receive the reply addressed back at
//! that port.

use crate::config::LISTEN_SLICE_MS;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;

/// What a probe socket will be used to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    /// Unicast probe straight at a known host.
    Unicast,
    /// Subnet or limited broadcast.
    Broadcast,
    /// Multicast with the given time-to-live.
    Multicast { ttl: u8 },
}

/// Create a send+receive datagram socket for one probe target.
///
/// The socket is bound to 0.0.0.0 on an ephemeral port; replies come back
/// unicast to that port. A read timeout is set so listener threads can
/// observe their shutdown flag between slices.
pub fn probe_socket(kind: ProbeKind) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;

    match kind {
        ProbeKind::Unicast => {}
        ProbeKind::Broadcast => {
            socket.set_broadcast(true)?;
        }
        ProbeKind::Multicast { ttl } => {
            // TTL 1 is the OS default; only override when asked for more.
            if ttl != 1 {
                socket.set_multicast_ttl_v4(u32::from(ttl))?;
            }
        }
    }

    let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0));
    socket.bind(&bind_addr.into())?;

    let socket: UdpSocket = socket.into();
    socket.set_read_timeout(Some(Duration::from_millis(LISTEN_SLICE_MS)))?;

    log::debug!(
        "[DISC] probe socket {:?} bound to {}",
        kind,
        socket.local_addr()?
    );
    Ok(socket)
}
