// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Budgeted TCP connector.
//!
//! Tries every candidate address with a short per-attempt timeout, sleeps
//! a short backoff, and repeats until the configured wait budget elapses.
//! Socket tuning (no-delay, keep-alive, buffer sizes, outbound interface)
//! is applied before the connect so it takes effect on the handshake
//! traffic as well.

use crate::config::{CONNECT_ATTEMPT_TIMEOUT_MS, CONNECT_RETRY_BACKOFF_MS};
use crate::error::{Error, Result};
use crate::session::SocketTuning;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{IpAddr, SocketAddr, TcpStream};
use std::time::{Duration, Instant};

/// Connect to `port` on the first reachable address in `addresses`.
///
/// Returns the stream and the address that accepted. Fails with
/// [`Error::ConnectTimeout`] wrapping the last dial error once the budget
/// is spent. The budget bounds the retry loop; a single in-flight attempt
/// may run up to one attempt timeout past it.
pub fn connect(
    addresses: &[String],
    port: u16,
    tuning: &SocketTuning,
    budget: Duration,
) -> Result<(TcpStream, String)> {
    connect_with(
        &|addr, port, timeout| dial(addr, port, timeout, tuning),
        addresses,
        port,
        budget,
    )
}

/// Deadline loop with an injectable dial function.
pub(crate) fn connect_with(
    dial: &dyn Fn(&str, u16, Duration) -> io::Result<TcpStream>,
    addresses: &[String],
    port: u16,
    budget: Duration,
) -> Result<(TcpStream, String)> {
    let deadline = Instant::now() + budget;
    let attempt_timeout = Duration::from_millis(CONNECT_ATTEMPT_TIMEOUT_MS);
    let mut last_err: Option<io::Error> = None;

    loop {
        for addr in addresses {
            match dial(addr, port, attempt_timeout) {
                Ok(stream) => {
                    log::debug!("[CONNECT] connected to {}:{}", addr, port);
                    return Ok((stream, addr.clone()));
                }
                Err(e) => {
                    log::debug!("[CONNECT] {}:{} failed: {}", addr, port, e);
                    last_err = Some(e);
                }
            }
        }

        if Instant::now() >= deadline {
            break;
        }
        std::thread::sleep(Duration::from_millis(CONNECT_RETRY_BACKOFF_MS));
    }

    Err(Error::ConnectTimeout(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::TimedOut, "no candidate addresses")
    })))
}

/// One connect attempt with tuning applied before the dial.
fn dial(addr: &str, port: u16, timeout: Duration, tuning: &SocketTuning) -> io::Result<TcpStream> {
    let ip: IpAddr = addr
        .parse()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("bad address {}", addr)))?;

    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    if tuning.no_delay {
        socket.set_nodelay(true)?;
    }
    // Keep-alive so a dead server is eventually noticed by the kernel.
    socket.set_keepalive(true)?;
    if tuning.send_buf > 0 {
        socket.set_send_buffer_size(tuning.send_buf)?;
    }
    if tuning.recv_buf > 0 {
        socket.set_recv_buffer_size(tuning.recv_buf)?;
    }
    // Outbound interface and ephemeral port must be picked before connect.
    if let Some(iface) = tuning.interface {
        let bind: SocketAddr = SocketAddr::new(IpAddr::V4(iface), 0);
        socket.bind(&bind.into())?;
    }

    let target = SocketAddr::new(ip, port);
    socket.connect_timeout(&target.into(), timeout)?;
    Ok(socket.into())
}
