// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Session lifecycle: locate, connect, validate, expose.
//!
//! # State Machine
//!
//! ```text
//!      +-----------+
//!      |Unconnected|
//!      +-----+-----+
//!            | connect()
//!            v
//!      +-----------+--(discovery/connect/handshake failure)--+
//!      |Connecting |                                         |
//!      +-----+-----+                                         |
//!            | handshake accepted                            |
//!            v                                               v
//!      +-----------+        disconnect()              +------------+
//!      | Connected |------------------------------->  |Disconnected|
//!      +-----------+                                   +------------+
//! ```
//!
//! `Connecting` is reachable once; there is no reconnect-in-place.
//! `disconnect` is idempotent and safe to call from any state, including
//! concurrently with an in-flight `connect` (the attempt then lands in
//! `Disconnected` and releases its resources).

pub mod config;

pub use config::{ContactMethod, HostSpec, SessionConfig, SocketTuning};

use crate::config::{HANDSHAKE_TIMEOUT_MS, SELECT_INTS, STATUS_OK, VERSION};
use crate::discovery::{self, Responder};
use crate::error::{Error, Result};
use crate::protocol::handshake::{encode_request, read_reply, Lang};
use crate::transport::ifaces::{resolve_host, LocalAddrs};
use crate::transport::shm::{self, FastPath, SystemHeader};
use crate::transport::tcp;
use parking_lot::Mutex;
use std::io::Write;
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

// ============================================================================
// Session state
// ============================================================================

/// Lifecycle states of a [`Session`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    /// Built but never connected.
    #[default]
    Unconnected,
    /// Connect attempt in flight.
    Connecting,
    /// Handshake accepted; negotiated parameters available.
    Connected,
    /// Terminal: disconnected or failed.
    Disconnected,
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unconnected => "Unconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Disconnected => "Disconnected",
        };
        write!(f, "{}", s)
    }
}

/// Parameters reported by the server during the handshake.
#[derive(Debug, Clone, Copy)]
pub struct Negotiated {
    pub endian: u32,
    pub event_count: u32,
    pub event_size: u64,
    pub version: u32,
    pub select_ints: u32,
    pub language: Lang,
    pub word_width: u32,
}

#[derive(Default)]
struct Inner {
    state: SessionState,
    stream: Option<TcpStream>,
    fast_path: Option<FastPath>,
    negotiated: Option<Negotiated>,
    connected_addr: Option<String>,
    host_addresses: Vec<String>,
    tcp_port: u16,
    responders: Vec<Responder>,
}

/// A connection attempt to one event transfer system.
///
/// One `Session` per attempt: build it, `connect` it once, read the
/// negotiated parameters, `disconnect` when done.
pub struct Session {
    config: SessionConfig,
    local: LocalAddrs,
    inner: Mutex<Inner>,
}

impl Session {
    /// Build an unconnected session from a validated config.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            local: LocalAddrs::detect(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Build and connect in one step.
    pub fn open(config: SessionConfig) -> Result<Self> {
        let session = Self::new(config);
        session.connect()?;
        Ok(session)
    }

    /// Locate the system, connect, and validate compatibility.
    ///
    /// On any failure the session ends `Disconnected` with no socket or
    /// mapping held.
    pub fn connect(&self) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            if inner.state != SessionState::Unconnected {
                return Err(Error::InvalidState(format!(
                    "connect in state {}",
                    inner.state
                )));
            }
            inner.state = SessionState::Connecting;
        }

        match self.connect_inner() {
            Ok(()) => Ok(()),
            Err(e) => {
                let mut inner = self.inner.lock();
                inner.stream = None;
                inner.fast_path = None;
                inner.state = SessionState::Disconnected;
                Err(e)
            }
        }
    }

    fn connect_inner(&self) -> Result<()> {
        // Phase 1: find the server (or take it straight from the config).
        let (addresses, port, on_local_host, responders) =
            if self.config.method() == ContactMethod::Direct {
                self.direct_target()?
            } else {
                let found = discovery::run(&self.config, &self.local)?;
                log::debug!(
                    "[SESSION] discovered {:?} port {} local={}",
                    found.addresses,
                    found.port,
                    found.local
                );
                (found.addresses, found.port, found.local, found.responders)
            };

        // Phase 2: open the control stream under the wait budget.
        let (mut stream, connected_addr) = tcp::connect(
            &addresses,
            port,
            self.config.tuning(),
            self.config.wait_budget(),
        )?;

        // Phase 3: handshake. Incompatibility tears the stream down before
        // the error is surfaced.
        let negotiated = self.handshake(&mut stream)?;
        log::debug!(
            "[SESSION] handshake ok: {} events of {} bytes, version {}, peer {:?}",
            negotiated.event_count,
            negotiated.event_size,
            negotiated.version,
            negotiated.language
        );

        // Phase 4: optional local fast path; failure degrades silently to
        // socket-only access.
        let fast_path = if on_local_host && !self.config.remote_only() {
            match shm::attach(self.config.name()) {
                Ok(fast) => Some(fast),
                Err(e) => {
                    log::debug!("[SESSION] fast path unavailable, socket only: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let mut inner = self.inner.lock();
        if inner.state == SessionState::Disconnected {
            // Disconnected while we were connecting; honor it.
            let _ = stream.shutdown(Shutdown::Both);
            return Err(Error::InvalidState("disconnected during connect".into()));
        }
        inner.stream = Some(stream);
        inner.fast_path = fast_path;
        inner.negotiated = Some(negotiated);
        inner.connected_addr = Some(connected_addr);
        inner.host_addresses = addresses;
        inner.tcp_port = port;
        inner.responders = responders;
        inner.state = SessionState::Connected;
        Ok(())
    }

    /// Resolve the direct-connect target from the config.
    fn direct_target(&self) -> Result<(Vec<String>, u16, bool, Vec<Responder>)> {
        let (addresses, on_local_host) = match self.config.host() {
            HostSpec::LocalOnly => (self.local.as_slice().to_vec(), true),
            HostSpec::Name(host) => {
                let resolved = resolve_host(host)?;
                let is_local = self.local.contains_all(&resolved);
                if is_local {
                    // Connect through the local address list, as any of
                    // them reaches the co-resident server.
                    (self.local.as_slice().to_vec(), true)
                } else {
                    (resolved, false)
                }
            }
            // Unreachable for a validated config; direct mode rejects
            // wildcards at construction.
            other => {
                return Err(Error::Config(format!(
                    "direct connection to wildcard host {}",
                    other
                )))
            }
        };
        Ok((addresses, self.config.tcp_port(), on_local_host, Vec::new()))
    }

    fn handshake(&self, stream: &mut TcpStream) -> Result<Negotiated> {
        // Bounded reads so a dead server shows up as an error, not a hang.
        stream.set_read_timeout(Some(Duration::from_millis(HANDSHAKE_TIMEOUT_MS)))?;

        stream.write_all(&encode_request(self.config.name()))?;
        stream.flush()?;

        let reply = read_reply(stream)?;

        if reply.status != STATUS_OK {
            let _ = stream.shutdown(Shutdown::Both);
            return Err(Error::WrongSystem);
        }
        if reply.version != VERSION {
            let _ = stream.shutdown(Shutdown::Both);
            return Err(Error::IncompatibleVersion {
                ours: VERSION,
                theirs: reply.version,
            });
        }
        if reply.select_ints != SELECT_INTS {
            let _ = stream.shutdown(Shutdown::Both);
            return Err(Error::IncompatibleLayout {
                ours: SELECT_INTS,
                theirs: reply.select_ints,
            });
        }

        Ok(Negotiated {
            endian: reply.endian,
            event_count: reply.event_count,
            event_size: reply.event_size,
            version: reply.version,
            select_ints: reply.select_ints,
            language: reply.language,
            word_width: reply.word_width,
        })
    }

    /// Release the stream and any mapping. Idempotent; callable from any
    /// state.
    pub fn disconnect(&self) {
        let mut inner = self.inner.lock();
        if let Some(stream) = inner.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        inner.fast_path = None;
        inner.negotiated = None;
        inner.state = SessionState::Disconnected;
    }

    // ===== accessors =====

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Parameters negotiated during the handshake, while connected.
    pub fn negotiated(&self) -> Option<Negotiated> {
        self.inner.lock().negotiated
    }

    /// Address the control stream actually connected to.
    pub fn connected_addr(&self) -> Option<String> {
        self.inner.lock().connected_addr.clone()
    }

    /// Every address the chosen server advertised.
    pub fn host_addresses(&self) -> Vec<String> {
        self.inner.lock().host_addresses.clone()
    }

    /// TCP control port of the chosen server.
    pub fn tcp_port(&self) -> u16 {
        self.inner.lock().tcp_port
    }

    /// Every candidate accepted during discovery, in reply order.
    pub fn responders(&self) -> Vec<Responder> {
        self.inner.lock().responders.clone()
    }

    /// Whether the local shared-memory fast path is attached.
    pub fn has_shared_memory(&self) -> bool {
        self.inner.lock().fast_path.is_some()
    }

    /// Header of the mapped backing file, when the fast path is attached.
    pub fn shared_memory_header(&self) -> Option<SystemHeader> {
        self.inner.lock().fast_path.as_ref().map(|f| f.header)
    }

    /// Hand the fast-path handle (mapping + optional native accessor) to
    /// the caller. The session keeps running socket-side either way.
    pub fn take_fast_path(&self) -> Option<FastPath> {
        self.inner.lock().fast_path.take()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.disconnect();
    }
}
