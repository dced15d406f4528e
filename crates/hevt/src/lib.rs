// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # HEVT - High-performance Event Transfer client
//!
//! Client-side connection establishment for a distributed, shared-buffer
//! event-transfer service: locate a named system instance on the network,
//! pick one responder, open and validate a TCP control channel, and map the
//! server's store directly when it lives on this machine.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hevt::{HostSpec, Result, Session, SessionConfig};
//!
//! fn main() -> Result<()> {
//!     let config = SessionConfig::new("/tmp/ring0", HostSpec::Anywhere)?;
//!     let session = Session::open(config)?;
//!
//!     let params = session.negotiated().expect("connected");
//!     println!("{} events of {} bytes", params.event_count, params.event_size);
//!
//!     session.disconnect();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                             Session                                |
//! |   Unconnected -> Connecting -> Connected -> Disconnected           |
//! +--------------------------------------------------------------------+
//! |                    Discovery            |      Connector           |
//! |   UDP probe rounds, reply filtering,    |  budgeted TCP dial,      |
//! |   response policy                       |  handshake validation    |
//! +--------------------------------------------------------------------+
//! |                          Transport                                 |
//! |   probe sockets | TCP tuning | local addresses | shared memory     |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`SessionConfig`] | Validated description of what to connect to and how |
//! | [`Session`] | One connection attempt and its negotiated parameters |
//! | [`Responder`] | A server that answered the discovery probe |
//! | [`Error`] | Everything a caller can branch on |
//!
//! ## Modules Overview
//!
//! - [`session`] - Session lifecycle and configuration (start here)
//! - [`discovery`] - UDP broadcast/multicast search and response policy
//! - [`protocol`] - Wire formats: probe, reply, handshake
//! - [`transport`] - Sockets, interfaces, shared-memory fast path
//! - [`config`] - Protocol constants and timing parameters

/// Protocol constants and timing parameters (single source).
pub mod config;
/// UDP discovery search and responder selection.
pub mod discovery;
/// Crate error types.
pub mod error;
/// Binary wire formats.
pub mod protocol;
/// Session lifecycle and configuration.
pub mod session;
/// Sockets, interfaces, and the shared-memory fast path.
pub mod transport;

pub use discovery::{Responder, ResponsePolicy};
pub use error::{Error, Result};
pub use protocol::Lang;
pub use session::{
    ContactMethod, HostSpec, Negotiated, Session, SessionConfig, SessionState, SocketTuning,
};
pub use transport::{FastPath, LocalAccessor};
