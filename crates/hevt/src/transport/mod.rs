// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Socket construction and host-level plumbing.
//!
//! - [`udp`] builds the probe sockets the discovery search sends and
//!   listens on.
//! - [`tcp`] dials the server under the configured wait budget with
//!   tuning applied before connect.
//! - [`ifaces`] knows this machine's addresses and resolves host names.
//! - [`shm`] maps a co-resident server's backing file (the local fast
//!   path).

pub mod ifaces;
pub mod shm;
pub mod tcp;
pub mod udp;

pub use ifaces::LocalAddrs;
pub use shm::{FastPath, LocalAccessor, SharedRegion, SystemHeader};
