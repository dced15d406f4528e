// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery probe datagram and reply wire format.
//!
//! Probe (client -> server):
//!
//! ```text
//! u32 magic[3] | u32 version | u32 nameLen | byte[nameLen] name (NUL-terminated)
//! ```
//!
//! Reply (server -> client):
//!
//! ```text
//! u32 magic[3] | u32 version | u32 port | u32 castType
//! | u32 len | ip (dotted-decimal of the interface that replied)
//! | u32 len | uname | u32 len | canonical name
//! | u32 addrCount | repeat { u32 rawAddr | u32 len | dotted-decimal }
//! ```
//!
//! All integers big-endian; string lengths include the NUL terminator.
//! Any deviation makes the whole datagram a non-match.

use super::codec::{put_string, put_u32, ByteReader, ParseError};
use crate::config::{
    CAST_BOTH, CAST_BROADCAST, CAST_MULTICAST, IP_ADDR_STR_LEN, MAGIC, MAX_HOST_NAME_LEN, VERSION,
};

/// What kind of probe the server answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastType {
    Broadcast,
    Multicast,
    Both,
}

impl CastType {
    fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            CAST_BROADCAST => Some(Self::Broadcast),
            CAST_MULTICAST => Some(Self::Multicast),
            CAST_BOTH => Some(Self::Both),
            _ => None,
        }
    }
}

/// A decoded, field-validated discovery reply. Matching against the host
/// specifier happens in the discovery coordinator, not here.
#[derive(Debug, Clone)]
pub struct ProbeReply {
    /// TCP control port of the responding server.
    pub port: u16,
    /// Which probe variant the server answered.
    pub cast: CastType,
    /// Dotted-decimal address of the interface that saw the probe.
    pub replied_ip: String,
    /// Reporting host's local name.
    pub uname: String,
    /// Reporting host's canonical name.
    pub canonical: String,
    /// All dotted-decimal addresses the host answers on, advertised order.
    pub addresses: Vec<String>,
}

/// Build the outbound probe for `name`.
pub fn encode_probe(name: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 * 5 + name.len() + 1);
    for magic in MAGIC {
        put_u32(&mut buf, magic);
    }
    put_u32(&mut buf, VERSION);
    put_string(&mut buf, name);
    buf
}

/// Decode a reply datagram. Every field is validated; callers treat any
/// error as "not ours, keep listening".
pub fn decode_reply(buf: &[u8]) -> Result<ProbeReply, ParseError> {
    let mut r = ByteReader::new(buf);

    for expected in MAGIC {
        if r.read_u32()? != expected {
            return Err(ParseError::InvalidFormat);
        }
    }
    if r.read_u32()? != VERSION {
        return Err(ParseError::InvalidFormat);
    }

    let port = r.read_u32()?;
    if port == 0 || port > u32::from(u16::MAX) {
        return Err(ParseError::InvalidFormat);
    }

    let cast = CastType::from_raw(r.read_u32()?).ok_or(ParseError::InvalidFormat)?;

    let replied_ip = r.read_string(IP_ADDR_STR_LEN)?;
    let uname = r.read_string(MAX_HOST_NAME_LEN)?;
    let canonical = r.read_string(MAX_HOST_NAME_LEN)?;

    let addr_count = r.read_u32()? as usize;
    let mut addresses = Vec::with_capacity(addr_count.min(32));
    for _ in 0..addr_count {
        let _raw = r.read_u32()?; // numeric form, unused
        addresses.push(r.read_string(IP_ADDR_STR_LEN)?);
    }

    Ok(ProbeReply {
        port: port as u16,
        cast,
        replied_ip,
        uname,
        canonical,
        addresses,
    })
}
