// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Handshake wire format over the TCP control stream.
//!
//! Request:
//!
//! ```text
//! u32 magic[3] | u32 endian | u32 nameLen | u32 wordWidth | u64 reserved=0
//! | byte[nameLen] name (NUL-terminated)
//! ```
//!
//! Reply:
//!
//! ```text
//! u32 status | u32 endian | u32 eventCount | u64 eventSize | u32 version
//! | u32 selectInts | u32 language | u32 wordWidth | u32 reserved
//! ```
//!
//! This module only moves bytes; compatibility checks live in the session
//! layer so the stream can be torn down there on a mismatch.

use super::codec::{put_u32, put_u64};
use crate::config::{local_word_width, ENDIAN_BIG, MAGIC};
use std::io::{self, Read};

/// Peer implementation language, as reported in the handshake reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lang {
    C,
    Java,
    Cpp,
    Rust,
    /// Unrecognized tag, kept verbatim.
    Other(u32),
}

impl Lang {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::C,
            2 => Self::Java,
            3 => Self::Cpp,
            4 => Self::Rust,
            other => Self::Other(other),
        }
    }
}

/// Decoded handshake reply, unvalidated.
#[derive(Debug, Clone, Copy)]
pub struct HandshakeReply {
    pub status: u32,
    pub endian: u32,
    pub event_count: u32,
    pub event_size: u64,
    pub version: u32,
    pub select_ints: u32,
    pub language: Lang,
    pub word_width: u32,
}

/// Encode the handshake request for `name`. Integers are written
/// big-endian; this client always reports [`ENDIAN_BIG`].
pub fn encode_request(name: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 * 6 + 8 + name.len() + 1);
    for magic in MAGIC {
        put_u32(&mut buf, magic);
    }
    put_u32(&mut buf, ENDIAN_BIG);
    put_u32(&mut buf, name.len() as u32 + 1);
    put_u32(&mut buf, local_word_width());
    put_u64(&mut buf, 0); // reserved
    buf.extend_from_slice(name.as_bytes());
    buf.push(0);
    buf
}

/// Read and decode the fixed-size handshake reply from the stream.
pub fn read_reply<R: Read>(stream: &mut R) -> io::Result<HandshakeReply> {
    let status = read_u32(stream)?;
    let endian = read_u32(stream)?;
    let event_count = read_u32(stream)?;
    let event_size = read_u64(stream)?;
    let version = read_u32(stream)?;
    let select_ints = read_u32(stream)?;
    let language = Lang::from_raw(read_u32(stream)?);
    let word_width = read_u32(stream)?;
    let _reserved = read_u32(stream)?;

    Ok(HandshakeReply {
        status,
        endian,
        event_count,
        event_size,
        version,
        select_ints,
        language,
        word_width,
    })
}

fn read_u32<R: Read>(stream: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

fn read_u64<R: Read>(stream: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    stream.read_exact(&mut buf)?;
    Ok(u64::from_be_bytes(buf))
}
