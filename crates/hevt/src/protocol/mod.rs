// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Binary wire formats: discovery probe/reply and the TCP handshake.
//!
//! Everything on the wire is big-endian with length-prefixed,
//! NUL-terminated strings. Parsers validate every field; the callers map
//! parse failures to "silently ignore this datagram" (discovery) or a
//! fatal handshake error (session).

pub mod codec;
pub mod handshake;
pub mod probe;

pub use codec::ParseError;
pub use handshake::{HandshakeReply, Lang};
pub use probe::{CastType, ProbeReply};
