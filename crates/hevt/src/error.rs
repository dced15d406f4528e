// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Crate error types.
//!
//! One public enum covers every outcome a caller can branch on; transient
//! discovery noise (malformed datagrams, momentary socket errors) is
//! swallowed inside the discovery layer and never surfaces here.

use crate::discovery::Responder;
use std::io;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by connection establishment.
#[derive(Debug)]
pub enum Error {
    /// Invalid or contradictory configuration. Fatal: fix the settings and
    /// rebuild the config.
    Config(String),

    /// Discovery exhausted all rounds without a matching reply. Retryable.
    NotFound,

    /// More than one system responded under the error-on-multiple policy.
    /// Carries the full candidate list in reply order. Retryable with a
    /// different policy.
    TooManyResponders(Vec<Responder>),

    /// The connect wait budget elapsed without reaching the server. Wraps
    /// the last dial error. Retryable.
    ConnectTimeout(io::Error),

    /// The server did not recognize the requested system name.
    WrongSystem,

    /// The server runs a different protocol version. Fatal for this
    /// attempt; the connection has already been torn down.
    IncompatibleVersion { ours: u32, theirs: u32 },

    /// The server uses a different select-integer count. Fatal for this
    /// attempt; the connection has already been torn down.
    IncompatibleLayout { ours: u32, theirs: u32 },

    /// Operation attempted in the wrong session state (e.g. connect after
    /// disconnect).
    InvalidState(String),

    /// I/O error talking to an already-selected server.
    Io(io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(s) => write!(f, "configuration error: {}", s),
            Self::NotFound => write!(f, "no event transfer system responded"),
            Self::TooManyResponders(r) => {
                write!(f, "{} systems responded, policy allows one", r.len())
            }
            Self::ConnectTimeout(e) => write!(f, "connect wait budget exhausted: {}", e),
            Self::WrongSystem => write!(f, "server did not recognize the system name"),
            Self::IncompatibleVersion { ours, theirs } => {
                write!(f, "protocol version mismatch: ours {}, peer {}", ours, theirs)
            }
            Self::IncompatibleLayout { ours, theirs } => {
                write!(
                    f,
                    "select-integer count mismatch: ours {}, peer {}",
                    ours, theirs
                )
            }
            Self::InvalidState(s) => write!(f, "invalid session state: {}", s),
            Self::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConnectTimeout(e) | Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_counts() {
        let err = Error::IncompatibleVersion { ours: 1, theirs: 2 };
        assert!(err.to_string().contains("ours 1"));
        assert!(err.to_string().contains("peer 2"));

        let err = Error::TooManyResponders(vec![
            Responder::new(vec!["10.0.0.1".into()], 11111),
            Responder::new(vec!["10.0.0.2".into()], 11111),
        ]);
        assert!(err.to_string().contains("2 systems"));
    }

    #[test]
    fn io_errors_keep_their_source() {
        let err = Error::from(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
