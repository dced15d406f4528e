// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Responder candidates and the response policy.
//!
//! During an anywhere/remote search several servers may answer. Candidates
//! are kept in reply order, keyed by their advertised address list; the
//! configured [`ResponsePolicy`] picks exactly one once the search ends.

use crate::error::{Error, Result};
use crate::transport::LocalAddrs;

/// One discovered server: its advertised address list and control port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Responder {
    /// Dotted-decimal addresses, in the order the server advertised them.
    pub addresses: Vec<String>,
    /// TCP control port.
    pub port: u16,
}

impl Responder {
    pub fn new(addresses: Vec<String>, port: u16) -> Self {
        Self { addresses, port }
    }
}

/// What to do when more than one server answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponsePolicy {
    /// Use the earliest responder.
    First,
    /// Use the first co-resident responder, falling back to the earliest.
    PreferLocal,
    /// Fail, handing the caller the full candidate list.
    #[default]
    ErrorOnMultiple,
}

/// Reply-order-preserving candidate map keyed by address list.
#[derive(Debug, Default)]
pub struct ResponderTable {
    entries: Vec<Responder>,
}

impl ResponderTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a responder. A duplicate address-list key updates the port
    /// in place and keeps its original position.
    pub fn upsert(&mut self, addresses: Vec<String>, port: u16) {
        if let Some(existing) = self.entries.iter_mut().find(|r| r.addresses == addresses) {
            existing.port = port;
        } else {
            self.entries.push(Responder::new(addresses, port));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Responder] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Responder> {
        self.entries
    }

    /// Apply `policy` to pick one responder.
    ///
    /// With a single candidate no policy logic runs. `PreferLocal` looks
    /// for the first candidate whose whole address list belongs to this
    /// machine.
    pub fn select(&self, policy: ResponsePolicy, local: &LocalAddrs) -> Result<&Responder> {
        if self.entries.is_empty() {
            return Err(Error::NotFound);
        }
        if self.entries.len() == 1 {
            return Ok(&self.entries[0]);
        }

        match policy {
            ResponsePolicy::First => Ok(&self.entries[0]),
            ResponsePolicy::PreferLocal => Ok(self
                .entries
                .iter()
                .find(|r| local.contains_all(&r.addresses))
                .unwrap_or(&self.entries[0])),
            ResponsePolicy::ErrorOnMultiple => {
                Err(Error::TooManyResponders(self.entries.clone()))
            }
        }
    }
}
