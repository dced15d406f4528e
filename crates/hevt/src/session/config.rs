// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Session configuration: what to connect to and how.
//!
//! A `SessionConfig` is validated when built and on every mutation; an
//! instance that exists is internally consistent. Mutation goes through
//! validating setters that leave the config untouched on rejection.
//! `Clone` gives the defensive copy for the copy-and-mutate pattern.

use crate::config::{DEFAULT_PORT, DEFAULT_TTL, LIMITED_BROADCAST, MIN_PORT};
use crate::discovery::ResponsePolicy;
use crate::error::{Error, Result};
use std::net::Ipv4Addr;
use std::time::Duration;

/// Where the target system lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostSpec {
    /// Any responding host.
    Anywhere,
    /// Any responding host that is not this machine.
    RemoteOnly,
    /// This machine only.
    LocalOnly,
    /// A specific host name or dotted address.
    Name(String),
}

impl HostSpec {
    /// Parse the conventional spelling: `anywhere`, `remote`, `local` (or
    /// `localhost`); anything else is a literal host.
    pub fn parse(s: &str) -> Self {
        match s {
            "anywhere" => Self::Anywhere,
            "remote" => Self::RemoteOnly,
            "local" | "localhost" => Self::LocalOnly,
            other => Self::Name(other.to_string()),
        }
    }

    /// True for the wildcard specifiers that search rather than name a
    /// host.
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Anywhere | Self::RemoteOnly)
    }
}

impl std::fmt::Display for HostSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anywhere => write!(f, "anywhere"),
            Self::RemoteOnly => write!(f, "remote"),
            Self::LocalOnly => write!(f, "local"),
            Self::Name(h) => write!(f, "{}", h),
        }
    }
}

/// How the discovery search contacts the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContactMethod {
    /// UDP broadcast on the configured (or limited) broadcast addresses.
    #[default]
    Broadcast,
    /// UDP multicast on the configured group addresses.
    Multicast,
    /// Both broadcast and multicast concurrently.
    BroadAndMulticast,
    /// Skip discovery; connect straight to host and TCP port.
    Direct,
}

impl ContactMethod {
    pub fn uses_broadcast(self) -> bool {
        matches!(self, Self::Broadcast | Self::BroadAndMulticast)
    }

    pub fn uses_multicast(self) -> bool {
        matches!(self, Self::Multicast | Self::BroadAndMulticast)
    }
}

/// TCP socket tuning applied before the connector dials.
#[derive(Debug, Clone, Default)]
pub struct SocketTuning {
    /// Disable Nagle's algorithm.
    pub no_delay: bool,
    /// Send buffer size in bytes; 0 keeps the OS default.
    pub send_buf: usize,
    /// Receive buffer size in bytes; 0 keeps the OS default.
    pub recv_buf: usize,
    /// Outbound interface to bind before connecting.
    pub interface: Option<Ipv4Addr>,
}

/// Validated description of one connection attempt.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    name: String,
    host: HostSpec,
    broadcast_addrs: Vec<Ipv4Addr>,
    multicast_addrs: Vec<Ipv4Addr>,
    method: ContactMethod,
    udp_port: u16,
    tcp_port: u16,
    ttl: u8,
    policy: ResponsePolicy,
    wait_budget: Duration,
    remote_only: bool,
    tuning: SocketTuning,
}

impl SessionConfig {
    /// Build a config with defaults: broadcast contact, default ports,
    /// first-responder policy, zero wait budget, no tuning.
    pub fn new(name: impl Into<String>, host: HostSpec) -> Result<Self> {
        let config = Self {
            name: name.into(),
            host,
            broadcast_addrs: Vec::new(),
            multicast_addrs: Vec::new(),
            method: ContactMethod::default(),
            udp_port: DEFAULT_PORT,
            tcp_port: DEFAULT_PORT,
            ttl: DEFAULT_TTL,
            policy: ResponsePolicy::First,
            wait_budget: Duration::ZERO,
            remote_only: false,
            tuning: SocketTuning::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check every cross-field invariant.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Config("system name must not be empty".into()));
        }
        if self.method == ContactMethod::Direct && self.host.is_wildcard() {
            return Err(Error::Config(
                "direct connection needs an actual host, not a wildcard".into(),
            ));
        }
        if self.method.uses_multicast() && self.multicast_addrs.is_empty() {
            return Err(Error::Config(
                "multicast contact needs at least one multicast address".into(),
            ));
        }
        if let Some(addr) = self.multicast_addrs.iter().find(|a| !a.is_multicast()) {
            return Err(Error::Config(format!("{} is not a multicast address", addr)));
        }
        if self.policy == ResponsePolicy::PreferLocal && self.host == HostSpec::RemoteOnly {
            return Err(Error::Config(
                "prefer-local policy contradicts a remote-only host".into(),
            ));
        }
        if self.udp_port < MIN_PORT {
            return Err(Error::Config(format!(
                "UDP port {} below minimum {}",
                self.udp_port, MIN_PORT
            )));
        }
        if self.tcp_port < MIN_PORT {
            return Err(Error::Config(format!(
                "TCP port {} below minimum {}",
                self.tcp_port, MIN_PORT
            )));
        }
        if self.ttl > 254 {
            return Err(Error::Config(format!("TTL {} above maximum 254", self.ttl)));
        }
        Ok(())
    }

    /// Apply a mutation to a copy, validate it, and commit only on
    /// success.
    fn try_update(&mut self, mutate: impl FnOnce(&mut Self)) -> Result<()> {
        let mut candidate = self.clone();
        mutate(&mut candidate);
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }

    // ===== validating setters =====

    pub fn set_host(&mut self, host: HostSpec) -> Result<()> {
        self.try_update(|c| c.host = host)
    }

    pub fn set_method(&mut self, method: ContactMethod) -> Result<()> {
        self.try_update(|c| c.method = method)
    }

    pub fn set_policy(&mut self, policy: ResponsePolicy) -> Result<()> {
        self.try_update(|c| c.policy = policy)
    }

    pub fn set_broadcast_addrs(&mut self, addrs: Vec<Ipv4Addr>) -> Result<()> {
        self.try_update(|c| c.broadcast_addrs = addrs)
    }

    pub fn set_multicast_addrs(&mut self, addrs: Vec<Ipv4Addr>) -> Result<()> {
        self.try_update(|c| c.multicast_addrs = addrs)
    }

    pub fn set_udp_port(&mut self, port: u16) -> Result<()> {
        self.try_update(|c| c.udp_port = port)
    }

    pub fn set_tcp_port(&mut self, port: u16) -> Result<()> {
        self.try_update(|c| c.tcp_port = port)
    }

    pub fn set_ttl(&mut self, ttl: u8) -> Result<()> {
        self.try_update(|c| c.ttl = ttl)
    }

    pub fn set_wait_budget(&mut self, budget: Duration) {
        self.wait_budget = budget;
    }

    pub fn set_remote_only(&mut self, remote_only: bool) {
        self.remote_only = remote_only;
    }

    pub fn set_tuning(&mut self, tuning: SocketTuning) {
        self.tuning = tuning;
    }

    // ===== chaining variants =====

    pub fn with_method(mut self, method: ContactMethod) -> Result<Self> {
        self.set_method(method)?;
        Ok(self)
    }

    pub fn with_policy(mut self, policy: ResponsePolicy) -> Result<Self> {
        self.set_policy(policy)?;
        Ok(self)
    }

    pub fn with_udp_port(mut self, port: u16) -> Result<Self> {
        self.set_udp_port(port)?;
        Ok(self)
    }

    pub fn with_tcp_port(mut self, port: u16) -> Result<Self> {
        self.set_tcp_port(port)?;
        Ok(self)
    }

    pub fn with_broadcast_addrs(mut self, addrs: Vec<Ipv4Addr>) -> Result<Self> {
        self.set_broadcast_addrs(addrs)?;
        Ok(self)
    }

    pub fn with_multicast_addrs(mut self, addrs: Vec<Ipv4Addr>) -> Result<Self> {
        self.set_multicast_addrs(addrs)?;
        Ok(self)
    }

    pub fn with_wait_budget(mut self, budget: Duration) -> Self {
        self.set_wait_budget(budget);
        self
    }

    pub fn with_remote_only(mut self, remote_only: bool) -> Self {
        self.set_remote_only(remote_only);
        self
    }

    pub fn with_tuning(mut self, tuning: SocketTuning) -> Self {
        self.set_tuning(tuning);
        self
    }

    // ===== accessors =====

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> &HostSpec {
        &self.host
    }

    pub fn method(&self) -> ContactMethod {
        self.method
    }

    pub fn policy(&self) -> ResponsePolicy {
        self.policy
    }

    pub fn udp_port(&self) -> u16 {
        self.udp_port
    }

    pub fn tcp_port(&self) -> u16 {
        self.tcp_port
    }

    pub fn ttl(&self) -> u8 {
        self.ttl
    }

    pub fn wait_budget(&self) -> Duration {
        self.wait_budget
    }

    pub fn remote_only(&self) -> bool {
        self.remote_only
    }

    pub fn tuning(&self) -> &SocketTuning {
        &self.tuning
    }

    pub fn broadcast_addrs(&self) -> &[Ipv4Addr] {
        &self.broadcast_addrs
    }

    pub fn multicast_addrs(&self) -> &[Ipv4Addr] {
        &self.multicast_addrs
    }

    /// Configured broadcast addresses, or the limited broadcast address
    /// when none are set.
    pub fn broadcast_addrs_or_default(&self) -> Vec<Ipv4Addr> {
        if self.broadcast_addrs.is_empty() {
            vec![LIMITED_BROADCAST]
        } else {
            self.broadcast_addrs.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SessionConfig::new("ring0", HostSpec::Anywhere).expect("config should build");
        assert_eq!(config.udp_port(), DEFAULT_PORT);
        assert_eq!(config.policy(), ResponsePolicy::First);
        assert!(config.method().uses_broadcast());
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(matches!(
            SessionConfig::new("", HostSpec::Anywhere),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn direct_needs_a_concrete_host() {
        let config = SessionConfig::new("ring0", HostSpec::Anywhere).unwrap();
        assert!(config.with_method(ContactMethod::Direct).is_err());

        let config = SessionConfig::new("ring0", HostSpec::Name("node1".into())).unwrap();
        assert!(config.with_method(ContactMethod::Direct).is_ok());

        // The original accepts a local direct connection as well.
        let config = SessionConfig::new("ring0", HostSpec::LocalOnly).unwrap();
        assert!(config.with_method(ContactMethod::Direct).is_ok());
    }

    #[test]
    fn multicast_method_needs_addresses() {
        let config = SessionConfig::new("ring0", HostSpec::Anywhere).unwrap();
        assert!(config.clone().with_method(ContactMethod::Multicast).is_err());

        let config = config
            .with_multicast_addrs(vec![Ipv4Addr::new(239, 200, 0, 1)])
            .unwrap();
        assert!(config.with_method(ContactMethod::Multicast).is_ok());
    }

    #[test]
    fn non_multicast_group_address_is_rejected() {
        let config = SessionConfig::new("ring0", HostSpec::Anywhere).unwrap();
        assert!(config
            .with_multicast_addrs(vec![Ipv4Addr::new(10, 0, 0, 1)])
            .is_err());
    }

    #[test]
    fn prefer_local_conflicts_with_remote_only() {
        let config = SessionConfig::new("ring0", HostSpec::RemoteOnly).unwrap();
        assert!(config.with_policy(ResponsePolicy::PreferLocal).is_err());

        // And the other way round: switching host under a prefer-local
        // policy fails and leaves the config unchanged.
        let mut config = SessionConfig::new("ring0", HostSpec::Anywhere)
            .unwrap()
            .with_policy(ResponsePolicy::PreferLocal)
            .unwrap();
        assert!(config.set_host(HostSpec::RemoteOnly).is_err());
        assert_eq!(*config.host(), HostSpec::Anywhere);
    }

    #[test]
    fn privileged_ports_are_rejected() {
        let config = SessionConfig::new("ring0", HostSpec::Anywhere).unwrap();
        assert!(config.clone().with_udp_port(80).is_err());
        assert!(config.with_tcp_port(1023).is_err());
    }

    #[test]
    fn host_spec_parsing() {
        assert_eq!(HostSpec::parse("anywhere"), HostSpec::Anywhere);
        assert_eq!(HostSpec::parse("remote"), HostSpec::RemoteOnly);
        assert_eq!(HostSpec::parse("local"), HostSpec::LocalOnly);
        assert_eq!(HostSpec::parse("localhost"), HostSpec::LocalOnly);
        assert_eq!(
            HostSpec::parse("node1.lab.net"),
            HostSpec::Name("node1.lab.net".into())
        );
    }

    #[test]
    fn clone_is_a_deep_copy() {
        let config = SessionConfig::new("ring0", HostSpec::Anywhere)
            .unwrap()
            .with_broadcast_addrs(vec![Ipv4Addr::new(10, 0, 255, 255)])
            .unwrap();
        let mut copy = config.clone();
        copy.set_broadcast_addrs(Vec::new()).unwrap();
        assert_eq!(config.broadcast_addrs().len(), 1);
        assert!(copy.broadcast_addrs().is_empty());
    }
}
