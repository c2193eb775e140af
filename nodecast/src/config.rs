//! Plain, programmatically-constructed configuration for a Node or a
//! Broker. Loading these from a file or CLI flags belongs to an embedding
//! launcher, not to this crate.

use nodecast_core::control::Ports;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Where a Broker's sockets are bound, and how long it runs before a
/// synthesized kill.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Loopback/LAN address this broker binds its sockets on.
    pub bind_addr: IpAddr,
    /// Backend/frontend/sync/kill ports.
    pub ports: Ports,
    /// Number of local nodes the sync barrier waits for.
    pub expected_nodes: usize,
    /// Optional upstream broker to chain to (`host:backend_port` of its
    /// frontend).
    pub upstream: Option<std::net::SocketAddr>,
    /// Optional wall-clock deadline; on expiry during Running, synthesizes
    /// a Kill.
    pub deadline: Option<Duration>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            ports: Ports::default(),
            expected_nodes: 0,
            upstream: None,
            deadline: None,
        }
    }
}

/// Per-Node configuration: how to reach the broker and how to identify
/// itself during sync.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Broker address (backend/frontend/sync/kill all live on this host).
    pub broker_addr: IpAddr,
    pub ports: Ports,
    /// This node's sync-barrier identity. For a Producer (and a
    /// Pipeline's output side), every topic the node ever publishes on
    /// must equal this tag or start with `"<tag>."` -- the Broker's Join
    /// state matches a backend's `END` topic back to this tag to decide
    /// who to send `BYE` to and when the sync barrier is fully drained.
    pub tag: String,
}

impl NodeConfig {
    #[must_use]
    pub fn new(broker_addr: IpAddr, tag: impl Into<String>) -> Self {
        Self {
            broker_addr,
            ports: Ports::default(),
            tag: tag.into(),
        }
    }
}
