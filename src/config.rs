use std::collections::BTreeSet;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use crate::error::{ElectionError, Result};

/// Port that node 0 listens on; node `i` listens on `DEFAULT_BASE_PORT + i`.
pub const DEFAULT_BASE_PORT: u16 = 1200;

/// Capped exponential backoff used while dialing peers at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffConfig {
    pub initial_ms: u64,
    pub max_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: 50,
            max_ms: 2000,
        }
    }
}

impl BackoffConfig {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(63)).unwrap_or(u64::MAX);
        let ms = self.initial_ms.saturating_mul(factor).min(self.max_ms);
        Duration::from_millis(ms)
    }
}

/// Fault injection: the elected leader terminates itself after a delay.
///
/// Disabled unless explicitly configured. Used to exercise re-election.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChaosConfig {
    pub kill_leader_after_ms: u64,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            kill_leader_after_ms: 6000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub node_id: u64,
    pub addr: String, // host:port format, supports both IP and hostnames
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_id: u64,
    /// Total number of nodes in the cluster, including this one.
    pub node_count: usize,
    pub listen_addr: SocketAddr,
    pub peers: Vec<PeerConfig>,
    pub election_timeout_min_ms: u64,
    pub election_timeout_max_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub rpc_timeout_ms: u64,
    pub connect_backoff: BackoffConfig,
    pub chaos: Option<ChaosConfig>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: 0,
            node_count: 1,
            listen_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_BASE_PORT)),
            peers: Vec::new(),
            election_timeout_min_ms: 150,
            election_timeout_max_ms: 300,
            heartbeat_interval_ms: 30,
            rpc_timeout_ms: 100,
            connect_backoff: BackoffConfig::default(),
            chaos: None,
        }
    }
}

impl NodeConfig {
    /// Builds the configuration for node `node_id` of a `node_count` cluster where
    /// every node listens on `host:(base_port + id)`.
    ///
    /// `host` may be an IPv4 or IPv6 literal (bracketed or not) or a hostname;
    /// the listen address is resolved here, peers are dialed by name.
    pub fn for_cluster(node_id: u64, node_count: usize, host: &str, base_port: u16) -> Result<Self> {
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let port_of = |id: u64| -> Result<u16> {
            u16::try_from(id)
                .ok()
                .and_then(|offset| base_port.checked_add(offset))
                .ok_or_else(|| {
                    ElectionError::InvalidConfig(format!(
                        "port for node {id} overflows base port {base_port}"
                    ))
                })
        };

        let listen_addr = resolve(host, port_of(node_id)?)?;

        let mut config = Self {
            node_id,
            node_count,
            listen_addr,
            ..Default::default()
        };
        for peer_id in (0..node_count as u64).filter(|&id| id != node_id) {
            config = config.with_peer(peer_id, join_host_port(host, port_of(peer_id)?));
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_peer(mut self, node_id: u64, addr: String) -> Self {
        self.peers.push(PeerConfig { node_id, addr });
        self
    }

    pub fn with_election_timeout(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.election_timeout_min_ms = min_ms;
        self.election_timeout_max_ms = max_ms;
        self
    }

    pub fn with_chaos(mut self, chaos: ChaosConfig) -> Self {
        self.chaos = Some(chaos);
        self
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    /// Rejects configurations the node cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.node_count == 0 {
            return Err(ElectionError::InvalidConfig(
                "node count must be at least 1".to_string(),
            ));
        }
        if self.node_id >= self.node_count as u64 {
            return Err(ElectionError::InvalidConfig(format!(
                "node id {} out of range for a {}-node cluster",
                self.node_id, self.node_count
            )));
        }
        if self.peers.len() + 1 != self.node_count {
            return Err(ElectionError::InvalidConfig(format!(
                "expected {} peers, got {}",
                self.node_count - 1,
                self.peers.len()
            )));
        }
        if let Some(peer) = self.peers.iter().find(|p| p.node_id == self.node_id) {
            return Err(ElectionError::InvalidConfig(format!(
                "peer list contains this node ({})",
                peer.node_id
            )));
        }
        let mut seen = BTreeSet::new();
        if let Some(peer) = self.peers.iter().find(|p| !seen.insert(p.node_id)) {
            return Err(ElectionError::InvalidConfig(format!(
                "peer {} listed more than once",
                peer.node_id
            )));
        }
        if self.election_timeout_min_ms == 0
            || self.election_timeout_min_ms > self.election_timeout_max_ms
        {
            return Err(ElectionError::InvalidConfig(format!(
                "invalid election timeout range {}..={} ms",
                self.election_timeout_min_ms, self.election_timeout_max_ms
            )));
        }
        if self.heartbeat_interval_ms == 0 || self.rpc_timeout_ms == 0 {
            return Err(ElectionError::InvalidConfig(
                "heartbeat interval and rpc timeout must be non-zero".to_string(),
            ));
        }
        if self.heartbeat_interval_ms >= self.election_timeout_min_ms {
            tracing::warn!(
                heartbeat_ms = self.heartbeat_interval_ms,
                election_min_ms = self.election_timeout_min_ms,
                "Heartbeat interval is not shorter than the election timeout; expect spurious elections"
            );
        }
        Ok(())
    }
}

/// `host:port`, bracketing IPv6 literals so the result is a valid URI authority.
fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| ElectionError::InvalidConfig(format!("cannot resolve {host}: {e}")))?
        .next()
        .ok_or_else(|| ElectionError::InvalidConfig(format!("{host} resolved to no address")))
}
