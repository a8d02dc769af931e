use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::NodeConfig;
use crate::error::{ElectionError, Result};
use crate::grpc::GrpcTransport;
use crate::raft::transport::{PeerHandle, Transport};

/// One handle per peer, keyed by node id. Built once, then only read.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: BTreeMap<u64, PeerHandle>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_transports(
        transports: impl IntoIterator<Item = (u64, Arc<dyn Transport>)>,
        rpc_timeout: Duration,
    ) -> Self {
        let peers = transports
            .into_iter()
            .map(|(id, transport)| (id, PeerHandle::new(id, transport, rpc_timeout)))
            .collect();
        Self { peers }
    }

    /// Dial every configured peer over gRPC, retrying each with capped
    /// exponential backoff until it answers.
    ///
    /// Only returns once every peer is connected, or with
    /// [`ElectionError::Shutdown`] if `shutdown` fires first.
    pub async fn connect(config: &NodeConfig, shutdown: &CancellationToken) -> Result<Self> {
        let mut dials = JoinSet::new();
        for peer in &config.peers {
            let peer = peer.clone();
            let backoff = config.connect_backoff.clone();
            let shutdown = shutdown.clone();
            let node_id = config.node_id;
            dials.spawn(async move {
                let transport = GrpcTransport::connect_with_retry(
                    node_id,
                    peer.node_id,
                    &peer.addr,
                    &backoff,
                    &shutdown,
                )
                .await?;
                Ok::<_, ElectionError>((peer.node_id, transport))
            });
        }

        let mut transports: Vec<(u64, Arc<dyn Transport>)> = Vec::with_capacity(config.peers.len());
        while let Some(joined) = dials.join_next().await {
            let (peer_id, transport) = joined.map_err(|e| {
                ElectionError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
            })??;
            transports.push((peer_id, Arc::new(transport)));
        }

        tracing::info!(
            node_id = config.node_id,
            peers = transports.len(),
            "Connected to all peers"
        );
        Ok(Self::from_transports(transports, config.rpc_timeout()))
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn handles(&self) -> impl Iterator<Item = &PeerHandle> {
        self.peers.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackoffConfig;

    #[tokio::test]
    async fn connect_with_no_peers_is_immediate() {
        let config = NodeConfig::default();
        let peers = PeerRegistry::connect(&config, &CancellationToken::new())
            .await
            .unwrap();
        assert!(peers.is_empty());
    }

    #[tokio::test]
    async fn connect_aborts_on_shutdown() {
        // Nothing listens on this port, so the dial keeps retrying
        let mut config = NodeConfig::for_cluster(0, 2, "127.0.0.1", 59310).unwrap();
        config.connect_backoff = BackoffConfig {
            initial_ms: 10,
            max_ms: 20,
        };
        let shutdown = CancellationToken::new();

        let canceller = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let result = PeerRegistry::connect(&config, &shutdown).await;
        assert!(matches!(result, Err(ElectionError::Shutdown)));
    }
}
