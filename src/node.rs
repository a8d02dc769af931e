use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::chaos::ChaosKill;
use crate::config::NodeConfig;
use crate::error::{ElectionError, Result};
use crate::grpc::GrpcServer;
use crate::raft::{PeerRegistry, RaftNode};

/// One cluster member: the election RPC server plus the election loop.
pub struct Node {
    pub config: NodeConfig,
    pub raft_node: Arc<RaftNode>,
    shutdown: CancellationToken,
}

impl Node {
    /// Validate `config` and wire up the node. Stops when `shutdown` fires.
    pub fn new(config: NodeConfig, shutdown: CancellationToken) -> Result<Self> {
        config.validate()?;

        let mut raft_node = RaftNode::new(config.clone());
        if let Some(chaos) = &config.chaos {
            raft_node = raft_node.with_hook(Arc::new(ChaosKill::from_config(chaos, shutdown.clone())));
        }

        Ok(Self {
            config,
            raft_node: Arc::new(raft_node),
            shutdown,
        })
    }

    /// Run the node until shutdown.
    ///
    /// 1. Binds the gRPC listener so peers can reach us
    /// 2. Dials every peer, retrying until all answer
    /// 3. Runs the election loop
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound, if shutdown fires
    /// before all peers are reachable, or if the server fails.
    pub async fn run(self) -> Result<()> {
        let server = GrpcServer::bind(self.config.listen_addr, self.raft_node.clone()).await?;
        let addr: SocketAddr = server.local_addr()?;
        tracing::info!(
            node_id = self.config.node_id,
            addr = %addr,
            cluster_size = self.config.node_count,
            "Node starting"
        );

        let server_shutdown = self.shutdown.clone();
        let server_task = tokio::spawn(server.run(server_shutdown));

        let peers = match PeerRegistry::connect(&self.config, &self.shutdown).await {
            Ok(peers) => peers,
            Err(ElectionError::Shutdown) => {
                tracing::info!(node_id = self.config.node_id, "Shutdown before all peers connected");
                return join_server(server_task).await;
            }
            Err(e) => {
                self.shutdown.cancel();
                let _ = join_server(server_task).await;
                return Err(e);
            }
        };

        self.raft_node.run(peers, self.shutdown.clone()).await;

        join_server(server_task).await?;
        tracing::info!(node_id = self.config.node_id, "Node stopped");
        Ok(())
    }
}

async fn join_server(task: tokio::task::JoinHandle<Result<()>>) -> Result<()> {
    task.await
        .map_err(|e| ElectionError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
}
