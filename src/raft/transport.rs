use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::time::{timeout, Duration};

use crate::error::{ElectionError, Result};
use crate::proto::{
    AnnounceLeaderRequest, AnnounceLeaderResponse, HeartbeatRequest, HeartbeatResponse,
    VoteRequest, VoteResponse,
};
use crate::raft::RaftNode;

/// Point-to-point RPC channel to a single peer.
///
/// Implementations do not need to enforce timeouts; [`PeerHandle`] bounds
/// every call.
#[tonic::async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn request_vote(&self, req: VoteRequest) -> Result<VoteResponse>;

    async fn heartbeat(&self, req: HeartbeatRequest) -> Result<HeartbeatResponse>;

    async fn announce_leader(&self, req: AnnounceLeaderRequest) -> Result<AnnounceLeaderResponse>;
}

/// Invocation handle for one peer, with the per-call timeout applied.
#[derive(Clone)]
pub struct PeerHandle {
    peer_id: u64,
    transport: Arc<dyn Transport>,
    rpc_timeout: Duration,
}

impl PeerHandle {
    pub fn new(peer_id: u64, transport: Arc<dyn Transport>, rpc_timeout: Duration) -> Self {
        Self {
            peer_id,
            transport,
            rpc_timeout,
        }
    }

    pub fn peer_id(&self) -> u64 {
        self.peer_id
    }

    pub async fn request_vote(&self, req: VoteRequest) -> Result<VoteResponse> {
        self.bounded(self.transport.request_vote(req)).await
    }

    pub async fn heartbeat(&self, req: HeartbeatRequest) -> Result<HeartbeatResponse> {
        self.bounded(self.transport.heartbeat(req)).await
    }

    pub async fn announce_leader(&self, req: AnnounceLeaderRequest) -> Result<AnnounceLeaderResponse> {
        self.bounded(self.transport.announce_leader(req)).await
    }

    async fn bounded<T>(&self, call: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        match timeout(self.rpc_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ElectionError::Timeout {
                peer_id: self.peer_id,
                after: self.rpc_timeout,
            }),
        }
    }
}

impl std::fmt::Debug for PeerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerHandle")
            .field("peer_id", &self.peer_id)
            .field("rpc_timeout", &self.rpc_timeout)
            .finish()
    }
}

/// In-process transport that invokes a peer node's handlers directly.
///
/// The link can be cut and restored to simulate partitions and crashes.
pub struct LocalTransport {
    target: Arc<RaftNode>,
    connected: Arc<AtomicBool>,
}

impl LocalTransport {
    pub fn new(target: Arc<RaftNode>) -> Self {
        Self {
            target,
            connected: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Shared switch controlling this link.
    pub fn link(&self) -> Arc<AtomicBool> {
        self.connected.clone()
    }

    fn check_link(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ElectionError::Unreachable(self.target.id))
        }
    }
}

#[tonic::async_trait]
impl Transport for LocalTransport {
    async fn request_vote(&self, req: VoteRequest) -> Result<VoteResponse> {
        self.check_link()?;
        Ok(self.target.handle_vote_request(req).await)
    }

    async fn heartbeat(&self, req: HeartbeatRequest) -> Result<HeartbeatResponse> {
        self.check_link()?;
        Ok(self.target.handle_heartbeat(req).await)
    }

    async fn announce_leader(&self, req: AnnounceLeaderRequest) -> Result<AnnounceLeaderResponse> {
        self.check_link()?;
        Ok(self.target.handle_announce_leader(req).await)
    }
}
