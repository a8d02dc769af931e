use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tonic::transport::{Channel, Endpoint};

use crate::config::BackoffConfig;
use crate::error::{ElectionError, Result};
use crate::proto::election_service_client::ElectionServiceClient;
use crate::proto::{
    AnnounceLeaderRequest, AnnounceLeaderResponse, HeartbeatRequest, HeartbeatResponse,
    VoteRequest, VoteResponse,
};
use crate::raft::transport::Transport;

const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// gRPC transport to one peer.
///
/// The underlying channel reconnects on its own after the initial dial, so a
/// peer that restarts is reachable again without rebuilding the handle.
#[derive(Clone)]
pub struct GrpcTransport {
    client: ElectionServiceClient<Channel>,
}

impl GrpcTransport {
    /// Dial a peer once.
    pub async fn connect(addr: &str) -> Result<Self> {
        let channel = Endpoint::from_shared(format!("http://{}", addr))?
            .connect_timeout(CONNECT_TIMEOUT)
            .connect()
            .await?;
        Ok(Self {
            client: ElectionServiceClient::new(channel),
        })
    }

    /// Dial a peer until it answers, backing off between attempts.
    pub async fn connect_with_retry(
        node_id: u64,
        peer_id: u64,
        addr: &str,
        backoff: &BackoffConfig,
        shutdown: &CancellationToken,
    ) -> Result<Self> {
        let mut attempt: u32 = 0;
        loop {
            match Self::connect(addr).await {
                Ok(transport) => {
                    tracing::info!(node_id, peer_id, addr, attempts = attempt + 1, "Connected to peer");
                    return Ok(transport);
                }
                Err(e) => {
                    let delay = backoff.delay(attempt);
                    tracing::warn!(
                        node_id,
                        peer_id,
                        addr,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Failed to connect to peer, will retry"
                    );
                    attempt = attempt.saturating_add(1);
                    tokio::select! {
                        _ = shutdown.cancelled() => return Err(ElectionError::Shutdown),
                        _ = sleep(delay) => {}
                    }
                }
            }
        }
    }
}

#[tonic::async_trait]
impl Transport for GrpcTransport {
    async fn request_vote(&self, req: VoteRequest) -> Result<VoteResponse> {
        let mut client = self.client.clone();
        Ok(client.request_vote(req).await?.into_inner())
    }

    async fn heartbeat(&self, req: HeartbeatRequest) -> Result<HeartbeatResponse> {
        let mut client = self.client.clone();
        Ok(client.heartbeat(req).await?.into_inner())
    }

    async fn announce_leader(&self, req: AnnounceLeaderRequest) -> Result<AnnounceLeaderResponse> {
        let mut client = self.client.clone();
        Ok(client.announce_leader(req).await?.into_inner())
    }
}
