use std::sync::Arc;
use tonic::{Request, Response, Status};

use crate::proto::election_service_server::ElectionService;
use crate::proto::{
    AnnounceLeaderRequest, AnnounceLeaderResponse, HeartbeatRequest, HeartbeatResponse,
    VoteRequest, VoteResponse,
};
use crate::raft::RaftNode;

/// gRPC service for node-to-node election traffic
pub struct ElectionServiceImpl {
    raft_node: Arc<RaftNode>,
}

impl ElectionServiceImpl {
    pub fn new(raft_node: Arc<RaftNode>) -> Self {
        Self { raft_node }
    }
}

#[tonic::async_trait]
impl ElectionService for ElectionServiceImpl {
    async fn request_vote(
        &self,
        request: Request<VoteRequest>,
    ) -> Result<Response<VoteResponse>, Status> {
        let req = request.into_inner();
        tracing::debug!(
            candidate = req.candidate_id,
            term = req.term,
            "Received RequestVote"
        );

        let response = self.raft_node.handle_vote_request(req).await;
        Ok(Response::new(response))
    }

    async fn heartbeat(
        &self,
        request: Request<HeartbeatRequest>,
    ) -> Result<Response<HeartbeatResponse>, Status> {
        let req = request.into_inner();
        tracing::trace!(leader = req.leader_id, term = req.term, "Received Heartbeat");

        let response = self.raft_node.handle_heartbeat(req).await;
        Ok(Response::new(response))
    }

    async fn announce_leader(
        &self,
        request: Request<AnnounceLeaderRequest>,
    ) -> Result<Response<AnnounceLeaderResponse>, Status> {
        let req = request.into_inner();
        tracing::debug!(leader = req.leader_id, term = req.term, "Received AnnounceLeader");

        let response = self.raft_node.handle_announce_leader(req).await;
        Ok(Response::new(response))
    }
}
