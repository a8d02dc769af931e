use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::NodeConfig;
use crate::proto::{
    AnnounceLeaderRequest, AnnounceLeaderResponse, HeartbeatRequest, HeartbeatResponse,
    VoteRequest, VoteResponse,
};
use crate::raft::election::{run_candidacy, ElectionOutcome};
use crate::raft::leader::{announce_leadership, run_leader};
use crate::raft::peers::PeerRegistry;
use crate::raft::rpc::{handle_announce_leader, handle_heartbeat, handle_request_vote};
use crate::raft::state::{NodeState, RaftRole, StateSnapshot};
use crate::raft::timer::ElectionTimer;

/// Callback fired when this node wins an election.
///
/// Runs inline on the election loop, so implementations should hand off any
/// slow work to a task.
pub trait LeadershipHook: Send + Sync + 'static {
    fn on_elected(&self, node_id: u64, term: u64);
}

/// Hook that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHook;

impl LeadershipHook for NoopHook {
    fn on_elected(&self, _node_id: u64, _term: u64) {}
}

/// A node taking part in leader election
pub struct RaftNode {
    pub id: u64,
    pub state: Arc<NodeState>,
    config: NodeConfig,
    timer: ElectionTimer,
    hook: Arc<dyn LeadershipHook>,
}

impl RaftNode {
    pub fn new(config: NodeConfig) -> Self {
        let timer = ElectionTimer::new(
            config.election_timeout_min_ms,
            config.election_timeout_max_ms,
        );
        Self {
            id: config.node_id,
            state: Arc::new(NodeState::new()),
            config,
            timer,
            hook: Arc::new(NoopHook),
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn LeadershipHook>) -> Self {
        self.hook = hook;
        self
    }

    /// Number of nodes in the cluster, self included.
    pub fn cluster_size(&self) -> usize {
        self.config.node_count
    }

    pub async fn is_leader(&self) -> bool {
        self.state.role().await == RaftRole::Leader
    }

    pub async fn status(&self) -> StateSnapshot {
        self.state.snapshot().await
    }

    /// Run the election loop until `shutdown` fires.
    ///
    /// Followers wait out a randomized timeout and stand for election;
    /// leaders heartbeat until a higher term demotes them.
    pub async fn run(&self, peers: PeerRegistry, shutdown: CancellationToken) {
        tracing::info!(
            node_id = self.id,
            cluster_size = self.cluster_size(),
            peers = peers.len(),
            "Election loop started"
        );

        loop {
            let snapshot = self.state.snapshot().await;
            // Candidacy never outlives `campaign`, so only two phases exist here
            let phase = async {
                if snapshot.role == RaftRole::Leader {
                    run_leader(
                        self.id,
                        snapshot.term,
                        &peers,
                        &self.state,
                        self.config.heartbeat_interval(),
                    )
                    .await;
                } else {
                    let term = self.await_election_timeout().await;
                    self.campaign(term, &peers).await;
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = phase => {}
            }
        }

        tracing::info!(node_id = self.id, "Election loop stopped");
    }

    /// Wait as a follower until the election clock runs out, then become a
    /// candidate. Returns the new term.
    async fn await_election_timeout(&self) -> u64 {
        loop {
            let timeout = self.timer.next_timeout();
            self.timer.wait_for_silence(&self.state, timeout).await;
            if let Some(term) = self.state.try_begin_candidacy(self.id, timeout).await {
                tracing::info!(
                    node_id = self.id,
                    term,
                    timeout_ms = timeout.as_millis() as u64,
                    "Election timeout, becoming candidate"
                );
                return term;
            }
            // Contact slipped in between waking and taking the lock
        }
    }

    async fn campaign(&self, term: u64, peers: &PeerRegistry) {
        let outcome = run_candidacy(self.id, term, self.cluster_size(), peers, &self.state).await;
        if let ElectionOutcome::Won { term, .. } = outcome {
            announce_leadership(self.id, term, peers);
            self.hook.on_elected(self.id, term);
        }
    }

    pub async fn handle_vote_request(&self, req: VoteRequest) -> VoteResponse {
        let my_id = self.id;
        self.state
            .apply(|s| handle_request_vote(s, &req, my_id))
            .await
    }

    pub async fn handle_heartbeat(&self, req: HeartbeatRequest) -> HeartbeatResponse {
        let my_id = self.id;
        self.state.apply(|s| handle_heartbeat(s, &req, my_id)).await
    }

    pub async fn handle_announce_leader(&self, req: AnnounceLeaderRequest) -> AnnounceLeaderResponse {
        let my_id = self.id;
        self.state
            .apply(|s| handle_announce_leader(s, &req, my_id))
            .await
    }

    pub async fn leader_id(&self) -> Option<u64> {
        self.state.snapshot().await.leader_id
    }
}
