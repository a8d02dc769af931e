use std::sync::Arc;

use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::proto::{AnnounceLeaderRequest, HeartbeatRequest};
use crate::raft::peers::PeerRegistry;
use crate::raft::state::NodeState;

/// Tell every peer that `my_id` won `term`. Best effort: fire and forget,
/// no retry.
pub fn announce_leadership(my_id: u64, term: u64, peers: &PeerRegistry) {
    for peer in peers.handles() {
        let peer = peer.clone();
        tokio::spawn(async move {
            let req = AnnounceLeaderRequest {
                term,
                leader_id: my_id,
            };
            if let Err(e) = peer.announce_leader(req).await {
                tracing::debug!(
                    node_id = my_id,
                    peer_id = peer.peer_id(),
                    error = %e,
                    "AnnounceLeader failed"
                );
            }
        });
    }
}

/// Send one round of heartbeats to all peers concurrently.
///
/// Replies carrying a newer term demote this node through [`NodeState`].
pub fn broadcast_heartbeats(my_id: u64, term: u64, peers: &PeerRegistry, state: &Arc<NodeState>) {
    for peer in peers.handles() {
        let peer = peer.clone();
        let state = state.clone();
        tokio::spawn(async move {
            let req = HeartbeatRequest {
                term,
                leader_id: my_id,
            };
            match peer.heartbeat(req).await {
                Ok(resp) if resp.term > term => {
                    tracing::info!(
                        node_id = my_id,
                        peer_id = peer.peer_id(),
                        term,
                        peer_term = resp.term,
                        "Peer reported newer term"
                    );
                    state.observe_term(resp.term).await;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::trace!(node_id = my_id, peer_id = peer.peer_id(), error = %e, "Heartbeat failed");
                }
            }
        });
    }
}

/// Leader phase: heartbeat every `heartbeat_interval` for as long as this
/// node leads `term`. Returns once it has been demoted.
pub async fn run_leader(
    my_id: u64,
    term: u64,
    peers: &PeerRegistry,
    state: &Arc<NodeState>,
    heartbeat_interval: Duration,
) {
    let mut ticker = interval(heartbeat_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if !state.is_leader_for(term).await {
            let current = state.snapshot().await;
            tracing::info!(
                node_id = my_id,
                term,
                current_term = current.term,
                role = %current.role,
                "No longer leader"
            );
            return;
        }
        tracing::trace!(node_id = my_id, term, peers = peers.len(), "Broadcasting heartbeats");
        broadcast_heartbeats(my_id, term, peers, state);
        state.note_contact().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;
    use crate::error::Result;
    use crate::proto::{
        AnnounceLeaderResponse, HeartbeatResponse, VoteRequest, VoteResponse,
    };
    use crate::raft::state::RaftRole;
    use crate::raft::transport::Transport;

    /// Counts heartbeats and answers with a fixed term.
    struct Counting {
        beats: Arc<AtomicU64>,
        reply_term: u64,
    }

    #[tonic::async_trait]
    impl Transport for Counting {
        async fn request_vote(&self, req: VoteRequest) -> Result<VoteResponse> {
            Ok(VoteResponse {
                term: req.term,
                vote_granted: false,
            })
        }

        async fn heartbeat(&self, req: HeartbeatRequest) -> Result<HeartbeatResponse> {
            self.beats.fetch_add(1, Ordering::SeqCst);
            Ok(HeartbeatResponse {
                term: self.reply_term.max(req.term),
            })
        }

        async fn announce_leader(&self, req: AnnounceLeaderRequest) -> Result<AnnounceLeaderResponse> {
            Ok(AnnounceLeaderResponse { term: req.term })
        }
    }

    async fn leader_state() -> (Arc<NodeState>, u64) {
        let state = Arc::new(NodeState::new());
        let term = state.apply(|s| s.become_candidate(0)).await;
        assert!(state.become_leader(0, term).await);
        (state, term)
    }

    fn counting_peers(reply_term: u64) -> (PeerRegistry, Arc<AtomicU64>) {
        let beats = Arc::new(AtomicU64::new(0));
        let transport: Arc<dyn Transport> = Arc::new(Counting {
            beats: beats.clone(),
            reply_term,
        });
        let peers = PeerRegistry::from_transports([(1, transport)], Duration::from_millis(50));
        (peers, beats)
    }

    #[tokio::test(start_paused = true)]
    async fn leader_heartbeats_until_demoted() {
        let (state, term) = leader_state().await;
        let (peers, beats) = counting_peers(0);

        let demoter = state.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            demoter.observe_term(term + 1).await;
        });

        run_leader(0, term, &peers, &state, Duration::from_millis(30)).await;

        assert!(beats.load(Ordering::SeqCst) >= 3);
        let snap = state.snapshot().await;
        assert_eq!(snap.role, RaftRole::Follower);
        assert_eq!(snap.term, term + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn newer_term_in_heartbeat_reply_ends_leadership() {
        let (state, term) = leader_state().await;
        let (peers, _beats) = counting_peers(9);

        run_leader(0, term, &peers, &state, Duration::from_millis(30)).await;

        let snap = state.snapshot().await;
        assert_eq!(snap.role, RaftRole::Follower);
        assert_eq!(snap.term, 9);
    }
}
