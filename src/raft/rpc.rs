use crate::proto::{
    AnnounceLeaderRequest, AnnounceLeaderResponse, HeartbeatRequest, HeartbeatResponse,
    VoteRequest, VoteResponse,
};
use crate::raft::state::{RaftRole, RaftState};

/// Handle RequestVote RPC
///
/// A vote is granted only for a term newer than ours. Granting adopts that
/// term, so at most one vote is handed out per term.
pub fn handle_request_vote(state: &mut RaftState, req: &VoteRequest, my_id: u64) -> VoteResponse {
    let vote_granted = if req.term > state.current_term {
        state.adopt_term(req.term);
        state.voted_for = Some(req.candidate_id);
        state.note_contact();
        true
    } else {
        // Stale or same-term request: term, role and election clock stay as they are
        false
    };

    tracing::debug!(
        node_id = my_id,
        candidate = req.candidate_id,
        term = req.term,
        current_term = state.current_term,
        granted = vote_granted,
        "RequestVote response"
    );

    VoteResponse {
        term: state.current_term,
        vote_granted,
    }
}

/// Handle Heartbeat RPC
///
/// Pure liveness signal: it resets the election clock whatever its term.
pub fn handle_heartbeat(state: &mut RaftState, req: &HeartbeatRequest, my_id: u64) -> HeartbeatResponse {
    if state.observe_term(req.term) {
        tracing::info!(
            node_id = my_id,
            leader = req.leader_id,
            term = req.term,
            "Adopted newer term from heartbeat"
        );
    }
    if req.term == state.current_term && req.leader_id != my_id {
        state.leader_id = Some(req.leader_id);
    }

    HeartbeatResponse {
        term: state.current_term,
    }
}

/// Handle AnnounceLeader RPC
pub fn handle_announce_leader(
    state: &mut RaftState,
    req: &AnnounceLeaderRequest,
    my_id: u64,
) -> AnnounceLeaderResponse {
    if req.term >= state.current_term {
        state.adopt_term(req.term);
        if state.role != RaftRole::Follower {
            tracing::info!(
                node_id = my_id,
                from = %state.role,
                leader = req.leader_id,
                term = req.term,
                "Stepping down for announced leader"
            );
        }
        state.role = RaftRole::Follower;
        state.leader_id = Some(req.leader_id);
        state.note_contact();
    } else {
        tracing::debug!(
            node_id = my_id,
            leader = req.leader_id,
            term = req.term,
            current_term = state.current_term,
            "Ignoring stale leader announcement"
        );
    }

    AnnounceLeaderResponse {
        term: state.current_term,
    }
}
