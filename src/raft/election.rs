use tokio::task::JoinSet;

use crate::proto::VoteRequest;
use crate::raft::peers::PeerRegistry;
use crate::raft::state::{NodeState, RaftRole};

/// Votes (self included) needed to win in a cluster of `cluster_size` nodes.
pub fn quorum(cluster_size: usize) -> usize {
    cluster_size / 2 + 1
}

/// Votes collected during one candidacy. Counts the implicit self-vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteTally {
    cluster_size: usize,
    granted: usize,
    denied: usize,
    failed: usize,
}

impl VoteTally {
    pub fn new(cluster_size: usize) -> Self {
        Self {
            cluster_size,
            granted: 1,
            denied: 0,
            failed: 0,
        }
    }

    pub fn grant(&mut self) {
        self.granted += 1;
    }

    pub fn deny(&mut self) {
        self.denied += 1;
    }

    /// A call that errored or timed out; counted as a denial.
    pub fn fail(&mut self) {
        self.failed += 1;
    }

    pub fn granted(&self) -> usize {
        self.granted
    }

    pub fn denied(&self) -> usize {
        self.denied + self.failed
    }

    /// Strict majority of the whole cluster, not of the replies received.
    pub fn has_majority(&self) -> bool {
        self.granted >= quorum(self.cluster_size)
    }
}

/// How a candidacy ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionOutcome {
    /// Majority reached and the node is now leader for `term`.
    Won { term: u64, votes: usize },
    /// No majority; the node is a follower again.
    Lost { term: u64, votes: usize },
    /// The term moved on (or another leader was announced) while votes were
    /// being collected; the node gave up without becoming leader.
    Superseded { term: u64, current_term: u64 },
}

/// Run the candidate phase for `term`, which the caller has already entered.
///
/// Vote requests go to every peer concurrently; each call is bounded by the
/// peer handle's timeout and a failed call counts as a denial. The final
/// decision is taken in a single critical section so a term bump racing with
/// the tally can never produce a leader for a stale term.
pub async fn run_candidacy(
    my_id: u64,
    term: u64,
    cluster_size: usize,
    peers: &PeerRegistry,
    state: &NodeState,
) -> ElectionOutcome {
    tracing::info!(node_id = my_id, term, "Starting election");

    let req = VoteRequest {
        term,
        candidate_id: my_id,
    };

    let mut requests = JoinSet::new();
    for peer in peers.handles() {
        let peer = peer.clone();
        let req = req.clone();
        requests.spawn(async move { (peer.peer_id(), peer.request_vote(req).await) });
    }

    let mut tally = VoteTally::new(cluster_size);
    while let Some(joined) = requests.join_next().await {
        let Ok((peer_id, result)) = joined else {
            tally.fail();
            continue;
        };
        match result {
            Ok(resp) => {
                if resp.term > term {
                    state.observe_term(resp.term).await;
                }
                if resp.vote_granted {
                    tally.grant();
                    tracing::debug!(
                        node_id = my_id,
                        peer_id,
                        votes = tally.granted(),
                        "Received vote"
                    );
                } else {
                    tally.deny();
                }
            }
            Err(e) => {
                tally.fail();
                tracing::warn!(node_id = my_id, peer_id, error = %e, "Vote request failed");
            }
        }
    }

    let outcome = state
        .apply(|s| {
            if s.current_term != term || s.role != RaftRole::Candidate {
                let current_term = s.current_term;
                s.abandon_candidacy();
                ElectionOutcome::Superseded { term, current_term }
            } else if tally.has_majority() && s.become_leader(my_id, term) {
                ElectionOutcome::Won {
                    term,
                    votes: tally.granted(),
                }
            } else {
                s.abandon_candidacy();
                ElectionOutcome::Lost {
                    term,
                    votes: tally.granted(),
                }
            }
        })
        .await;

    match outcome {
        ElectionOutcome::Won { votes, .. } => {
            tracing::info!(node_id = my_id, term, votes, "Received vote majority, became leader");
        }
        ElectionOutcome::Lost { votes, .. } => {
            tracing::info!(
                node_id = my_id,
                term,
                votes,
                denied = tally.denied(),
                needed = quorum(cluster_size),
                "Election failed, not enough votes"
            );
        }
        ElectionOutcome::Superseded { current_term, .. } => {
            tracing::info!(
                node_id = my_id,
                term,
                current_term,
                "Term changed during election, abandoning candidacy"
            );
        }
    }

    outcome
}
