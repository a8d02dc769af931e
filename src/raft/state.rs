use tokio::sync::{watch, Mutex};
use tokio::time::{Duration, Instant};

/// Raft node role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaftRole {
    Follower,
    Candidate,
    Leader,
}

impl std::fmt::Display for RaftRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RaftRole::Follower => write!(f, "follower"),
            RaftRole::Candidate => write!(f, "candidate"),
            RaftRole::Leader => write!(f, "leader"),
        }
    }
}

/// Election state of one node.
///
/// # Invariants
///
/// ## Term monotonicity
/// `current_term` is only ever raised, never lowered: every setter compares
/// against the current value first.
///
/// ## Role-term consistency
/// A leader only stops being leader when a higher term is observed, and the
/// demotion happens in the same call that raises the term.
///
/// ## One vote per term
/// A vote is only granted together with a term bump, so `voted_for` is set at
/// most once per term. It is cleared whenever the term changes.
///
/// This struct has no synchronization of its own; [`NodeState`] wraps it in
/// the node's single lock.
#[derive(Debug)]
pub struct RaftState {
    pub current_term: u64,
    pub role: RaftRole,
    pub voted_for: Option<u64>,
    pub leader_id: Option<u64>,
    pub last_contact: Instant,
}

impl RaftState {
    pub fn new() -> Self {
        Self {
            current_term: 0,
            role: RaftRole::Follower,
            voted_for: None,
            leader_id: None,
            last_contact: Instant::now(),
        }
    }

    /// Adopt `term` if it is newer than ours, demoting a leader.
    ///
    /// Always refreshes `last_contact`. Returns true if the term was bumped.
    pub fn observe_term(&mut self, term: u64) -> bool {
        let bumped = self.adopt_term(term);
        self.note_contact();
        bumped
    }

    /// Raise the term without touching the election clock.
    pub(crate) fn adopt_term(&mut self, term: u64) -> bool {
        if term <= self.current_term {
            return false;
        }
        self.current_term = term;
        self.voted_for = None;
        self.leader_id = None;
        if self.role == RaftRole::Leader {
            self.role = RaftRole::Follower;
        }
        true
    }

    pub fn note_contact(&mut self) {
        self.last_contact = Instant::now();
    }

    /// Move to `role` only if the term is still `expected_term`.
    ///
    /// Becoming leader additionally requires the node to still be a candidate,
    /// so an announcement from another leader in the same term wins.
    pub fn transition_to(&mut self, role: RaftRole, expected_term: u64) -> bool {
        if self.current_term != expected_term {
            return false;
        }
        if role == RaftRole::Leader && self.role != RaftRole::Candidate {
            return false;
        }
        self.role = role;
        true
    }

    /// Start a candidacy if this follower has heard nothing for `timeout`.
    ///
    /// Returns the new term on success.
    pub fn try_begin_candidacy(&mut self, my_id: u64, timeout: Duration) -> Option<u64> {
        if self.role != RaftRole::Follower || self.last_contact.elapsed() < timeout {
            return None;
        }
        Some(self.become_candidate(my_id))
    }

    /// Transition to candidate state
    pub fn become_candidate(&mut self, my_id: u64) -> u64 {
        self.role = RaftRole::Candidate;
        self.current_term += 1;
        self.voted_for = Some(my_id); // Vote for self
        self.leader_id = None;
        self.current_term
    }

    /// Transition to leader state
    pub fn become_leader(&mut self, my_id: u64, term: u64) -> bool {
        if !self.transition_to(RaftRole::Leader, term) {
            return false;
        }
        self.leader_id = Some(my_id);
        self.note_contact();
        true
    }

    /// Give up a candidacy (lost or superseded) and restart the election clock.
    pub fn abandon_candidacy(&mut self) {
        if self.role == RaftRole::Candidate {
            self.role = RaftRole::Follower;
        }
        self.note_contact();
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            term: self.current_term,
            role: self.role,
            voted_for: self.voted_for,
            leader_id: self.leader_id,
        }
    }
}

impl Default for RaftState {
    fn default() -> Self {
        Self::new()
    }
}

/// Consistent copy of a node's election state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateSnapshot {
    pub term: u64,
    pub role: RaftRole,
    pub voted_for: Option<u64>,
    pub leader_id: Option<u64>,
}

/// The node's shared election state behind one exclusive lock.
///
/// Every read or write of `(term, role, last_contact)` goes through here.
/// Changes to `last_contact` are published on a watch channel so the election
/// timer can re-arm without polling.
pub struct NodeState {
    inner: Mutex<RaftState>,
    contact_tx: watch::Sender<Instant>,
}

impl NodeState {
    pub fn new() -> Self {
        let state = RaftState::new();
        let (contact_tx, _) = watch::channel(state.last_contact);
        Self {
            inner: Mutex::new(state),
            contact_tx,
        }
    }

    /// Run `f` inside the lock, then publish any election-clock reset.
    pub async fn apply<R>(&self, f: impl FnOnce(&mut RaftState) -> R) -> R {
        let mut state = self.inner.lock().await;
        let before = state.last_contact;
        let result = f(&mut *state);
        if state.last_contact != before {
            self.contact_tx.send_replace(state.last_contact);
        }
        result
    }

    pub async fn observe_term(&self, term: u64) -> bool {
        self.apply(|s| s.observe_term(term)).await
    }

    pub async fn note_contact(&self) {
        self.apply(RaftState::note_contact).await
    }

    pub async fn try_begin_candidacy(&self, my_id: u64, timeout: Duration) -> Option<u64> {
        self.apply(|s| s.try_begin_candidacy(my_id, timeout)).await
    }

    pub async fn become_leader(&self, my_id: u64, term: u64) -> bool {
        self.apply(|s| s.become_leader(my_id, term)).await
    }

    pub async fn abandon_candidacy(&self) {
        self.apply(RaftState::abandon_candidacy).await
    }

    pub async fn snapshot(&self) -> StateSnapshot {
        self.inner.lock().await.snapshot()
    }

    pub async fn current_term(&self) -> u64 {
        self.inner.lock().await.current_term
    }

    pub async fn role(&self) -> RaftRole {
        self.inner.lock().await.role
    }

    /// True while this node leads `term`.
    pub async fn is_leader_for(&self, term: u64) -> bool {
        let state = self.inner.lock().await;
        state.role == RaftRole::Leader && state.current_term == term
    }

    /// Receiver that yields the instant of every election-clock reset.
    pub fn subscribe_contact(&self) -> watch::Receiver<Instant> {
        self.contact_tx.subscribe()
    }
}

impl Default for NodeState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_follower() {
        let state = RaftState::new();
        assert_eq!(state.role, RaftRole::Follower);
        assert_eq!(state.current_term, 0);
        assert_eq!(state.voted_for, None);
        assert_eq!(state.leader_id, None);
    }

    #[test]
    fn test_become_candidate() {
        let mut state = RaftState::new();
        let term = state.become_candidate(1);

        assert_eq!(term, 1);
        assert_eq!(state.role, RaftRole::Candidate);
        assert_eq!(state.current_term, 1);
        assert_eq!(state.voted_for, Some(1));
        assert_eq!(state.leader_id, None);
    }

    #[test]
    fn test_become_leader() {
        let mut state = RaftState::new();
        let term = state.become_candidate(1);
        assert!(state.become_leader(1, term));

        assert_eq!(state.role, RaftRole::Leader);
        assert_eq!(state.leader_id, Some(1));
    }

    #[test]
    fn test_become_leader_rejected_after_term_change() {
        let mut state = RaftState::new();
        let term = state.become_candidate(1);
        state.observe_term(term + 1);

        assert!(!state.become_leader(1, term));
        assert_eq!(state.role, RaftRole::Candidate);
        assert_eq!(state.current_term, term + 1);
    }

    #[test]
    fn test_become_leader_requires_candidacy() {
        let mut state = RaftState::new();
        // Follower at the right term still cannot jump straight to leader
        assert!(!state.become_leader(1, 0));
        assert_eq!(state.role, RaftRole::Follower);
    }

    #[test]
    fn test_observe_higher_term_demotes_leader() {
        let mut state = RaftState::new();
        let term = state.become_candidate(1);
        state.become_leader(1, term);

        assert!(state.observe_term(5));
        assert_eq!(state.role, RaftRole::Follower);
        assert_eq!(state.current_term, 5);
        assert_eq!(state.voted_for, None);
        assert_eq!(state.leader_id, None);
    }

    #[test]
    fn test_observe_lower_or_equal_term_is_noop() {
        let mut state = RaftState::new();
        state.current_term = 5;
        state.role = RaftRole::Leader;

        assert!(!state.observe_term(3));
        assert!(!state.observe_term(5));
        assert_eq!(state.current_term, 5);
        assert_eq!(state.role, RaftRole::Leader);
    }

    #[test]
    fn test_observe_term_keeps_candidate_role() {
        let mut state = RaftState::new();
        state.become_candidate(1);

        assert!(state.observe_term(4));
        assert_eq!(state.role, RaftRole::Candidate);
    }

    #[test]
    fn test_transition_to_checks_expected_term() {
        let mut state = RaftState::new();
        state.current_term = 3;
        state.role = RaftRole::Candidate;

        assert!(!state.transition_to(RaftRole::Follower, 2));
        assert_eq!(state.role, RaftRole::Candidate);
        assert!(state.transition_to(RaftRole::Follower, 3));
        assert_eq!(state.role, RaftRole::Follower);
    }

    #[test]
    fn test_try_begin_candidacy_waits_for_silence() {
        let mut state = RaftState::new();
        assert_eq!(state.try_begin_candidacy(1, Duration::from_secs(60)), None);
        assert_eq!(state.role, RaftRole::Follower);

        assert_eq!(state.try_begin_candidacy(1, Duration::ZERO), Some(1));
        assert_eq!(state.role, RaftRole::Candidate);

        // Already a candidate
        assert_eq!(state.try_begin_candidacy(1, Duration::ZERO), None);
    }

    #[test]
    fn test_abandon_candidacy() {
        let mut state = RaftState::new();
        state.become_candidate(2);
        state.abandon_candidacy();
        assert_eq!(state.role, RaftRole::Follower);
        assert_eq!(state.current_term, 1);
    }

    #[test]
    fn test_term_never_decreases() {
        let mut state = RaftState::new();
        let mut last = state.current_term;
        for term in [3, 1, 7, 7, 2, 9, 0] {
            state.observe_term(term);
            assert!(state.current_term >= last);
            last = state.current_term;
        }
        assert_eq!(state.current_term, 9);
    }

    #[tokio::test]
    async fn test_node_state_publishes_contact() {
        let state = NodeState::new();
        let mut rx = state.subscribe_contact();
        let before = *rx.borrow_and_update();

        tokio::time::sleep(Duration::from_millis(5)).await;
        state.note_contact().await;

        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow_and_update() > before);
    }

    #[tokio::test]
    async fn test_node_state_skips_publish_without_contact() {
        let state = NodeState::new();
        let mut rx = state.subscribe_contact();
        rx.borrow_and_update();

        state.apply(|s| s.adopt_term(4)).await;

        assert!(!rx.has_changed().unwrap());
        assert_eq!(state.current_term().await, 4);
    }

    #[tokio::test]
    async fn test_node_state_snapshot_is_consistent() {
        let state = NodeState::new();
        let term = state.apply(|s| s.become_candidate(0)).await;
        assert!(state.become_leader(0, term).await);

        let snap = state.snapshot().await;
        assert_eq!(snap.term, 1);
        assert_eq!(snap.role, RaftRole::Leader);
        assert_eq!(snap.leader_id, Some(0));
        assert!(state.is_leader_for(1).await);
        assert!(!state.is_leader_for(2).await);
    }
}
