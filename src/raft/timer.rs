use rand::Rng;
use tokio::time::{sleep_until, Duration};

use crate::raft::state::NodeState;

/// Generates a random election timeout within the configured range
pub fn random_election_timeout(min_ms: u64, max_ms: u64) -> Duration {
    let mut rng = rand::thread_rng();
    let timeout_ms = rng.gen_range(min_ms..=max_ms);
    Duration::from_millis(timeout_ms)
}

/// Resettable election deadline.
///
/// The deadline is `last_contact + timeout`. Every contact published by
/// [`NodeState`] pushes it forward; the waiting task sleeps until whichever
/// deadline is current and never polls.
#[derive(Debug, Clone)]
pub struct ElectionTimer {
    min_ms: u64,
    max_ms: u64,
}

impl ElectionTimer {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// Draw the timeout for the next follower period.
    pub fn next_timeout(&self) -> Duration {
        random_election_timeout(self.min_ms, self.max_ms)
    }

    /// Suspend until `timeout` has passed without any contact.
    pub async fn wait_for_silence(&self, state: &NodeState, timeout: Duration) {
        let mut contact_rx = state.subscribe_contact();
        loop {
            let deadline = *contact_rx.borrow_and_update() + timeout;
            tokio::select! {
                _ = sleep_until(deadline) => {
                    // A reset racing with the sleep is picked up on the next pass
                    if !contact_rx.has_changed().unwrap_or(false) {
                        return;
                    }
                }
                changed = contact_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }
}
