use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

use crate::config::ChaosConfig;
use crate::raft::node::LeadershipHook;

/// Simulated leader crash: once elected, the node stops itself after `delay`.
///
/// Stopping means cancelling the node's shutdown token, which ends the
/// election loop and the RPC server together. Peers then see silence and
/// elect a replacement.
#[derive(Debug, Clone)]
pub struct ChaosKill {
    delay: Duration,
    shutdown: CancellationToken,
}

impl ChaosKill {
    pub fn new(delay: Duration, shutdown: CancellationToken) -> Self {
        Self { delay, shutdown }
    }

    pub fn from_config(config: &ChaosConfig, shutdown: CancellationToken) -> Self {
        Self::new(Duration::from_millis(config.kill_leader_after_ms), shutdown)
    }
}

impl LeadershipHook for ChaosKill {
    fn on_elected(&self, node_id: u64, term: u64) {
        let delay = self.delay;
        let shutdown = self.shutdown.clone();
        tracing::warn!(
            node_id,
            term,
            delay_ms = delay.as_millis() as u64,
            "Chaos enabled, leader will crash"
        );
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = sleep(delay) => {
                    tracing::warn!(node_id, term, "Simulated crash");
                    shutdown.cancel();
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn cancels_after_delay() {
        let token = CancellationToken::new();
        let hook = ChaosKill::new(Duration::from_millis(500), token.clone());

        hook.on_elected(0, 1);
        sleep(Duration::from_millis(499)).await;
        assert!(!token.is_cancelled());

        sleep(Duration::from_millis(2)).await;
        assert!(token.is_cancelled());
    }

    #[test]
    fn from_config_uses_configured_delay() {
        let hook = ChaosKill::from_config(&ChaosConfig::default(), CancellationToken::new());
        assert_eq!(hook.delay, Duration::from_millis(6000));
    }
}
