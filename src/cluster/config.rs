use std::num::NonZeroUsize;
use std::time::Duration;

use super::message::NodeId;

/// Runtime view of cluster membership and delivery policy.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub node_id: NodeId,
    /// Base URLs (or loopback names) of every other member.
    pub peers: Vec<String>,
    pub dedupe_window: NonZeroUsize,
    /// Total tries per peer, first one included. Never zero.
    pub delivery_attempts: u32,
    pub retry_backoff: Duration,
    pub timeout: Duration,
}

impl ClusterConfig {
    pub fn standalone(node_id: impl Into<String>) -> Self {
        Self {
            node_id: NodeId::new(node_id),
            peers: Vec::new(),
            dedupe_window: NonZeroUsize::new(1024).unwrap_or(NonZeroUsize::MIN),
            delivery_attempts: 3,
            retry_backoff: Duration::from_millis(200),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_peers(mut self, peers: Vec<String>) -> Self {
        self.peers = peers;
        self
    }

    /// Backoff before retry number `attempt` (1-based), growing linearly.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.retry_backoff.saturating_mul(attempt)
    }
}

impl From<&crate::config::ClusterSettings> for ClusterConfig {
    fn from(settings: &crate::config::ClusterSettings) -> Self {
        Self {
            node_id: NodeId::new(settings.node_id.clone()),
            peers: settings.peers.clone(),
            dedupe_window: settings.dedupe_window,
            delivery_attempts: settings.delivery_attempts.get(),
            retry_backoff: settings.retry_backoff,
            timeout: settings.timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_with_attempt() {
        let config = ClusterConfig::standalone("a");
        assert_eq!(config.backoff_for(1), Duration::from_millis(200));
        assert_eq!(config.backoff_for(3), Duration::from_millis(600));
    }
}
