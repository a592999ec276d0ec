//! Peer watchdog (§4.7): a 10s scan loop that tracks per-peer failure,
//! timeout, and malicious counters and escalates a peer into quarantine
//! after three failures, independent of the slower trust-score-crossing
//! path in [`crate::tracker::ReputationTracker`].

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use mesh_core::NodeId;
use mesh_network::PeerTable;
use tracing::{info, warn};

use crate::tracker::ReputationTracker;

pub const SCAN_INTERVAL: Duration = Duration::from_secs(10);
pub const FAILURES_BEFORE_QUARANTINE: u32 = 3;

#[derive(Debug, Default, Clone, Copy)]
struct FailureCounters {
    failures: u32,
    timeouts: u32,
    malicious: u32,
}

/// Tracks escalating failure counters per peer and quarantines on the
/// reputation tracker once a peer crosses [`FAILURES_BEFORE_QUARANTINE`].
pub struct Watchdog {
    reputation: Arc<ReputationTracker>,
    peers: Arc<PeerTable>,
    counters: DashMap<NodeId, FailureCounters>,
}

impl Watchdog {
    pub fn new(reputation: Arc<ReputationTracker>, peers: Arc<PeerTable>) -> Self {
        Self {
            reputation,
            peers,
            counters: DashMap::new(),
        }
    }

    pub fn record_failure(&self, peer: &NodeId) {
        let mut entry = self.counters.entry(peer.clone()).or_default();
        entry.failures += 1;
        self.maybe_escalate(peer, entry.failures + entry.timeouts + entry.malicious);
    }

    pub fn record_timeout(&self, peer: &NodeId) {
        let mut entry = self.counters.entry(peer.clone()).or_default();
        entry.timeouts += 1;
        self.maybe_escalate(peer, entry.failures + entry.timeouts + entry.malicious);
    }

    pub fn record_malicious(&self, peer: &NodeId) {
        let mut entry = self.counters.entry(peer.clone()).or_default();
        entry.malicious += 1;
        warn!(peer, "malicious behavior observed");
        self.reputation.quarantine(peer);
    }

    fn maybe_escalate(&self, peer: &NodeId, total: u32) {
        if total >= FAILURES_BEFORE_QUARANTINE && !self.reputation.is_quarantined(peer) {
            self.reputation.quarantine(peer);
        }
    }

    pub fn reset(&self, peer: &NodeId) {
        self.counters.remove(peer);
    }

    /// One scan tick: any peer whose trust has fallen below the quarantine
    /// threshold but isn't yet marked is quarantined here too, covering
    /// peers whose trust crossed the line between jobs rather than through
    /// a counted failure.
    fn scan_once(&self) {
        for peer_id in self.peers.iter().map(|e| e.key().clone()) {
            if self.reputation.is_quarantined(&peer_id) {
                continue;
            }
            if self.reputation.peer_trust(&peer_id) < crate::tracker::QUARANTINE_THRESHOLD {
                self.reputation.quarantine(&peer_id);
            }
        }
    }

    pub fn spawn_scan_loop(self: &Arc<Self>) {
        let watchdog = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SCAN_INTERVAL);
            loop {
                interval.tick().await;
                watchdog.scan_once();
                info!(quarantined = watchdog.reputation.quarantined_peers().len(), "watchdog scan tick");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_watchdog() -> Watchdog {
        let reputation = Arc::new(ReputationTracker::new(None).unwrap());
        let peers: Arc<PeerTable> = Arc::new(DashMap::new());
        Watchdog::new(reputation, peers)
    }

    #[test]
    fn three_failures_escalate_to_quarantine() {
        let watchdog = new_watchdog();
        let peer = "peer-x".to_string();
        watchdog.record_failure(&peer);
        watchdog.record_failure(&peer);
        assert!(!watchdog.reputation.is_quarantined(&peer));
        watchdog.record_failure(&peer);
        assert!(watchdog.reputation.is_quarantined(&peer));
    }

    #[test]
    fn single_malicious_report_quarantines_immediately() {
        let watchdog = new_watchdog();
        let peer = "peer-y".to_string();
        watchdog.record_malicious(&peer);
        assert!(watchdog.reputation.is_quarantined(&peer));
    }

    #[test]
    fn mixed_failure_and_timeout_counts_combine() {
        let watchdog = new_watchdog();
        let peer = "peer-z".to_string();
        watchdog.record_failure(&peer);
        watchdog.record_timeout(&peer);
        assert!(!watchdog.reputation.is_quarantined(&peer));
        watchdog.record_timeout(&peer);
        assert!(watchdog.reputation.is_quarantined(&peer));
    }
}
