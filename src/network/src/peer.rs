//! The peer table: every node this node currently considers connected, with
//! the health/RTT bookkeeping the health-check loop maintains (§4.1).

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use mesh_core::NodeId;

/// How many peers have been connected since the last replay/rate-limit
/// violation is tracked elsewhere (rate_limiter); this table just holds
/// connectivity and health state.
pub struct Peer {
    pub node_id: NodeId,
    pub node_name: String,
    pub ip: String,
    pub port: u16,
    pub public_key_hex: String,
    pub last_seen: Instant,
    /// Rolling RTT history, most recent last, capped at 100 samples.
    rtt_history: VecDeque<Duration>,
}

const MAX_RTT_SAMPLES: usize = 100;
/// §4.1 cleanup loop: peers silent longer than this are evicted.
pub const PEER_STALE_AFTER: Duration = Duration::from_secs(30);

impl Peer {
    pub fn new(node_id: NodeId, node_name: String, ip: String, port: u16, public_key_hex: String) -> Self {
        Self {
            node_id,
            node_name,
            ip,
            port,
            public_key_hex,
            last_seen: Instant::now(),
            rtt_history: VecDeque::with_capacity(MAX_RTT_SAMPLES),
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn is_healthy(&self) -> bool {
        self.last_seen.elapsed() < PEER_STALE_AFTER
    }

    pub fn record_rtt(&mut self, rtt: Duration) {
        if self.rtt_history.len() >= MAX_RTT_SAMPLES {
            self.rtt_history.pop_front();
        }
        self.rtt_history.push_back(rtt);
    }

    /// P99 of the rolling RTT window; `None` if no samples yet.
    pub fn rtt_p99(&self) -> Option<Duration> {
        if self.rtt_history.is_empty() {
            return None;
        }
        let mut samples: Vec<Duration> = self.rtt_history.iter().copied().collect();
        samples.sort();
        let idx = ((samples.len() as f64) * 0.99).ceil() as usize;
        let idx = idx.saturating_sub(1).min(samples.len() - 1);
        Some(samples[idx])
    }
}

/// Concurrent map of known peers, keyed by node id. Shared via `Arc` across
/// every subsystem that needs to observe connectivity (coordinator election,
/// auction, health loop) — never cloned into a separate owning copy.
pub type PeerTable = DashMap<NodeId, Peer>;

/// Node ids whose `last_seen` is within the health window, plus `self_id`.
/// This is the `H` set from §4.2 step 1; callers are expected to cache it
/// for ~5s per the election algorithm's own caching rule.
pub fn healthy_node_ids(peers: &PeerTable, self_id: &NodeId) -> Vec<NodeId> {
    let mut ids: Vec<NodeId> = peers
        .iter()
        .filter(|entry| entry.value().is_healthy())
        .map(|entry| entry.key().clone())
        .collect();
    if !ids.contains(self_id) {
        ids.push(self_id.clone());
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p99_of_empty_history_is_none() {
        let peer = Peer::new("n1".into(), "node-1".into(), "127.0.0.1".into(), 9000, "pk".into());
        assert_eq!(peer.rtt_p99(), None);
    }

    #[test]
    fn p99_picks_high_end_of_distribution() {
        let mut peer = Peer::new("n1".into(), "node-1".into(), "127.0.0.1".into(), 9000, "pk".into());
        for ms in 1..=100 {
            peer.record_rtt(Duration::from_millis(ms));
        }
        let p99 = peer.rtt_p99().unwrap();
        assert!(p99 >= Duration::from_millis(98));
    }

    #[test]
    fn healthy_ids_always_includes_self() {
        let peers: PeerTable = DashMap::new();
        let ids = healthy_node_ids(&peers, &"self-1".to_string());
        assert_eq!(ids, vec!["self-1".to_string()]);
    }
}
