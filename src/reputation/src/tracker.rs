//! Self-trust and peer-trust tracking (§4.7): `{my_trust, history, peer_trust,
//! quarantined, rehab_progress}`, persisted as JSON the same way the node's
//! other local state is.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use mesh_core::{now_unix, NodeId, Timestamp};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;

/// Default daily linear decay applied to `my_trust` at read time.
pub const DECAY_RATE_PER_DAY: f64 = 0.01;
pub const MIN_TRUST: f64 = 0.1;
pub const STARTING_TRUST: f64 = 0.5;
pub const QUARANTINE_THRESHOLD: f64 = 0.2;
pub const REHAB_JOBS_REQUIRED: u32 = 10;
pub const REHAB_TRUST_THRESHOLD: f64 = 0.3;

const SELF_SUCCESS_ON_TIME: f64 = 0.02;
const SELF_SUCCESS_LATE: f64 = 0.01;
const SELF_FAILURE: f64 = -0.05;
const SELF_MALICIOUS: f64 = -0.50;

/// Outcomes that drive the node's own trust score (§4.7 self-update).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelfOutcome {
    SuccessOnTime,
    SuccessLate,
    Failure,
    /// An invalid signature was observed over gossip attributed to this
    /// node's own identity — only reachable if this node's signing key has
    /// been compromised.
    Malicious,
}

impl SelfOutcome {
    fn delta(self) -> f64 {
        match self {
            SelfOutcome::SuccessOnTime => SELF_SUCCESS_ON_TIME,
            SelfOutcome::SuccessLate => SELF_SUCCESS_LATE,
            SelfOutcome::Failure => SELF_FAILURE,
            SelfOutcome::Malicious => SELF_MALICIOUS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationEvent {
    pub ts: Timestamp,
    pub outcome: SelfOutcome,
    pub delta: f64,
    pub trust_after: f64,
}

/// Outcomes observed about a *peer*, used to update `peer_trust` and drive
/// quarantine/rehabilitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerOutcome {
    Success,
    Failure,
    Timeout,
    Malicious,
}

impl PeerOutcome {
    fn delta(self) -> f64 {
        match self {
            PeerOutcome::Success => SELF_SUCCESS_ON_TIME,
            PeerOutcome::Failure => SELF_FAILURE,
            PeerOutcome::Timeout => SELF_FAILURE,
            PeerOutcome::Malicious => SELF_MALICIOUS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedState {
    my_trust: f64,
    last_update: Timestamp,
    history: Vec<ReputationEvent>,
    peer_trust: HashMap<NodeId, f64>,
    quarantined: HashSet<NodeId>,
    rehab_progress: HashMap<NodeId, u32>,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            my_trust: STARTING_TRUST,
            last_update: now_unix(),
            history: Vec::new(),
            peer_trust: HashMap::new(),
            quarantined: HashSet::new(),
            rehab_progress: HashMap::new(),
        }
    }
}

struct Inner {
    state: PersistedState,
    path: Option<PathBuf>,
}

/// The node's own trust score plus its view of every peer it has dealt with.
/// Shared across the auction, executor, and watchdog via `Arc`.
pub struct ReputationTracker {
    inner: Mutex<Inner>,
}

impl ReputationTracker {
    pub fn new(path: Option<PathBuf>) -> Result<Self> {
        let state = match path.as_ref().filter(|p| p.exists()) {
            Some(p) => load(p)?,
            None => PersistedState::default(),
        };
        Ok(Self {
            inner: Mutex::new(Inner { state, path }),
        })
    }

    fn persist(&self, inner: &Inner) {
        let Some(path) = &inner.path else { return };
        if let Err(e) = save(path, &inner.state) {
            warn!(error = %e, "failed to persist reputation state");
        }
    }

    /// §4.7 self-update: apply an outcome delta to `my_trust`, clamp to
    /// `[0,1]`, and append a `ReputationEvent`.
    pub fn record_self_outcome(&self, outcome: SelfOutcome) {
        let mut inner = self.inner.lock();
        let delta = outcome.delta();
        let trust_after = (inner.state.my_trust + delta).clamp(0.0, 1.0);
        inner.state.my_trust = trust_after;
        inner.state.last_update = now_unix();
        inner.state.history.push(ReputationEvent {
            ts: inner.state.last_update,
            outcome,
            delta,
            trust_after,
        });
        self.persist(&inner);
    }

    /// §4.7 decay: linear decay against elapsed wall time since the last
    /// update, evaluated lazily at read time, floored at `MIN_TRUST`.
    pub fn my_trust_score(&self) -> f64 {
        let mut inner = self.inner.lock();
        let elapsed_days = (now_unix() - inner.state.last_update) / 86_400.0;
        if elapsed_days > 0.0 {
            let decayed = (inner.state.my_trust - DECAY_RATE_PER_DAY * elapsed_days).max(MIN_TRUST);
            inner.state.my_trust = decayed;
            inner.state.last_update = now_unix();
            self.persist(&inner);
        }
        inner.state.my_trust
    }

    pub fn history_len(&self) -> usize {
        self.inner.lock().state.history.len()
    }

    /// §4.7 peer tracking: update `peer_trust[node_id]` from an observed
    /// result, escalating to quarantine below `QUARANTINE_THRESHOLD` and
    /// tracking rehabilitation progress once quarantined.
    pub fn record_peer_outcome(&self, peer: &NodeId, outcome: PeerOutcome) {
        let mut inner = self.inner.lock();
        let current = *inner.state.peer_trust.get(peer).unwrap_or(&STARTING_TRUST);
        let updated = (current + outcome.delta()).clamp(0.0, 1.0);
        inner.state.peer_trust.insert(peer.clone(), updated);

        let was_quarantined = inner.state.quarantined.contains(peer);
        if updated < QUARANTINE_THRESHOLD && !was_quarantined {
            inner.state.quarantined.insert(peer.clone());
            inner.state.rehab_progress.insert(peer.clone(), 0);
            warn!(peer, trust = updated, "peer entered quarantine");
        } else if was_quarantined {
            if matches!(outcome, PeerOutcome::Success) {
                let progress = inner.state.rehab_progress.entry(peer.clone()).or_insert(0);
                *progress += 1;
                let (progress, trust) = (*progress, updated);
                if progress >= REHAB_JOBS_REQUIRED && trust > REHAB_TRUST_THRESHOLD {
                    inner.state.quarantined.remove(peer);
                    inner.state.rehab_progress.remove(peer);
                    info!(peer, "peer rehabilitated out of quarantine");
                }
            } else {
                inner.state.rehab_progress.insert(peer.clone(), 0);
            }
        }
        self.persist(&inner);
    }

    pub fn peer_trust(&self, peer: &NodeId) -> f64 {
        *self.inner.lock().state.peer_trust.get(peer).unwrap_or(&STARTING_TRUST)
    }

    pub fn is_quarantined(&self, peer: &NodeId) -> bool {
        self.inner.lock().state.quarantined.contains(peer)
    }

    pub fn quarantined_peers(&self) -> HashSet<NodeId> {
        self.inner.lock().state.quarantined.clone()
    }

    /// Directly force quarantine without waiting for a trust-score crossing,
    /// used by the watchdog's failure-counter escalation.
    pub fn quarantine(&self, peer: &NodeId) {
        let mut inner = self.inner.lock();
        if inner.state.quarantined.insert(peer.clone()) {
            inner.state.rehab_progress.insert(peer.clone(), 0);
            warn!(peer, "peer quarantined by watchdog");
            self.persist(&inner);
        }
    }
}

fn load(path: &Path) -> Result<PersistedState> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn save(path: &Path, state: &PersistedState) -> Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(state)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_update_on_time_increases_trust_and_clamps() {
        let tracker = ReputationTracker::new(None).unwrap();
        let before = tracker.my_trust_score();
        tracker.record_self_outcome(SelfOutcome::SuccessOnTime);
        assert!(tracker.my_trust_score() > before);
        assert_eq!(tracker.history_len(), 1);
    }

    #[test]
    fn malicious_outcome_crashes_trust_and_clamps_at_zero() {
        let tracker = ReputationTracker::new(None).unwrap();
        for _ in 0..5 {
            tracker.record_self_outcome(SelfOutcome::Malicious);
        }
        assert_eq!(tracker.my_trust_score(), 0.0);
    }

    #[test]
    fn peer_dropping_below_threshold_enters_quarantine() {
        let tracker = ReputationTracker::new(None).unwrap();
        for _ in 0..10 {
            tracker.record_peer_outcome(&"peer-1".to_string(), PeerOutcome::Failure);
        }
        assert!(tracker.is_quarantined(&"peer-1".to_string()));
    }

    #[test]
    fn rehabilitation_requires_ten_successes_and_trust_above_threshold() {
        let tracker = ReputationTracker::new(None).unwrap();
        let peer = "peer-2".to_string();
        for _ in 0..10 {
            tracker.record_peer_outcome(&peer, PeerOutcome::Malicious);
        }
        assert!(tracker.is_quarantined(&peer));
        for _ in 0..9 {
            tracker.record_peer_outcome(&peer, PeerOutcome::Success);
        }
        assert!(tracker.is_quarantined(&peer), "not enough successes yet");
        for _ in 0..20 {
            tracker.record_peer_outcome(&peer, PeerOutcome::Success);
        }
        assert!(!tracker.is_quarantined(&peer));
    }

    #[test]
    fn unknown_peer_starts_at_default_trust() {
        let tracker = ReputationTracker::new(None).unwrap();
        assert_eq!(tracker.peer_trust(&"stranger".to_string()), STARTING_TRUST);
        assert!(!tracker.is_quarantined(&"stranger".to_string()));
    }
}
