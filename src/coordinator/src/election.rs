//! Deterministic coordinator election (§4.2): every node, given the same
//! known-healthy peer set and `job_id`, must elect the same coordinator
//! without exchanging a single message about the decision itself.

use std::sync::Arc;
use std::time::{Duration, Instant};

use mesh_core::NodeId;
use mesh_crypto::job_id_hash_u32;
use mesh_network::{healthy_node_ids, PeerTable};
use parking_lot::Mutex;

use crate::fairness::FairnessTracker;

/// §4.2 step 1: the healthy-peer snapshot is cached for this long so a burst
/// of elections (one per incoming job) doesn't recompute it every time.
const HEALTHY_SET_CACHE_TTL: Duration = Duration::from_secs(5);

struct HealthyCache {
    computed_at: Instant,
    ids: Vec<NodeId>,
}

pub struct CoordinatorElection {
    self_id: NodeId,
    peers: Arc<PeerTable>,
    fairness: Arc<FairnessTracker>,
    cache: Mutex<Option<HealthyCache>>,
}

impl CoordinatorElection {
    pub fn new(self_id: NodeId, peers: Arc<PeerTable>, fairness: Arc<FairnessTracker>) -> Self {
        Self {
            self_id,
            peers,
            fairness,
            cache: Mutex::new(None),
        }
    }

    /// `H` from §4.2 step 1: node ids with `last_seen < 30s`, plus self.
    fn healthy_set(&self) -> Vec<NodeId> {
        let mut cache = self.cache.lock();
        if let Some(entry) = cache.as_ref() {
            if entry.computed_at.elapsed() < HEALTHY_SET_CACHE_TTL {
                return entry.ids.clone();
            }
        }
        let mut ids = healthy_node_ids(&self.peers, &self.self_id);
        ids.sort();
        *cache = Some(HealthyCache {
            computed_at: Instant::now(),
            ids: ids.clone(),
        });
        ids
    }

    /// The sort/candidate key from §4.2 step 2: `(active_jobs_estimate,
    /// coordinator_count[node], node_id)` ascending.
    fn sort_key(&self, node_id: &NodeId) -> (u32, u64, NodeId) {
        (
            self.fairness.active_jobs_estimate(node_id),
            self.fairness.coordinator_count(node_id),
            node_id.clone(),
        )
    }

    /// §4.2: elects a coordinator for `job_id` from the current healthy set.
    /// Deterministic across every node holding the same healthy set,
    /// because it depends only on SHA-256(job_id) and locally-observed
    /// fairness state that every node derives the same way from the same
    /// gossip stream.
    pub fn elect_coordinator_for_job(&self, job_id: &str) -> NodeId {
        let mut healthy = self.healthy_set();
        if healthy.is_empty() {
            healthy.push(self.self_id.clone());
        }
        healthy.sort_by_key(|id| self.sort_key(id));

        // Candidate set C: the prefix sharing the minimum (active_jobs,
        // coordinator_count) pair (§4.2 step 3). node_id only breaks ties
        // inside the sort, not the prefix membership test.
        let min_key = {
            let first = &healthy[0];
            (
                self.fairness.active_jobs_estimate(first),
                self.fairness.coordinator_count(first),
            )
        };
        let candidates: Vec<NodeId> = healthy
            .into_iter()
            .take_while(|id| {
                (
                    self.fairness.active_jobs_estimate(id),
                    self.fairness.coordinator_count(id),
                ) == min_key
            })
            .collect();

        // §4.2 step 4: a keyed, deterministic hash — never a language
        // object hash — selects the winner within the candidate set.
        let idx = (job_id_hash_u32(job_id) as usize) % candidates.len();
        let winner = candidates[idx].clone();

        self.fairness.increment_coordinator_count(&winner);
        winner
    }
}
