//! Per-node fairness bookkeeping (§3, §4.2): jobs executed, last execution
//! time, coordinator tiebreak counts, and a rough estimate of each node's
//! current in-flight job count. All of it is derived from gossip-observed
//! events (`JobClaim`, `JobResult`) — nothing here is exchanged directly.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use mesh_core::NodeId;

/// §4.2: a node is "starving" past this much time since its last execution.
pub const DEFAULT_STARVATION_THRESHOLD: Duration = Duration::from_secs(60);

pub struct FairnessTracker {
    jobs_executed: DashMap<NodeId, u64>,
    last_execution: DashMap<NodeId, Instant>,
    coordinator_count: DashMap<NodeId, u64>,
    /// Rough count of jobs a node currently holds a claim on but hasn't yet
    /// reported a result for. Feeds the coordinator election's primary sort
    /// key (§4.2 step 2) so busy nodes aren't picked again as coordinator.
    active_jobs: DashMap<NodeId, u32>,
    starvation_threshold: Duration,
}

impl Default for FairnessTracker {
    fn default() -> Self {
        Self::new(DEFAULT_STARVATION_THRESHOLD)
    }
}

impl FairnessTracker {
    pub fn new(starvation_threshold: Duration) -> Self {
        Self {
            jobs_executed: DashMap::new(),
            last_execution: DashMap::new(),
            coordinator_count: DashMap::new(),
            active_jobs: DashMap::new(),
            starvation_threshold,
        }
    }

    /// Called when a `JobClaim` naming `node_id` as winner is observed.
    pub fn record_job_claimed(&self, node_id: &NodeId) {
        *self.active_jobs.entry(node_id.clone()).or_insert(0) += 1;
    }

    /// Called when a `JobResult` from `node_id` is observed: marks the job
    /// won/executed and releases the in-flight slot reserved at claim time.
    pub fn record_job_result(&self, node_id: &NodeId) {
        *self.jobs_executed.entry(node_id.clone()).or_insert(0) += 1;
        self.last_execution.insert(node_id.clone(), Instant::now());
        if let Some(mut count) = self.active_jobs.get_mut(node_id) {
            *count = count.saturating_sub(1);
        }
    }

    pub fn jobs_executed(&self, node_id: &NodeId) -> u64 {
        self.jobs_executed.get(node_id).map(|v| *v).unwrap_or(0)
    }

    pub fn active_jobs_estimate(&self, node_id: &NodeId) -> u32 {
        self.active_jobs.get(node_id).map(|v| *v).unwrap_or(0)
    }

    pub fn coordinator_count(&self, node_id: &NodeId) -> u64 {
        self.coordinator_count.get(node_id).map(|v| *v).unwrap_or(0)
    }

    /// §4.2 step 5: record that `node_id` was just elected coordinator.
    pub fn increment_coordinator_count(&self, node_id: &NodeId) {
        *self.coordinator_count.entry(node_id.clone()).or_insert(0) += 1;
    }

    /// `min(1, (now - last_execution) / threshold)`; a node that has never
    /// executed a job is maximally starved.
    pub fn starvation_score(&self, node_id: &NodeId) -> f64 {
        match self.last_execution.get(node_id) {
            None => 1.0,
            Some(last) => {
                let elapsed = last.elapsed().as_secs_f64();
                (elapsed / self.starvation_threshold.as_secs_f64()).min(1.0)
            }
        }
    }

    pub fn is_starving(&self, node_id: &NodeId) -> bool {
        match self.last_execution.get(node_id) {
            None => true,
            Some(last) => last.elapsed() > self.starvation_threshold,
        }
    }
}
