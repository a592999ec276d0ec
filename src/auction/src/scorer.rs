//! Bid scoring (§4.3): a weighted sum of capability match, load, trust,
//! urgency, and priority, with fairness additives and a soft-clamp applied
//! afterward so the result never hits exactly 1.0.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;
use mesh_core::{Job, NodeId, Timestamp};
use mesh_coordinator::FairnessTracker;
use rand::Rng;

const W_CAPABILITY: f64 = 0.35;
const W_LOAD: f64 = 0.30;
const W_TRUST: f64 = 0.15;
const W_URGENCY: f64 = 0.10;
const W_PRIORITY: f64 = 0.10;

const MISSING_REQUIREMENT_DECAY: f64 = 0.7;
const COMPLETION_BONUS_PER_JOB: f64 = 0.02;
const MAX_COMPLETION_BONUS: f64 = 0.2;

const MAX_IDLE_BONUS: f64 = 0.05;
const MAX_STARVATION_BONUS: f64 = 0.05;
const JITTER_RANGE: f64 = 0.02;
const URGENCY_HORIZON_SECS: f64 = 300.0;

/// Sigmoid steepness for the final soft-clamp, centered at 0.8 (§4.3).
const SOFT_CLAMP_STEEPNESS: f64 = 6.0;
const SOFT_CLAMP_CENTER: f64 = 0.8;

/// Pluggable additive hook modeling the distilled source's economic
/// fairness engine. The starvation/idle bonuses computed here are always
/// applied by [`BidScorer`] itself (§4.3); this seam exists purely so a
/// node operator can layer additional policy on top of the base score
/// without this crate depending on that policy's internals.
pub trait FairnessAdvisor: Send + Sync {
    fn fair_bid_score(&self, base_score: f64, node_id: &NodeId, trust_score: f64) -> f64;
}

/// The default fairness advisor: a pure pass-through, carrying no learning,
/// diversity tracking, or persistence of its own (§4.3, §9).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpFairnessAdvisor;

impl FairnessAdvisor for NoOpFairnessAdvisor {
    fn fair_bid_score(&self, base_score: f64, _node_id: &NodeId, _trust_score: f64) -> f64 {
        base_score
    }
}

/// Local resource utilization inputs the scorer blends into the load term.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceLoad {
    pub cpu: f64,
    pub mem: f64,
}

/// Scores jobs against this node's own capability set, tracking per-job-type
/// completion history and consecutive-loss streaks that feed the fairness
/// additives.
pub struct BidScorer {
    capabilities: BTreeSet<String>,
    completions: DashMap<String, u32>,
    consecutive_losses: AtomicU32,
}

impl BidScorer {
    pub fn new(capabilities: BTreeSet<String>) -> Self {
        Self {
            capabilities,
            completions: DashMap::new(),
            consecutive_losses: AtomicU32::new(0),
        }
    }

    pub fn capabilities(&self) -> &BTreeSet<String> {
        &self.capabilities
    }

    pub fn record_completion(&self, job_type: &str) {
        *self.completions.entry(job_type.to_string()).or_insert(0) += 1;
    }

    pub fn record_win(&self) {
        self.consecutive_losses.store(0, Ordering::Relaxed);
    }

    pub fn record_loss(&self) {
        self.consecutive_losses.fetch_add(1, Ordering::Relaxed);
    }

    fn capability_component(&self, job: &Job) -> f64 {
        if !self.capabilities.contains(&job.job_type) {
            return 0.0;
        }
        let missing = job.requirements.iter().filter(|r| !self.capabilities.contains(*r)).count();
        let mut value = MISSING_REQUIREMENT_DECAY.powi(missing as i32);
        let prior = self.completions.get(&job.job_type).map(|v| *v).unwrap_or(0);
        value += (COMPLETION_BONUS_PER_JOB * prior as f64).min(MAX_COMPLETION_BONUS);
        value.min(1.0)
    }

    fn load_component(&self, active_jobs: u32, max_concurrent: u32, load: ResourceLoad) -> f64 {
        let slot_headroom = if max_concurrent == 0 {
            0.0
        } else {
            1.0 - (active_jobs as f64 / max_concurrent as f64)
        };
        let resource_headroom = 1.0 - (load.cpu + load.mem) / 2.0;
        (0.6 * slot_headroom + 0.4 * resource_headroom).clamp(0.0, 1.0)
    }

    /// Computes the final, fairness-adjusted, soft-clamped bid score for
    /// `job`. `advisor` is consulted after the base weighted sum and before
    /// the idle/starvation/jitter additives and soft-clamp.
    #[allow(clippy::too_many_arguments)]
    pub fn score(
        &self,
        job: &Job,
        trust_score: f64,
        active_jobs: u32,
        max_concurrent: u32,
        load: ResourceLoad,
        fairness: &FairnessTracker,
        self_id: &NodeId,
        now: Timestamp,
        advisor: &dyn FairnessAdvisor,
    ) -> f64 {
        let capability = self.capability_component(job) * W_CAPABILITY;
        let load_term = self.load_component(active_jobs, max_concurrent, load) * W_LOAD;
        let trust_term = trust_score.max(0.0).powf(0.7) * W_TRUST;
        let time_to_deadline = (job.deadline - now).max(0.0);
        let urgency = (1.0 - (time_to_deadline / URGENCY_HORIZON_SECS).min(1.0)).clamp(0.0, 1.0) * W_URGENCY;
        let priority = job.priority.clamp(0.0, 1.0) * W_PRIORITY;

        let base = (capability + load_term + trust_term + urgency + priority).clamp(0.0, 1.0);
        let advised = advisor.fair_bid_score(base, self_id, trust_score).clamp(0.0, 1.0);

        let losses = self.consecutive_losses.load(Ordering::Relaxed);
        let idle_bonus = MAX_IDLE_BONUS * (losses as f64 / 5.0).min(1.0);
        let starvation_bonus = MAX_STARVATION_BONUS * fairness.starvation_score(self_id);
        let jitter = rand::thread_rng().gen_range(-JITTER_RANGE..=JITTER_RANGE);

        let adjusted = (advised + idle_bonus + starvation_bonus + jitter).clamp(0.0, 1.0);
        soft_clamp(adjusted)
    }
}

/// Sigmoid centered at 0.8: compresses scores near the top of the range so
/// they stay distinguishable, and asymptotically never reaches 1.0 exactly.
fn soft_clamp(x: f64) -> f64 {
    1.0 / (1.0 + (-SOFT_CLAMP_STEEPNESS * (x - SOFT_CLAMP_CENTER)).exp())
}
