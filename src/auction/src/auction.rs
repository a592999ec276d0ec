//! The auction protocol state machine (§4.4): `IDLE -> BIDDING -> SENT ->
//! RESOLVED -> {LOST | CLAIMED -> CONFIRMED}`, one instance per
//! `(this_node, job_id)`, driven by gossip-observed `JobBid`/`JobClaim`
//! traffic and a handful of timers anchored to the job's own timestamp.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use mesh_core::{Bid, Claim, Job, MessagePayload, NodeId};
use mesh_coordinator::{CoordinatorElection, FairnessTracker};
use mesh_network::GossipNode;
use mesh_reputation::ReputationTracker;
use mesh_wallet::Wallet;
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::scorer::{BidScorer, FairnessAdvisor, ResourceLoad};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuctionState {
    Idle,
    Bidding,
    Sent,
    Resolved,
    Claimed,
    Confirmed,
    Lost,
}

/// Outcome delivered to the executor once a job's auction settles. Sent
/// over an `mpsc` channel rather than invoked as a closure (§9): closures
/// captured by a long-lived state machine are a common source of the
/// distilled source's callback-lifetime bugs.
#[derive(Debug, Clone)]
pub enum AuctionOutcome {
    Won {
        job: Job,
        stake_amount: f64,
        score: f64,
    },
    Lost {
        job_id: String,
    },
}

#[derive(Debug, Clone)]
pub struct AuctionConfig {
    pub bidding_window: Duration,
    pub bid_collection_buffer: Duration,
    pub grace_period: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub stake_requirement: f64,
    pub max_concurrent_jobs: u32,
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self {
            bidding_window: Duration::from_millis(2000),
            bid_collection_buffer: Duration::from_millis(500),
            grace_period: Duration::from_secs(5),
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_millis(1500),
            stake_requirement: 0.1,
            max_concurrent_jobs: 4,
        }
    }
}

struct JobAuction {
    job: Job,
    state: AuctionState,
    my_bid: Option<Bid>,
    my_claim: Option<Claim>,
    bids: HashMap<NodeId, Bid>,
}

impl JobAuction {
    fn new(job: Job) -> Self {
        Self {
            job,
            state: AuctionState::Idle,
            my_bid: None,
            my_claim: None,
            bids: HashMap::new(),
        }
    }

    /// §4.4.3 winner determination: dedupe by node id keeping the highest
    /// score, then sort by `(-score, node_id)`.
    fn determine_winner(&self) -> Option<NodeId> {
        let mut best: Option<&Bid> = None;
        for bid in self.bids.values() {
            best = match best {
                None => Some(bid),
                Some(current) if bid.sort_key() < current.sort_key() => Some(bid),
                Some(current) => Some(current),
            };
        }
        best.map(|b| b.node_id.clone())
    }
}

/// Runs the auction protocol for every job this node observes, staking and
/// claiming through a shared [`Wallet`], and delivering settled outcomes to
/// whoever drains the paired `mpsc::Receiver<AuctionOutcome>`.
pub struct AuctionManager {
    self_id: NodeId,
    node: Arc<GossipNode>,
    wallet: Arc<Wallet>,
    reputation: Arc<ReputationTracker>,
    fairness: Arc<FairnessTracker>,
    election: Arc<CoordinatorElection>,
    scorer: Arc<BidScorer>,
    advisor: Arc<dyn FairnessAdvisor>,
    config: AuctionConfig,
    jobs: DashMap<String, Mutex<JobAuction>>,
    /// §3 `job_coordinators[job_id] -> NodeID`: the coordinator this node has
    /// either elected itself or learned about via an observed
    /// `AuctionCoordinate` broadcast.
    job_coordinators: DashMap<String, NodeId>,
    active_jobs: AtomicU32,
    outcome_tx: mpsc::Sender<AuctionOutcome>,
}

impl AuctionManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        self_id: NodeId,
        node: Arc<GossipNode>,
        wallet: Arc<Wallet>,
        reputation: Arc<ReputationTracker>,
        fairness: Arc<FairnessTracker>,
        election: Arc<CoordinatorElection>,
        scorer: Arc<BidScorer>,
        advisor: Arc<dyn FairnessAdvisor>,
        config: AuctionConfig,
    ) -> (Arc<Self>, mpsc::Receiver<AuctionOutcome>) {
        let (outcome_tx, outcome_rx) = mpsc::channel(256);
        let manager = Arc::new(Self {
            self_id,
            node,
            wallet,
            reputation,
            fairness,
            election,
            scorer,
            advisor,
            config,
            jobs: DashMap::new(),
            job_coordinators: DashMap::new(),
            active_jobs: AtomicU32::new(0),
            outcome_tx,
        });
        (manager, outcome_rx)
    }

    fn required_stake(&self, job: &Job) -> f64 {
        job.payment * self.config.stake_requirement
    }

    fn is_self_quarantined(&self) -> bool {
        self.reputation.my_trust_score() < mesh_reputation::QUARANTINE_THRESHOLD
    }

    /// §4.4.1 `IDLE -> BIDDING`: entry conditions are a new job id,
    /// capability match, self not quarantined, and being able to afford the
    /// stake.
    pub fn handle_job_broadcast(self: &Arc<Self>, job: Job) {
        let job_id = job.job_id.clone();
        if self.jobs.contains_key(&job_id) {
            return;
        }
        if !self.scorer.capabilities().contains(&job.job_type) {
            return;
        }
        if self.is_self_quarantined() {
            debug!(job_id, "skipping bid: self quarantined");
            return;
        }
        let stake_amount = self.required_stake(&job);
        if !self.wallet.can_afford(stake_amount) {
            debug!(job_id, stake_amount, "skipping bid: cannot afford stake");
            return;
        }
        let auction_deadline = job.timestamp + self.config.bidding_window.as_secs_f64();
        let now = self.node.corrected_now();
        if auction_deadline - now <= 0.0 {
            debug!(job_id, "skipping bid: auction deadline already passed");
            return;
        }

        self.jobs.insert(job_id.clone(), Mutex::new(JobAuction::new(job)));
        {
            let mut entry = self.jobs.get(&job_id).unwrap().lock();
            entry.state = AuctionState::Bidding;
        }

        // §4.2: elect this job's coordinator from the gossip-observed
        // healthy set. The election is local and deterministic, so every
        // node that has broadcast this job reaches the same winner; only
        // the winner announces it, which is what other nodes' `job_coordinators`
        // entries are populated from.
        let coordinator_id = self.election.elect_coordinator_for_job(&job_id);
        self.job_coordinators.insert(job_id.clone(), coordinator_id.clone());
        if coordinator_id == self.self_id {
            self.node.broadcast(MessagePayload::AuctionCoordinate {
                job_id: job_id.clone(),
                coordinator_id,
                bid_deadline: auction_deadline,
            });
        }

        let manager = self.clone();
        tokio::spawn(async move {
            manager.run_job_auction(job_id, auction_deadline).await;
        });
    }

    async fn run_job_auction(self: Arc<Self>, job_id: String, auction_deadline: f64) {
        self.active_jobs.fetch_add(1, Ordering::Relaxed);
        let result = self.run_job_auction_inner(&job_id, auction_deadline).await;
        self.active_jobs.fetch_sub(1, Ordering::Relaxed);
        if let Err(e) = result {
            warn!(job_id, error = %e, "auction task ended with error");
        }
    }

    async fn run_job_auction_inner(self: &Arc<Self>, job_id: &str, auction_deadline: f64) -> crate::error::Result<()> {
        let (job, stake_amount, score) = {
            let entry = self.jobs.get(job_id).ok_or_else(|| crate::error::AuctionError::UnknownJob(job_id.to_string()))?;
            let state = entry.lock();
            let job = state.job.clone();
            let active = self.active_jobs.load(Ordering::Relaxed);
            let score = self.scorer.score(
                &job,
                self.reputation.my_trust_score(),
                active,
                self.config.max_concurrent_jobs,
                ResourceLoad::default(),
                &self.fairness,
                &self.self_id,
                self.node.corrected_now(),
                self.advisor.as_ref(),
            );
            (job, self.required_stake(&job), score)
        };

        // §4.4.2 backoff: higher-scoring nodes bid earlier.
        let now = self.node.corrected_now();
        let jitter_ms = rand::thread_rng().gen_range(-50.0..=50.0);
        let spread = (self.config.backoff_max.as_millis() as f64) - (self.config.backoff_base.as_millis() as f64);
        let raw_delay_ms = self.config.backoff_base.as_millis() as f64 + (1.0 - score) * spread + jitter_ms;
        let floor_ms = 50.0;
        let ceiling_ms = ((auction_deadline - now) * 1000.0 - 500.0).max(floor_ms);
        let delay_ms = raw_delay_ms.clamp(floor_ms, ceiling_ms);
        tokio::time::sleep(Duration::from_millis(delay_ms as u64)).await;

        let bid = Bid {
            job_id: job_id.to_string(),
            node_id: self.self_id.clone(),
            score,
            stake_amount,
            estimated_time: 0.0,
            timestamp: self.node.corrected_now(),
        };
        {
            let entry = self.jobs.get(job_id).ok_or_else(|| crate::error::AuctionError::UnknownJob(job_id.to_string()))?;
            let mut state = entry.lock();
            state.state = AuctionState::Sent;
            state.my_bid = Some(bid.clone());
            state.bids.insert(self.self_id.clone(), bid.clone());
        }
        self.node.broadcast(MessagePayload::JobBid { bid });

        // §4.4.2 bid_collection_buffer: absorb late bids for 500ms after
        // the deadline.
        let buffer_end = auction_deadline + self.config.bid_collection_buffer.as_secs_f64();
        let wait_secs = (buffer_end - self.node.corrected_now()).max(0.0);
        tokio::time::sleep(Duration::from_secs_f64(wait_secs)).await;

        self.resolve_and_claim(job_id, &job).await
    }

    async fn resolve_and_claim(self: &Arc<Self>, job_id: &str, job: &Job) -> crate::error::Result<()> {
        let winner = {
            let entry = self.jobs.get(job_id).ok_or_else(|| crate::error::AuctionError::UnknownJob(job_id.to_string()))?;
            let mut state = entry.lock();
            state.state = AuctionState::Resolved;
            state.determine_winner()
        };

        if winner.as_ref() != Some(&self.self_id) {
            self.finish_as_loser(job_id).await;
            return Ok(());
        }

        let stake_amount = self.required_stake(job);
        self.wallet.stake(stake_amount, job_id).map_err(|e| crate::error::AuctionError::Stake {
            job_id: job_id.to_string(),
            source: e,
        })?;

        let (winning_score, backup) = {
            let entry = self.jobs.get(job_id).ok_or_else(|| crate::error::AuctionError::UnknownJob(job_id.to_string()))?;
            let state = entry.lock();
            let mut ranked: Vec<&Bid> = state.bids.values().collect();
            ranked.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
            let winning_score = state.my_bid.as_ref().map(|b| b.score).unwrap_or(0.0);
            let backup = ranked.get(1).map(|b| b.node_id.clone());
            (winning_score, backup)
        };

        let claim = Claim {
            job_id: job_id.to_string(),
            winner_node_id: self.self_id.clone(),
            backup_node_id: backup,
            stake_amount,
            winning_score,
        };
        {
            let entry = self.jobs.get(job_id).ok_or_else(|| crate::error::AuctionError::UnknownJob(job_id.to_string()))?;
            let mut state = entry.lock();
            state.state = AuctionState::Claimed;
            state.my_claim = Some(claim.clone());
        }
        self.fairness.record_job_claimed(&self.self_id);

        let quorum = self.node.broadcast_reliable(MessagePayload::JobClaim { claim }).await;
        if quorum.is_err() {
            // §4.4.4: partition detected. Abort execution, return the
            // reservation, but do not retract the claim — peers will time
            // the job out on their own.
            warn!(job_id, "claim quorum failed, aborting execution");
            let _ = self.wallet.unstake(stake_amount, job_id, true);
            return Err(crate::error::AuctionError::ClaimQuorumFailed(job_id.to_string()));
        }

        tokio::time::sleep(self.config.grace_period).await;

        let still_winner = {
            let entry = self.jobs.get(job_id).ok_or_else(|| crate::error::AuctionError::UnknownJob(job_id.to_string()))?;
            let mut state = entry.lock();
            if state.state != AuctionState::Claimed {
                // Backed down during grace via conflict resolution.
                false
            } else {
                state.determine_winner().as_ref() == Some(&self.self_id)
            }
        };

        if still_winner {
            let (job, score) = {
                let entry = self.jobs.get(job_id).ok_or_else(|| crate::error::AuctionError::UnknownJob(job_id.to_string()))?;
                let mut state = entry.lock();
                state.state = AuctionState::Confirmed;
                (state.job.clone(), state.my_bid.as_ref().map(|b| b.score).unwrap_or(0.0))
            };
            self.scorer.record_win();
            info!(job_id, score, "auction confirmed, handing off to executor");
            let _ = self
                .outcome_tx
                .send(AuctionOutcome::Won {
                    job,
                    stake_amount,
                    score,
                })
                .await;
        } else {
            self.finish_as_loser(job_id).await;
        }

        Ok(())
    }

    async fn finish_as_loser(self: &Arc<Self>, job_id: &str) {
        if let Some(entry) = self.jobs.get(job_id) {
            let mut state = entry.lock();
            state.state = AuctionState::Lost;
        }
        self.scorer.record_loss();
        let _ = self.outcome_tx.send(AuctionOutcome::Lost { job_id: job_id.to_string() }).await;
    }

    /// §4.2/§6: records a coordinator announced by another node for a job
    /// this node has also broadcast an auction for. Bookkeeping only — the
    /// coordinator is not consulted to determine a winner; every node still
    /// computes that locally from observed bids (§4.4.3).
    pub fn handle_auction_coordinate(&self, job_id: String, coordinator_id: NodeId) {
        self.job_coordinators.insert(job_id, coordinator_id);
    }

    pub fn job_coordinator(&self, job_id: &str) -> Option<NodeId> {
        self.job_coordinators.get(job_id).map(|e| e.clone())
    }

    /// §4.4.1 `SENT`/`RESOLVED` bid accumulation: dedupe by `node_id`,
    /// keeping the higher score.
    pub fn handle_job_bid(&self, bid: Bid) {
        let Some(entry) = self.jobs.get(&bid.job_id) else { return };
        let mut state = entry.lock();
        state
            .bids
            .entry(bid.node_id.clone())
            .and_modify(|existing| {
                if bid.score > existing.score {
                    *existing = bid.clone();
                }
            })
            .or_insert(bid);
    }

    /// §4.4.5 conflict resolution: every observed claim is unconditionally
    /// injected as a synthetic bid, and if we hold our own claim on the same
    /// job, the higher (score, node_id) tiebreak decides who backs down.
    pub fn handle_job_claim(&self, claim: Claim) {
        self.fairness.record_job_claimed(&claim.winner_node_id);

        let Some(entry) = self.jobs.get(&claim.job_id) else { return };
        let mut state = entry.lock();

        let synthetic = Bid {
            job_id: claim.job_id.clone(),
            node_id: claim.winner_node_id.clone(),
            score: claim.winning_score,
            stake_amount: claim.stake_amount,
            estimated_time: 0.0,
            timestamp: 0.0,
        };
        state
            .bids
            .entry(claim.winner_node_id.clone())
            .and_modify(|existing| {
                if synthetic.score > existing.score {
                    *existing = synthetic.clone();
                }
            })
            .or_insert(synthetic);

        if claim.winner_node_id == self.self_id {
            return;
        }
        let Some(my_claim) = state.my_claim.clone() else { return };
        if state.state != AuctionState::Claimed {
            return;
        }

        let back_down = if claim.winning_score != my_claim.winning_score {
            claim.winning_score > my_claim.winning_score
        } else {
            claim.winner_node_id < self.self_id
        };

        if back_down {
            info!(job_id = %claim.job_id, their = claim.winner_node_id, "backing down from claim");
            state.my_claim = None;
            state.state = AuctionState::Lost;
            let stake = my_claim.stake_amount;
            let job_id = claim.job_id.clone();
            drop(state);
            let wallet = self.wallet.clone();
            tokio::spawn(async move {
                let _ = wallet.unstake(stake, &job_id, true);
            });
        }
    }

    /// §4.2 fairness bookkeeping on job completion, observed via
    /// `JOB_RESULT` for any node (including self).
    pub fn handle_job_result_observed(&self, node_id: &NodeId) {
        self.fairness.record_job_result(node_id);
    }

    pub fn job_state(&self, job_id: &str) -> Option<AuctionState> {
        self.jobs.get(job_id).map(|e| e.lock().state)
    }

    /// §8 auction-boundedness property: a job's auction state is fully
    /// garbage-collected within `bidding_window + buffer + grace + 1s` of
    /// its broadcast timestamp, regardless of outcome. Runs independently
    /// of the per-job monitor task so a job whose monitor panicked or was
    /// never spawned (e.g. a stale `jobs` entry from a crashed attempt)
    /// still gets reclaimed.
    fn gc_deadline(&self, job: &Job) -> f64 {
        job.timestamp
            + self.config.bidding_window.as_secs_f64()
            + self.config.bid_collection_buffer.as_secs_f64()
            + self.config.grace_period.as_secs_f64()
            + 1.0
    }

    fn sweep_expired(&self) {
        let now = self.node.corrected_now();
        let expired: Vec<String> = self
            .jobs
            .iter()
            .filter(|entry| now >= self.gc_deadline(&entry.value().lock().job))
            .map(|entry| entry.key().clone())
            .collect();
        for job_id in expired {
            self.jobs.remove(&job_id);
        }
    }

    /// Runs [`Self::sweep_expired`] on a fixed tick for as long as the
    /// manager is alive.
    pub fn spawn_gc_loop(self: &Arc<Self>) {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                manager.sweep_expired();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn job(id: &str) -> Job {
        Job {
            job_id: id.into(),
            job_type: "shell".into(),
            priority: 0.5,
            payment: 100.0,
            deadline: 1000.0,
            requirements: BTreeSet::new(),
            payload: vec![],
            verify: false,
            verifiers: vec![],
            timestamp: 0.0,
        }
    }

    fn bid(job_id: &str, node: &str, score: f64) -> Bid {
        Bid {
            job_id: job_id.into(),
            node_id: node.into(),
            score,
            stake_amount: 10.0,
            estimated_time: 1.0,
            timestamp: 0.0,
        }
    }

    #[test]
    fn determine_winner_picks_highest_score() {
        let mut auction = JobAuction::new(job("j1"));
        auction.bids.insert("a".into(), bid("j1", "a", 0.5));
        auction.bids.insert("b".into(), bid("j1", "b", 0.9));
        assert_eq!(auction.determine_winner(), Some("b".to_string()));
    }

    #[test]
    fn determine_winner_breaks_ties_by_node_id() {
        let mut auction = JobAuction::new(job("j1"));
        auction.bids.insert("zz".into(), bid("j1", "zz", 0.7));
        auction.bids.insert("aa".into(), bid("j1", "aa", 0.7));
        assert_eq!(auction.determine_winner(), Some("aa".to_string()));
    }

    #[test]
    fn empty_auction_has_no_winner() {
        let auction = JobAuction::new(job("j1"));
        assert_eq!(auction.determine_winner(), None);
    }

    async fn test_manager() -> Arc<AuctionManager> {
        let identity = mesh_crypto::SigningIdentity::generate();
        let (gossip, _dispatch_rx) =
            GossipNode::bind("n1".into(), identity.clone(), mesh_network::GossipConfig::default())
                .await
                .unwrap();
        let pid = std::process::id();
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let ledger_path = std::env::temp_dir().join(format!("mesh-auction-gc-test-{pid}-{nanos}.jsonl"));
        let wallet = Arc::new(Wallet::open("n1".to_string(), identity, 100.0, ledger_path, None).unwrap());
        let reputation = Arc::new(ReputationTracker::new(None).unwrap());
        let fairness = Arc::new(FairnessTracker::default());
        let election = Arc::new(CoordinatorElection::new("n1".to_string(), gossip.peers().clone(), fairness.clone()));
        let scorer = Arc::new(BidScorer::new(BTreeSet::from(["shell".to_string()])));
        let (manager, _outcome_rx) = AuctionManager::new(
            "n1".to_string(),
            gossip,
            wallet,
            reputation,
            fairness,
            election,
            scorer,
            Arc::new(NoOpFairnessAdvisor),
            AuctionConfig::default(),
        );
        manager
    }

    #[tokio::test]
    async fn sweep_expired_reclaims_jobs_past_the_gc_deadline() {
        let manager = test_manager().await;
        let mut j = job("j1");
        // Timestamp far enough in the past that `gc_deadline` has already
        // elapsed relative to `corrected_now()`.
        j.timestamp = manager.node.corrected_now() - 100.0;
        manager.jobs.insert(j.job_id.clone(), Mutex::new(JobAuction::new(j)));
        assert!(manager.jobs.contains_key("j1"));

        manager.sweep_expired();

        assert!(!manager.jobs.contains_key("j1"));
    }

    #[tokio::test]
    async fn sweep_expired_leaves_fresh_jobs_alone() {
        let manager = test_manager().await;
        let mut j = job("j2");
        j.timestamp = manager.node.corrected_now();
        manager.jobs.insert(j.job_id.clone(), Mutex::new(JobAuction::new(j)));

        manager.sweep_expired();

        assert!(manager.jobs.contains_key("j2"));
    }

    #[tokio::test]
    async fn job_broadcast_elects_and_records_a_coordinator() {
        let manager = test_manager().await;
        let mut j = job("j3");
        j.timestamp = manager.node.corrected_now();
        manager.handle_job_broadcast(j);
        assert!(manager.job_coordinator("j3").is_some());
    }

    #[tokio::test]
    async fn auction_coordinate_from_a_peer_is_recorded() {
        let manager = test_manager().await;
        manager.handle_auction_coordinate("j4".to_string(), "some-peer".to_string());
        assert_eq!(manager.job_coordinator("j4"), Some("some-peer".to_string()));
    }
}
