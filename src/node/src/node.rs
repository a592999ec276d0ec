//! The node orchestrator (§9): every per-process subsystem as an explicit
//! field of a `MeshNode` value, constructed once and shared by `Arc` with
//! the background tasks it spawns. No subsystem is reached through a
//! process-global — a process that wants a second node just builds a
//! second `MeshNode`.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use mesh_auction::{AuctionConfig, AuctionManager, AuctionOutcome, NoOpFairnessAdvisor};
use mesh_coordinator::{CoordinatorElection, FairnessTracker};
use mesh_core::{Job, MessagePayload, NodeId};
use mesh_crypto::{load_or_generate_encryption_key, load_or_generate_signing_key, EncryptionIdentity, SigningIdentity};
use mesh_executor::{CheckpointManager, ExecutionHarness, JobStatus as ExecJobStatus, RecoveryManager, ShellRunner};
use mesh_network::{GossipConfig, GossipNode};
use mesh_reputation::{PeerOutcome, ReputationTracker, SelfOutcome, Watchdog};
use mesh_wallet::{calculate_payment, Wallet};
use tracing::{info, warn};

use crate::config::MeshConfig;
use crate::error::Result;

/// Every long-lived subsystem a running node owns, wired together once at
/// startup. Held behind `Arc<MeshNode>` so background tasks can each clone
/// the handle they need without reaching through a global.
pub struct MeshNode {
    pub config: MeshConfig,
    pub self_id: NodeId,
    pub signing_identity: SigningIdentity,
    pub encryption_identity: EncryptionIdentity,
    pub gossip: Arc<GossipNode>,
    pub wallet: Arc<Wallet>,
    pub reputation: Arc<ReputationTracker>,
    pub watchdog: Arc<Watchdog>,
    pub fairness: Arc<FairnessTracker>,
    pub election: Arc<CoordinatorElection>,
    pub auction: Arc<AuctionManager>,
    pub executor: Arc<ExecutionHarness>,
    pub recovery: Arc<RecoveryManager>,
    /// Jobs this node has seen broadcast, kept only long enough to hand a
    /// full `Job` to the recovery manager if this node is later named
    /// backup for it (`JobClaim` only carries the job id).
    jobs_seen: DashMap<String, Job>,
    /// Stake reserved per job this node is executing, consulted at
    /// settlement time to release or slash it.
    job_stakes: DashMap<String, f64>,
}

impl MeshNode {
    /// Builds every subsystem and spawns the background tasks that drive
    /// them, in the order each one's dependencies become available.
    pub async fn new(config: MeshConfig) -> Result<Arc<Self>> {
        // 1. Data directories.
        std::fs::create_dir_all(config.data_dir())?;
        std::fs::create_dir_all(config.checkpoints_dir())?;

        // 2. Node identity: persisted Ed25519 signing key and X25519
        //    encryption key, generated on first run.
        let signing_identity = load_or_generate_signing_key(&config.signing_key_path())?;
        let encryption_identity = load_or_generate_encryption_key(&config.encryption_key_path())?;
        let self_id = signing_identity.public_key_hex();

        // 3. Token wallet: replays the signed ledger (or loads the cached
        //    snapshot) to recover balance/staked/reward-pool state.
        let wallet = Arc::new(Wallet::open(
            self_id.clone(),
            signing_identity.clone(),
            config.token.starting_balance,
            config.ledger_path(),
            Some(config.wallet_snapshot_path()),
        )?);

        // 4. Reputation: this node's own trust score and its view of every
        //    peer it has dealt with.
        let reputation = Arc::new(ReputationTracker::new(Some(config.reputation_path()))?);

        // 5. Gossip transport.
        let gossip_config = GossipConfig {
            listen_addr: config.network.listen_addr()?,
            node_name: config.node.id.clone(),
            discovery_interval: config.network.discovery_interval(),
            max_peers: config.network.max_peers,
            ..GossipConfig::default()
        };
        let (gossip, mut dispatch_rx) =
            GossipNode::bind(self_id.clone(), signing_identity.clone(), gossip_config).await?;

        for entry in &config.network.bootstrap_peers {
            let Some((peer_id, addr)) = entry.split_once('@') else {
                warn!(entry, "ignoring malformed bootstrap_peers entry, expected node_id@ip:port");
                continue;
            };
            let Some((ip, port)) = addr.rsplit_once(':') else {
                warn!(entry, "ignoring malformed bootstrap_peers entry, expected node_id@ip:port");
                continue;
            };
            let Ok(port) = port.parse::<u16>() else {
                warn!(entry, "ignoring bootstrap_peers entry with invalid port");
                continue;
            };
            gossip.register_peer(peer_id.to_string(), peer_id.to_string(), ip.to_string(), port, String::new());
        }

        // 6. Fairness bookkeeping and coordinator election, both derived
        //    purely from gossip-observed traffic.
        let fairness = Arc::new(FairnessTracker::default());
        let election = Arc::new(CoordinatorElection::new(self_id.clone(), gossip.peers().clone(), fairness.clone()));
        let watchdog = Arc::new(Watchdog::new(reputation.clone(), gossip.peers().clone()));

        // 7. Execution harness: registers the runners this node can serve,
        //    which also defines its bid-scoring capability set.
        let checkpoints = Arc::new(CheckpointManager::new(config.checkpoints_dir()));
        let (executor, mut result_rx) =
            ExecutionHarness::new(gossip.clone(), checkpoints, config.executor.max_concurrent_jobs);
        executor.register(Arc::new(ShellRunner));
        let capabilities: BTreeSet<String> = BTreeSet::from(["shell".to_string()]);

        let recovery = Arc::new(RecoveryManager::new(executor.clone(), mesh_executor::DEFAULT_HEARTBEAT_TIMEOUT));

        // 8. Auction manager: stakes and claims through the wallet built in
        //    step 3, scored against the capability set from step 7.
        let scorer = Arc::new(mesh_auction::BidScorer::new(capabilities));
        let auction_config = AuctionConfig {
            stake_requirement: config.token.stake_requirement,
            max_concurrent_jobs: config.executor.max_concurrent_jobs,
            ..AuctionConfig::default()
        };
        let (auction, mut outcome_rx) = AuctionManager::new(
            self_id.clone(),
            gossip.clone(),
            wallet.clone(),
            reputation.clone(),
            fairness.clone(),
            election.clone(),
            scorer,
            Arc::new(NoOpFairnessAdvisor),
            auction_config,
        );

        let node = Arc::new(Self {
            config,
            self_id,
            signing_identity,
            encryption_identity,
            gossip: gossip.clone(),
            wallet,
            reputation,
            watchdog: watchdog.clone(),
            fairness,
            election,
            auction,
            executor: executor.clone(),
            recovery: recovery.clone(),
            jobs_seen: DashMap::new(),
            job_stakes: DashMap::new(),
        });

        // 9. Background loops: discovery/cleanup/health/clock-sync on the
        //    transport, the watchdog's 10s scan, and the recovery manager's
        //    5s takeover scan.
        gossip.start_background_loops("127.0.0.1".to_string(), node.config.network.pub_port);
        watchdog.spawn_scan_loop();
        recovery.spawn_scan_loop();
        node.auction.spawn_gc_loop();

        // 10. Drain the auction's settled outcomes into the executor.
        {
            let node = node.clone();
            tokio::spawn(async move {
                while let Some(outcome) = outcome_rx.recv().await {
                    node.handle_auction_outcome(outcome);
                }
            });
        }

        // 11. Drain the executor's settled results into wallet/reputation
        //     settlement.
        {
            let node = node.clone();
            tokio::spawn(async move {
                while let Some(result) = result_rx.recv().await {
                    node.settle_own_result(result);
                }
            });
        }

        // 12. Drain inbound gossip traffic into the subsystems above.
        {
            let node = node.clone();
            tokio::spawn(async move {
                while let Some(msg) = dispatch_rx.recv().await {
                    node.handle_inbound(msg);
                }
            });
        }

        info!(node_id = %node.self_id, balance = node.wallet.balance(), "node started");
        Ok(node)
    }

    /// The entry point by which a client hands this node a new job (§2's
    /// control flow first step, "Client -> JobBroadcast"). Broadcasting is
    /// all this does: the self-receipt rule (§4.1) means our own gossip
    /// loopback drives this node into the auction exactly like every peer,
    /// so the submitter participates in its own auction fairly.
    pub fn submit_job(self: &Arc<Self>, job: Job) {
        self.jobs_seen.insert(job.job_id.clone(), job.clone());
        self.gossip.broadcast(MessagePayload::JobBroadcast { job });
    }

    fn handle_auction_outcome(self: &Arc<Self>, outcome: AuctionOutcome) {
        match outcome {
            AuctionOutcome::Won { job, stake_amount, score } => {
                info!(job_id = job.job_id, score, "auction won, starting execution");
                self.job_stakes.insert(job.job_id.clone(), stake_amount);
                if let Err(e) = self.executor.execute(job) {
                    warn!(error = %e, "failed to start execution for a won auction");
                }
            }
            AuctionOutcome::Lost { job_id } => {
                self.job_stakes.remove(&job_id);
            }
        }
    }

    fn settle_own_result(self: &Arc<Self>, result: mesh_executor::JobResult) {
        let job_id = result.job_id.clone();
        let Some((_, stake_amount)) = self.job_stakes.remove(&job_id) else { return };
        let job = self.jobs_seen.get(&job_id).map(|e| e.clone());

        let succeeded = matches!(result.status, ExecJobStatus::Success);
        if let Err(e) = self.wallet.unstake(stake_amount, &job_id, succeeded) {
            warn!(job_id, error = %e, "failed to release stake at settlement");
        }

        let deadline = job.as_ref().map(|j| j.deadline).unwrap_or(result.end_time);
        let lateness_secs = (result.end_time - deadline).max(0.0);

        if succeeded {
            let base_amount = job.as_ref().map(|j| j.payment).unwrap_or(0.0);
            let outcome = calculate_payment(
                base_amount,
                self.config.token.network_fee,
                lateness_secs,
                self.wallet.reward_pool(),
                self.config.token.success_bonus,
                self.config.token.late_penalty,
            );
            let base_payment = outcome.payment - outcome.bonus_drawn;
            if base_payment > 0.0 {
                if let Err(e) = self.wallet.deposit(base_payment, "job settlement", Some(job_id.clone()), None) {
                    warn!(job_id, error = %e, "failed to deposit job settlement");
                }
            }
            if outcome.bonus_drawn > 0.0 {
                self.wallet
                    .draw_reward_pool(outcome.bonus_drawn, "on-time success bonus", Some(job_id.clone()));
            }
            let self_outcome = if lateness_secs > 0.0 {
                SelfOutcome::SuccessLate
            } else {
                SelfOutcome::SuccessOnTime
            };
            self.reputation.record_self_outcome(self_outcome);
        } else {
            self.reputation.record_self_outcome(SelfOutcome::Failure);
        }

        self.jobs_seen.remove(&job_id);
    }

    fn handle_inbound(self: &Arc<Self>, msg: mesh_network::InboundMessage) {
        let from = msg.from;
        match msg.payload {
            MessagePayload::PeerAnnounce { node_name, ip, port, .. } => {
                self.gossip.register_peer(from, node_name, ip, port, msg.public_key);
            }
            MessagePayload::PeerGoodbye {} => {}
            MessagePayload::JobBroadcast { job } => {
                self.jobs_seen.insert(job.job_id.clone(), job.clone());
                self.auction.handle_job_broadcast(job);
            }
            MessagePayload::JobBid { bid } => {
                self.auction.handle_job_bid(bid);
            }
            MessagePayload::AuctionCoordinate { job_id, coordinator_id, .. } => {
                self.auction.handle_auction_coordinate(job_id, coordinator_id);
            }
            MessagePayload::JobClaim { claim } => {
                if claim.backup_node_id.as_ref() == Some(&self.self_id) {
                    if let Some(job) = self.jobs_seen.get(&claim.job_id).map(|e| e.clone()) {
                        self.recovery.register_backup(job, claim.winner_node_id.clone());
                    }
                }
                self.auction.handle_job_claim(claim);
            }
            MessagePayload::JobHeartbeat { job_id, .. } => {
                self.recovery.observe_heartbeat(&job_id, &from);
            }
            MessagePayload::JobResult { job_id, status, .. } => {
                self.auction.handle_job_result_observed(&from);
                self.recovery.clear(&job_id);
                if from != self.self_id {
                    let outcome = match status {
                        mesh_core::JobStatus::Success => PeerOutcome::Success,
                        mesh_core::JobStatus::Failure => PeerOutcome::Failure,
                        mesh_core::JobStatus::Timeout => PeerOutcome::Timeout,
                    };
                    self.reputation.record_peer_outcome(&from, outcome);
                }
                self.jobs_seen.remove(&job_id);
            }
            MessagePayload::ReputationUpdate { .. } => {}
            MessagePayload::TokenTransaction { .. } => {}
            MessagePayload::Ping { .. } | MessagePayload::Pong { .. } | MessagePayload::Ack { .. } => {}
        }
    }

    /// Runs until the process is asked to stop. Every subsystem task was
    /// already spawned in [`Self::new`]; this just gives `main` something
    /// to race against `ctrl_c`/`SIGTERM`.
    pub async fn run(self: &Arc<Self>) -> Result<()> {
        std::future::pending::<()>().await;
        Ok(())
    }

    /// Flushes anything not already persisted synchronously on every
    /// mutation (wallet and reputation both are); kept as the place a
    /// graceful shutdown hooks into, per the teacher's shutdown step.
    pub async fn shutdown(self: &Arc<Self>) -> Result<()> {
        info!(node_id = %self.self_id, balance = self.wallet.balance(), "node shutting down");
        Ok(())
    }
}
