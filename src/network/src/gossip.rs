//! The gossip transport node: wires transport, signing, replay guard, rate
//! limiter, and reliability tracker into the publish/subscribe pipeline
//! described in §4.1, and runs its background loops (discovery, cleanup,
//! health/ping, clock sync).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use mesh_core::{now_unix, Envelope, MessagePayload, MessageType, NodeId};
use mesh_crypto::SigningIdentity;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::envelope_codec::{build_envelope, verify_envelope};
use crate::error::{NetworkError, Result};
use crate::peer::{healthy_node_ids, Peer, PeerTable, PEER_STALE_AFTER};
use crate::rate_limiter::RateLimiter;
use crate::reliability::{quorum_size, ReliabilityTracker};
use crate::replay_guard::ReplayGuard;
use crate::transport::Transport;

#[derive(Debug, Clone)]
pub struct GossipConfig {
    pub listen_addr: SocketAddr,
    pub node_name: String,
    pub discovery_interval: Duration,
    pub cleanup_interval: Duration,
    pub health_interval: Duration,
    pub clock_sync_interval: Duration,
    pub max_peers: usize,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            node_name: "node".to_string(),
            discovery_interval: Duration::from_secs(5),
            cleanup_interval: Duration::from_secs(60),
            health_interval: Duration::from_secs(10),
            clock_sync_interval: Duration::from_secs(300),
            max_peers: 256,
        }
    }
}

/// A message delivered to the upper (auction/orchestrator) layer after
/// surviving the inbound security pipeline.
pub struct InboundMessage {
    pub from: NodeId,
    /// Hex-encoded public key the envelope declared, so the orchestrator
    /// can register a never-before-seen peer (e.g. on `PeerAnnounce`)
    /// without re-deriving it.
    pub public_key: String,
    pub payload: MessagePayload,
}

pub struct GossipNode {
    self_id: NodeId,
    identity: SigningIdentity,
    config: GossipConfig,
    peers: Arc<PeerTable>,
    replay_guard: Arc<ReplayGuard>,
    rate_limiter: Arc<RateLimiter>,
    reliability: Arc<ReliabilityTracker>,
    transport: Arc<Transport>,
    clock_offset_millis: AtomicI64,
    /// Send instant for each in-flight `ping_id`, consulted on the matching
    /// `Pong` to compute RTT (§4.1 health loop).
    pending_pings: DashMap<String, Instant>,
}

impl GossipNode {
    /// Binds the transport and returns the node plus the channel upper
    /// layers should drain for dispatched messages.
    pub async fn bind(
        self_id: NodeId,
        identity: SigningIdentity,
        config: GossipConfig,
    ) -> Result<(Arc<Self>, mpsc::Receiver<InboundMessage>)> {
        let (transport, inbound_rx) = Transport::bind(self_id.clone(), config.listen_addr).await?;

        let node = Arc::new(Self {
            self_id,
            identity,
            config,
            peers: Arc::new(PeerTable::new()),
            replay_guard: Arc::new(ReplayGuard::default()),
            rate_limiter: Arc::new(RateLimiter::default()),
            reliability: Arc::new(ReliabilityTracker::new()),
            transport,
            clock_offset_millis: AtomicI64::new(0),
            pending_pings: DashMap::new(),
        });

        let (dispatch_tx, dispatch_rx) = mpsc::channel(1024);
        tokio::spawn(inbound_pipeline(node.clone(), inbound_rx, dispatch_tx));

        Ok((node, dispatch_rx))
    }

    pub fn self_id(&self) -> &NodeId {
        &self.self_id
    }

    pub fn peers(&self) -> &Arc<PeerTable> {
        &self.peers
    }

    /// Clock-corrected current time, per the clock-sync loop's local offset.
    pub fn corrected_now(&self) -> f64 {
        now_unix() + (self.clock_offset_millis.load(Ordering::Relaxed) as f64) / 1000.0
    }

    /// Registers a peer's address so outbound sends can reach it. Called
    /// when a `PEER_ANNOUNCE` is received, or for statically configured
    /// bootstrap peers.
    pub fn register_peer(&self, node_id: NodeId, node_name: String, ip: String, port: u16, public_key_hex: String) {
        if self.peers.len() >= self.config.max_peers && !self.peers.contains_key(&node_id) {
            warn!(%node_id, "max_peers reached, ignoring new peer");
            return;
        }
        let addr: Option<SocketAddr> = format!("{ip}:{port}").parse().ok();
        if let Some(addr) = addr {
            self.transport.ensure_connected(&node_id, addr);
        }
        self.peers
            .entry(node_id.clone())
            .and_modify(|p| p.touch())
            .or_insert_with(|| Peer::new(node_id, node_name, ip, port, public_key_hex));
    }

    fn route(&self, target: Option<&NodeId>, envelope: &Envelope) {
        let bytes = match serde_json::to_vec(envelope) {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "failed to serialize outbound envelope");
                return;
            }
        };
        match target {
            None => {
                // Broadcast: self-loopback plus every known peer.
                self.transport.send_self(bytes.clone());
                for entry in self.peers.iter() {
                    self.transport.send_to(entry.key(), bytes.clone());
                }
            }
            Some(node_id) if *node_id == self.self_id => self.transport.send_self(bytes),
            Some(node_id) => self.transport.send_to(node_id, bytes),
        }
    }

    /// Sign and broadcast `payload` to every known peer plus self. Send
    /// errors are logged inside the transport, never propagated here (§4.1).
    pub fn broadcast(&self, payload: MessagePayload) -> Envelope {
        let envelope = build_envelope(&self.identity, &self.self_id, payload);
        self.route(None, &envelope);
        envelope
    }

    pub fn send_to(&self, target: &NodeId, payload: MessagePayload) -> Envelope {
        let envelope = build_envelope(&self.identity, &self.self_id, payload);
        self.route(Some(target), &envelope);
        envelope
    }

    /// Broadcasts `payload` and waits for ACK quorum (§4.1, used for
    /// `JOB_CLAIM`). Returns `Ok(())` if quorum was reached within 2s, or
    /// `Err(QuorumFailed)` with the observed ack count otherwise.
    pub async fn broadcast_reliable(&self, payload: MessagePayload) -> Result<()> {
        let envelope = self.broadcast(payload);
        let required = quorum_size(self.peers.len());
        if required == 0 {
            return Ok(());
        }
        let acks = self
            .reliability
            .wait_for_quorum(&envelope.message_id, required)
            .await;
        if acks >= required {
            Ok(())
        } else {
            Err(NetworkError::QuorumFailed { acks, required })
        }
    }

    /// §4.1 discovery loop: announce self every `discovery_interval`.
    pub fn spawn_discovery_loop(self: &Arc<Self>, ip: String, port: u16) {
        let node = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(node.config.discovery_interval);
            loop {
                interval.tick().await;
                node.broadcast(MessagePayload::PeerAnnounce {
                    node_name: node.config.node_name.clone(),
                    ip: ip.clone(),
                    port,
                    capabilities: Vec::new(),
                    trust_score: None,
                    token_balance: None,
                });
            }
        });
    }

    /// §4.1 cleanup loop: evict stale seen-messages and stale peers.
    pub fn spawn_cleanup_loop(self: &Arc<Self>) {
        let node = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(node.config.cleanup_interval);
            loop {
                interval.tick().await;
                node.replay_guard.evict_expired();
                node.peers.retain(|_, peer| peer.last_seen.elapsed() < PEER_STALE_AFTER);
                node.pending_pings.retain(|_, sent_at| sent_at.elapsed() < node.config.health_interval * 3);
                trace!(seen = node.replay_guard.len(), peers = node.peers.len(), "cleanup tick");
            }
        });
    }

    /// §4.1 health loop: ping every peer, recording each `ping_id`'s send
    /// instant so the inbound pipeline can compute RTT when the matching
    /// `Pong` arrives.
    pub fn spawn_health_loop(self: &Arc<Self>) {
        let node = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(node.config.health_interval);
            loop {
                interval.tick().await;
                for entry in node.peers.iter() {
                    let ping_id = Uuid::new_v4().to_string();
                    node.pending_pings.insert(ping_id.clone(), Instant::now());
                    node.send_to(entry.key(), MessagePayload::Ping { ping_id });
                }
            }
        });
    }

    /// §4.1 clock-sync loop: every 5 minutes this would normally query every
    /// peer's clock and compute a median offset. The node crate's ping/pong
    /// round trip already gives a per-peer RTT; lacking an explicit
    /// `time_query`/`time_response` message type in §6's wire table, this
    /// loop is a narrow no-op hook that logs drift once RTT samples exist,
    /// rather than inventing an unspecified wire message.
    pub fn spawn_clock_sync_loop(self: &Arc<Self>) {
        let node = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(node.config.clock_sync_interval);
            loop {
                interval.tick().await;
                let max_rtt = node
                    .peers
                    .iter()
                    .filter_map(|p| p.rtt_p99())
                    .max();
                if let Some(rtt) = max_rtt {
                    if rtt > Duration::from_secs(5) {
                        warn!(?rtt, "p99 RTT exceeds 5s, possible clock/network skew");
                    }
                }
            }
        });
    }

    pub fn start_background_loops(self: &Arc<Self>, ip: String, port: u16) {
        self.spawn_discovery_loop(ip, port);
        self.spawn_cleanup_loop();
        self.spawn_health_loop();
        self.spawn_clock_sync_loop();
    }
}

async fn inbound_pipeline(
    node: Arc<GossipNode>,
    mut inbound_rx: mpsc::Receiver<Vec<u8>>,
    dispatch_tx: mpsc::Sender<InboundMessage>,
) {
    while let Some(bytes) = inbound_rx.recv().await {
        let envelope: Envelope = match serde_json::from_slice(&bytes) {
            Ok(e) => e,
            Err(e) => {
                debug!(error = %e, "dropping unparseable frame");
                continue;
            }
        };

        if !verify_envelope(&envelope) {
            warn!(node_id = %envelope.node_id, "dropping envelope with invalid signature");
            continue;
        }

        let now = node.corrected_now();
        if let Err(reason) =
            node.replay_guard
                .check_and_record(&envelope.message_id, &envelope.nonce, envelope.timestamp, now)
        {
            warn!(node_id = %envelope.node_id, %reason, "dropping envelope: replay check failed");
            continue;
        }

        let is_self = envelope.node_id == *node.self_id();
        if is_self && envelope.message_type != MessageType::JobBroadcast {
            // Self-receipt rule (§4.1): only our own JOB_BROADCAST is
            // processed so the submitter participates in its own auction;
            // every other self-origin message is a feedback loop.
            continue;
        }

        if !is_self && !node.rate_limiter.allow(&envelope.node_id) {
            if node.rate_limiter.is_blacklisted(&envelope.node_id) {
                // §4.1 step 5: three violations blacklist the sender and
                // drop it from the peer table, not just this one frame.
                if node.peers.remove(&envelope.node_id).is_some() {
                    warn!(node_id = %envelope.node_id, "peer blacklisted after repeated rate-limit violations, dropped");
                }
            } else {
                warn!(node_id = %envelope.node_id, "rate limit exceeded, dropping frame");
            }
            continue;
        }

        if !is_self {
            node.peers.entry(envelope.node_id.clone()).and_modify(|p| p.touch());
        }

        match &envelope.payload {
            MessagePayload::Ack { ack_message_id } => {
                node.reliability.record_ack(ack_message_id, &envelope.node_id);
            }
            MessagePayload::Pong { ping_id } => {
                if let Some((_, sent_at)) = node.pending_pings.remove(ping_id) {
                    node.peers.entry(envelope.node_id.clone()).and_modify(|p| p.record_rtt(sent_at.elapsed()));
                }
            }
            MessagePayload::Ping { ping_id } => {
                node.send_to(&envelope.node_id, MessagePayload::Pong { ping_id: ping_id.clone() });
            }
            _ => {}
        }

        if envelope.message_type.is_critical() {
            node.send_to(
                &envelope.node_id,
                MessagePayload::Ack {
                    ack_message_id: envelope.message_id.clone(),
                },
            );
        }

        if dispatch_tx
            .send(InboundMessage {
                from: envelope.node_id.clone(),
                public_key: envelope.public_key.clone(),
                payload: envelope.payload,
            })
            .await
            .is_err()
        {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn self_job_broadcast_is_dispatched() {
        let identity = SigningIdentity::generate();
        let (node, mut dispatch_rx) =
            GossipNode::bind("n1".into(), identity, GossipConfig::default())
                .await
                .unwrap();

        node.broadcast(MessagePayload::JobBroadcast {
            job: mesh_core::types::job::Job {
                job_id: "j1".into(),
                job_type: "shell".into(),
                priority: 0.5,
                payment: 10.0,
                deadline: 1000.0,
                requirements: Default::default(),
                payload: vec![],
                verify: false,
                verifiers: vec![],
                timestamp: now_unix(),
            },
        });

        let msg = tokio::time::timeout(Duration::from_secs(1), dispatch_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.from, "n1".to_string());
    }

    #[tokio::test]
    async fn self_ping_is_not_redispatched() {
        let identity = SigningIdentity::generate();
        let (node, mut dispatch_rx) =
            GossipNode::bind("n1".into(), identity, GossipConfig::default())
                .await
                .unwrap();

        node.broadcast(MessagePayload::Ping { ping_id: "p1".into() });
        // Also broadcast a job so we have something to wait on; the ping
        // must not show up ahead of it.
        node.broadcast(MessagePayload::JobBroadcast {
            job: mesh_core::types::job::Job {
                job_id: "j1".into(),
                job_type: "shell".into(),
                priority: 0.5,
                payment: 10.0,
                deadline: 1000.0,
                requirements: Default::default(),
                payload: vec![],
                verify: false,
                verifiers: vec![],
                timestamp: now_unix(),
            },
        });

        let msg = tokio::time::timeout(Duration::from_secs(1), dispatch_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(msg.payload, MessagePayload::JobBroadcast { .. }));
    }
}
