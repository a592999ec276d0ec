//! Gossip transport for the compute mesh: a publish/subscribe fabric where
//! every node binds one inbound listener and connects one outbound stream to
//! every known peer, including itself (§4.1, §6).
//!
//! This crate owns the inbound security pipeline (signature verification,
//! replay rejection, rate limiting, ACK quorum) and the background loops
//! (discovery, cleanup, health/ping, clock sync). Everything above —
//! coordinator election, auction, wallet, reputation — consumes it through
//! `GossipNode` without knowing the wire framing underneath.

pub mod envelope_codec;
pub mod error;
pub mod gossip;
pub mod peer;
pub mod rate_limiter;
pub mod reliability;
pub mod replay_guard;
pub mod transport;

pub use envelope_codec::{build_envelope, verify_envelope};
pub use error::{NetworkError, Result};
pub use gossip::{GossipConfig, GossipNode, InboundMessage};
pub use peer::{healthy_node_ids, Peer, PeerTable, PEER_STALE_AFTER};
pub use rate_limiter::RateLimiter;
pub use reliability::{quorum_size, ReliabilityTracker};
pub use replay_guard::ReplayGuard;
pub use transport::Transport;
