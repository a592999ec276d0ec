//! Error types for the gossip transport.
//!
//! Per §7, transient network and invalid-message errors never propagate as
//! exceptions across the gossip boundary — they are logged and the frame is
//! dropped. This enum exists for the layers that do need to observe failure
//! explicitly (`send`, `broadcast_reliable`, config validation).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, NetworkError>;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("transport io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unknown peer: {0}")]
    UnknownPeer(String),

    #[error("replay rejected: {0}")]
    Replay(String),

    #[error("rate limit exceeded for {0}")]
    RateLimited(String),

    #[error("quorum not reached: {acks}/{required} acks within timeout")]
    QuorumFailed { acks: usize, required: usize },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),
}

impl NetworkError {
    pub fn unknown_peer<S: Into<String>>(node_id: S) -> Self {
        NetworkError::UnknownPeer(node_id.into())
    }

    pub fn replay<S: Into<String>>(reason: S) -> Self {
        NetworkError::Replay(reason.into())
    }

    pub fn rate_limited<S: Into<String>>(node_id: S) -> Self {
        NetworkError::RateLimited(node_id.into())
    }

    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        NetworkError::Configuration(msg.into())
    }
}
