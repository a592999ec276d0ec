//! Node-level error type (§7): wraps the subsystem errors a `MeshNode` can
//! surface during startup. Runtime errors inside background tasks are
//! logged at the point of occurrence and never unwind past the task
//! boundary, per §7's error handling design.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, NodeError>;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("crypto error: {0}")]
    Crypto(#[from] mesh_crypto::CryptoError),

    #[error("network error: {0}")]
    Network(#[from] mesh_network::NetworkError),

    #[error("wallet error: {0}")]
    Wallet(#[from] mesh_wallet::WalletError),

    #[error("reputation error: {0}")]
    Reputation(#[from] mesh_reputation::ReputationError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl NodeError {
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        NodeError::Configuration(msg.into())
    }
}
