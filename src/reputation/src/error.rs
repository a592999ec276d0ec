//! Error types for trust tracking and peer quarantine (§4.7).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReputationError>;

#[derive(Debug, Error)]
pub enum ReputationError {
    #[error("reputation score {0} out of range [0,1]")]
    InvalidScore(f64),

    #[error("reputation state io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("reputation state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReputationError {
    pub fn invalid_score(score: f64) -> Self {
        ReputationError::InvalidScore(score)
    }
}
