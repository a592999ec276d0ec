//! Error types for the wallet and its signed ledger (§4.6).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WalletError>;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("amount must be strictly positive, got {0}")]
    InvalidAmount(f64),

    #[error("insufficient stake for job {job_id}: have {have}, requested {requested}")]
    InsufficientStake {
        job_id: String,
        have: f64,
        requested: f64,
    },

    #[error("ledger io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ledger serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WalletError {
    pub fn invalid_amount(amount: f64) -> Self {
        WalletError::InvalidAmount(amount)
    }

    pub fn insufficient_stake<S: Into<String>>(job_id: S, have: f64, requested: f64) -> Self {
        WalletError::InsufficientStake {
            job_id: job_id.into(),
            have,
            requested,
        }
    }
}
