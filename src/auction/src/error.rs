//! Error types for bid scoring and the auction state machine (§4.3, §4.4).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuctionError>;

#[derive(Debug, Error)]
pub enum AuctionError {
    #[error("job {0} already has an auction in progress")]
    AlreadyAuctioning(String),

    #[error("no auction found for job {0}")]
    UnknownJob(String),

    #[error("could not stake for job {job_id}: {source}")]
    Stake {
        job_id: String,
        #[source]
        source: mesh_wallet::WalletError,
    },

    #[error("reliable broadcast of claim for job {0} failed to reach quorum")]
    ClaimQuorumFailed(String),
}
