//! Bid scoring and the three-phase bid/claim/grace auction protocol
//! (§4.3, §4.4). Every node runs the same state machine per `(self, job_id)`
//! and reaches the same winner by determinism; the claim, grace period, and
//! tiebreak rules guarantee uniqueness under message loss and reordering.

pub mod auction;
pub mod error;
pub mod scorer;

pub use auction::{AuctionConfig, AuctionManager, AuctionOutcome, AuctionState};
pub use error::{AuctionError, Result};
pub use scorer::{BidScorer, FairnessAdvisor, NoOpFairnessAdvisor, ResourceLoad};
