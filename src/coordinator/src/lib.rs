//! Deterministic coordinator election and the starvation-free fairness
//! tracker (§4.2) that the compute mesh's auction protocol builds on.
//!
//! The coordinator itself is not authoritative for a job's winner — that is
//! always computed locally by every node from the bids it has observed
//! (`mesh-auction`). This crate only guarantees that, given the same
//! healthy-peer snapshot and job id, every node names the same coordinator,
//! and that coordinator duties rotate away from recently-busy nodes.

pub mod election;
pub mod error;
pub mod fairness;

pub use election::CoordinatorElection;
pub use error::{CoordinatorError, Result};
pub use fairness::{FairnessTracker, DEFAULT_STARVATION_THRESHOLD};
