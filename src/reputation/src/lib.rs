//! Trust tracking and peer quarantine for the compute mesh (§4.7).
//!
//! Each node holds a [`tracker::ReputationTracker`] for its own trust score
//! and its view of every peer it has dealt with, and a [`watchdog::Watchdog`]
//! that scans the peer table every 10s and escalates repeat offenders into
//! quarantine independently of the slower trust-crossing path.

pub mod error;
pub mod tracker;
pub mod watchdog;

pub use error::{ReputationError, Result};
pub use tracker::{
    PeerOutcome, ReputationEvent, ReputationTracker, SelfOutcome, MIN_TRUST, QUARANTINE_THRESHOLD,
    REHAB_JOBS_REQUIRED, REHAB_TRUST_THRESHOLD, STARTING_TRUST,
};
pub use watchdog::{Watchdog, FAILURES_BEFORE_QUARANTINE, SCAN_INTERVAL};
