//! Shared data model and error handling for the compute mesh.
//!
//! Every subsystem crate (crypto, network, coordinator, reputation, node)
//! depends on this crate for the wire types they all need to agree on, so
//! they don't each invent their own copy and need lossy conversions at the
//! boundary.

pub mod error;
pub mod types;

pub use error::{CoreError, Result};
pub use types::{
    canonical_json_bytes, now_unix, Bid, Claim, Envelope, Job, JobStatus, MessageId, MessagePayload,
    MessageType, NodeId, Timestamp,
};
