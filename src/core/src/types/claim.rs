use serde::{Deserialize, Serialize};

use super::NodeId;

/// A winner's claim on a job. Must be sent with reliable broadcast (ACK
/// quorum required) — see the network crate's `broadcast_reliable`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claim {
    pub job_id: String,
    pub winner_node_id: NodeId,
    pub backup_node_id: Option<NodeId>,
    pub stake_amount: f64,
    pub winning_score: f64,
}
