//! Message types carried inside the gossip envelope (§6 of the spec).

use serde::{Deserialize, Serialize};

use super::{Bid, Claim, Job, NodeId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    PeerAnnounce,
    PeerGoodbye,
    JobBroadcast,
    JobBid,
    AuctionCoordinate,
    JobClaim,
    JobHeartbeat,
    JobResult,
    ReputationUpdate,
    TokenTransaction,
    Ping,
    Pong,
    Ack,
}

impl MessageType {
    /// Critical messages require a receiver-side ACK (§4.1 inbound pipeline,
    /// step 8).
    pub fn is_critical(self) -> bool {
        matches!(self, MessageType::JobClaim | MessageType::JobResult)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Success,
    Failure,
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePayload {
    PeerAnnounce {
        node_name: String,
        ip: String,
        port: u16,
        #[serde(default)]
        capabilities: Vec<String>,
        #[serde(default)]
        trust_score: Option<f64>,
        #[serde(default)]
        token_balance: Option<f64>,
    },
    PeerGoodbye {},
    JobBroadcast {
        #[serde(flatten)]
        job: Job,
    },
    JobBid {
        #[serde(flatten)]
        bid: Bid,
    },
    AuctionCoordinate {
        job_id: String,
        coordinator_id: NodeId,
        bid_deadline: f64,
    },
    JobClaim {
        #[serde(flatten)]
        claim: Claim,
    },
    JobHeartbeat {
        job_id: String,
        /// In [0, 1].
        progress: f64,
    },
    JobResult {
        job_id: String,
        status: JobStatus,
        duration: f64,
        #[serde(default)]
        output: Option<Vec<u8>>,
        #[serde(default)]
        error: Option<String>,
    },
    ReputationUpdate {
        subject_node_id: NodeId,
        new_score: f64,
        reason: String,
        event: String,
    },
    TokenTransaction {
        from_node: NodeId,
        to_node: NodeId,
        amount: f64,
        reason: String,
        #[serde(default)]
        job_id: Option<String>,
    },
    Ping {
        ping_id: String,
    },
    Pong {
        ping_id: String,
    },
    Ack {
        ack_message_id: String,
    },
}

impl MessagePayload {
    pub fn message_type(&self) -> MessageType {
        match self {
            MessagePayload::PeerAnnounce { .. } => MessageType::PeerAnnounce,
            MessagePayload::PeerGoodbye { .. } => MessageType::PeerGoodbye,
            MessagePayload::JobBroadcast { .. } => MessageType::JobBroadcast,
            MessagePayload::JobBid { .. } => MessageType::JobBid,
            MessagePayload::AuctionCoordinate { .. } => MessageType::AuctionCoordinate,
            MessagePayload::JobClaim { .. } => MessageType::JobClaim,
            MessagePayload::JobHeartbeat { .. } => MessageType::JobHeartbeat,
            MessagePayload::JobResult { .. } => MessageType::JobResult,
            MessagePayload::ReputationUpdate { .. } => MessageType::ReputationUpdate,
            MessagePayload::TokenTransaction { .. } => MessageType::TokenTransaction,
            MessagePayload::Ping { .. } => MessageType::Ping,
            MessagePayload::Pong { .. } => MessageType::Pong,
            MessagePayload::Ack { .. } => MessageType::Ack,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_messages_require_ack() {
        assert!(MessageType::JobClaim.is_critical());
        assert!(MessageType::JobResult.is_critical());
        assert!(!MessageType::Ping.is_critical());
    }

    #[test]
    fn payload_roundtrips_through_json() {
        let payload = MessagePayload::Ack {
            ack_message_id: "abc".into(),
        };
        let json = serde_json::to_string(&payload).unwrap();
        let back: MessagePayload = serde_json::from_str(&json).unwrap();
        assert_eq!(payload, back);
        assert_eq!(back.message_type(), MessageType::Ack);
    }
}
