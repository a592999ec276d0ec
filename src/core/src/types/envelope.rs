use serde::{Deserialize, Serialize};

use super::{MessagePayload, MessageType, NodeId, Timestamp};

/// Wire envelope carried by every message on the gossip fabric. Signing
/// covers the canonical form of everything except `signature` and
/// `public_key` themselves (those are re-inserted after signing).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub node_id: NodeId,
    pub timestamp: Timestamp,
    pub message_id: String,
    /// Hex-encoded 16 random bytes.
    pub nonce: String,
    /// Base64 of an Ed25519 signature over the canonical payload.
    pub signature: String,
    /// Hex-encoded 32-byte Ed25519 public key.
    pub public_key: String,
    pub payload: MessagePayload,
}

impl Envelope {
    /// Fields that participate in the signature, as a canonical, sorted map.
    /// `signature` and `public_key` are deliberately excluded.
    pub fn signable_fields(&self) -> serde_json::Value {
        serde_json::json!({
            "type": self.message_type,
            "node_id": self.node_id,
            "timestamp": self.timestamp,
            "message_id": self.message_id,
            "nonce": self.nonce,
            "payload": self.payload,
        })
    }
}
