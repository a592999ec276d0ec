//! Outbound/inbound envelope pipeline (§4.1, §6): build + sign a message on
//! the way out; parse + verify on the way in. Transport-agnostic — the
//! framing itself lives in `transport`.

use mesh_core::{now_unix, Envelope, MessagePayload, NodeId};
use mesh_crypto::{verify_canonical, SigningIdentity};
use rand::RngCore;
use uuid::Uuid;

/// Builds and signs an envelope for `payload`, originating from this node.
pub fn build_envelope(identity: &SigningIdentity, node_id: &NodeId, payload: MessagePayload) -> Envelope {
    let mut nonce_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let mut envelope = Envelope {
        message_type: payload.message_type(),
        node_id: node_id.clone(),
        timestamp: now_unix(),
        message_id: Uuid::new_v4().to_string(),
        nonce: hex::encode(nonce_bytes),
        signature: String::new(),
        public_key: identity.public_key_hex(),
        payload,
    };

    // Sign the canonical form with signature/public_key excluded, then
    // attach them (§6).
    let signable = envelope.signable_fields();
    let signature = identity
        .sign_canonical(&signable)
        .expect("canonical serialization of an envelope's own fields cannot fail");
    envelope.signature = signature;
    envelope
}

/// Verifies an inbound envelope's signature against its own declared public
/// key. Does not check replay/rate-limit state — that's the caller's job.
pub fn verify_envelope(envelope: &Envelope) -> bool {
    let signable = envelope.signable_fields();
    verify_canonical(&signable, &envelope.signature, &envelope.public_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_and_verifies() {
        let identity = SigningIdentity::generate();
        let envelope = build_envelope(
            &identity,
            &"node-a".to_string(),
            MessagePayload::Ping {
                ping_id: "p1".into(),
            },
        );
        assert!(verify_envelope(&envelope));
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let identity = SigningIdentity::generate();
        let mut envelope = build_envelope(
            &identity,
            &"node-a".to_string(),
            MessagePayload::Ping {
                ping_id: "p1".into(),
            },
        );
        envelope.payload = MessagePayload::Ping {
            ping_id: "tampered".into(),
        };
        assert!(!verify_envelope(&envelope));
    }
}
