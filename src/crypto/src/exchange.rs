//! X25519 encryption keypair. Every node persists one alongside its Ed25519
//! signing identity (§3); the coordination layer itself only ever signs
//! traffic (never encrypts it), so this is currently exercised only by key
//! generation/persistence/the shared-secret primitive, not by the gossip
//! transport's wire format. It exists so an encrypted-channel transport can
//! be dropped in later without changing node identity or key storage.

use rand::rngs::OsRng;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

#[derive(Clone)]
pub struct EncryptionIdentity {
    secret: StaticSecret,
}

impl EncryptionIdentity {
    pub fn generate() -> Self {
        Self {
            secret: StaticSecret::random_from_rng(OsRng),
        }
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self {
            secret: StaticSecret::from(bytes),
        }
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from(&self.secret)
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key().to_bytes())
    }

    /// Diffie-Hellman shared secret with a peer's public key.
    pub fn diffie_hellman(&self, peer_public: &PublicKey) -> [u8; 32] {
        self.secret.diffie_hellman(peer_public).to_bytes()
    }
}

/// One-shot ephemeral secret, for callers that don't need a persisted
/// identity (kept for parity with the static form above; unused by the node
/// binary today).
pub fn ephemeral_public_key() -> (EphemeralSecret, PublicKey) {
    let secret = EphemeralSecret::random_from_rng(OsRng);
    let public = PublicKey::from(&secret);
    (secret, public)
}
