//! Ed25519 node identity: signing keypair, canonical-JSON signing, and
//! signature verification against a declared public key.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey, Signature};
use mesh_core::canonical_json_bytes;
use rand::rngs::OsRng;
use serde::Serialize;

use crate::error::{CryptoError, Result};

/// A node's persisted Ed25519 identity.
#[derive(Clone)]
pub struct SigningIdentity {
    signing_key: SigningKey,
}

impl SigningIdentity {
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(bytes),
        }
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Hex-encoded 32-byte public key, as carried on the wire envelope.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.verifying_key().to_bytes())
    }

    /// Sign the canonical JSON form of `value` (with `signature`/`public_key`
    /// fields excluded by the caller before calling this). Returns a
    /// base64-encoded signature, matching the wire format.
    pub fn sign_canonical<T: Serialize>(&self, value: &T) -> Result<String> {
        let bytes = canonical_json_bytes(value)
            .map_err(|e| CryptoError::invalid_key(format!("canonicalize for signing: {e}")))?;
        let signature: Signature = self.signing_key.sign(&bytes);
        Ok(base64_encode(&signature.to_bytes()))
    }
}

/// Verify a base64 signature over the canonical JSON form of `value` against
/// a hex-encoded 32-byte public key. Returns `false` (never errors) for any
/// malformed input, matching the "drop if invalid" inbound pipeline rule.
pub fn verify_canonical<T: Serialize>(value: &T, signature_b64: &str, public_key_hex: &str) -> bool {
    let Ok(bytes) = canonical_json_bytes(value) else {
        return false;
    };
    let Some(sig_bytes) = base64_decode(signature_b64) else {
        return false;
    };
    let Ok(sig_array): std::result::Result<[u8; 64], _> = sig_bytes.try_into() else {
        return false;
    };
    let signature = Signature::from_bytes(&sig_array);
    let Some(pk_bytes) = hex::decode(public_key_hex).ok() else {
        return false;
    };
    let Ok(pk_array): std::result::Result<[u8; 32], _> = pk_bytes.try_into() else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&pk_array) else {
        return false;
    };
    verifying_key.verify(&bytes, &signature).is_ok()
}

/// Standard alphabet, with padding — the encoding signatures travel as on
/// the wire (§6).
fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn base64_decode(s: &str) -> Option<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(s).ok()
}
