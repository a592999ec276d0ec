//! Node identity and signing primitives for the compute mesh.
//!
//! Every node owns an Ed25519 signing keypair (persisted) and an X25519
//! encryption keypair (§3). This crate is the sole place that does key
//! generation, canonical-JSON signing/verification, and the SHA-256 hash
//! used by deterministic coordinator election (§4.2).

pub mod error;
pub mod exchange;
pub mod hash;
pub mod keys;
pub mod signing;

pub use error::{CryptoError, Result};
pub use exchange::EncryptionIdentity;
pub use hash::{content_id_hex, job_id_hash_u32};
pub use keys::{load_or_generate_encryption_key, load_or_generate_signing_key};
pub use signing::{verify_canonical, SigningIdentity};
