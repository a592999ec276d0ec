//! Persistence for a node's signing + encryption keypairs, per §6: "signing
//! key (Ed25519 raw bytes, base64 JSON), encryption key".

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, Result};
use crate::exchange::EncryptionIdentity;
use crate::signing::SigningIdentity;

#[derive(Serialize, Deserialize)]
struct PersistedKey {
    /// Base64-encoded 32 raw key bytes.
    key_b64: String,
}

fn write_key(path: &Path, raw: &[u8; 32]) -> Result<()> {
    use base64::Engine;
    let encoded = PersistedKey {
        key_b64: base64::engine::general_purpose::STANDARD.encode(raw),
    };
    let json = serde_json::to_string_pretty(&encoded)?;
    std::fs::write(path, json)?;
    Ok(())
}

fn read_key(path: &Path) -> Result<[u8; 32]> {
    use base64::Engine;
    let contents = std::fs::read_to_string(path)?;
    let decoded: PersistedKey = serde_json::from_str(&contents)?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(&decoded.key_b64)
        .map_err(|e| CryptoError::invalid_key(format!("key file {path:?} not valid base64: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| CryptoError::invalid_key(format!("key file {path:?} is not 32 bytes")))
}

/// Load a node's Ed25519 signing identity from `path`, generating and
/// persisting a fresh one if the file doesn't exist.
pub fn load_or_generate_signing_key(path: &Path) -> Result<SigningIdentity> {
    if path.exists() {
        let bytes = read_key(path)?;
        Ok(SigningIdentity::from_bytes(&bytes))
    } else {
        let identity = SigningIdentity::generate();
        write_key(path, &identity.to_bytes())?;
        Ok(identity)
    }
}

/// Load a node's X25519 encryption identity from `path`, generating and
/// persisting a fresh one if the file doesn't exist.
pub fn load_or_generate_encryption_key(path: &Path) -> Result<EncryptionIdentity> {
    if path.exists() {
        let bytes = read_key(path)?;
        Ok(EncryptionIdentity::from_bytes(bytes))
    } else {
        let identity = EncryptionIdentity::generate();
        write_key(path, &identity.to_bytes())?;
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile_shim::NamedTempPath;

    // A tiny local stand-in for a temp-file helper, since this crate has no
    // other use for the `tempfile` crate.
    mod tempfile_shim {
        use std::path::{Path, PathBuf};

        pub struct NamedTempPath {
            path: PathBuf,
        }

        impl NamedTempPath {
            pub fn new(label: &str) -> Self {
                let mut path = std::env::temp_dir();
                path.push(format!(
                    "mesh-crypto-test-{label}-{}-{}.json",
                    std::process::id(),
                    std::time::SystemTime::now()
                        .duration_since(std::time::UNIX_EPOCH)
                        .unwrap()
                        .as_nanos()
                ));
                Self { path }
            }

            pub fn path(&self) -> &Path {
                &self.path
            }
        }

        impl Drop for NamedTempPath {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.path);
            }
        }
    }

    #[test]
    fn generates_and_reloads_signing_key() {
        let tmp = NamedTempPath::new("signing");
        let first = load_or_generate_signing_key(tmp.path()).unwrap();
        let second = load_or_generate_signing_key(tmp.path()).unwrap();
        assert_eq!(first.public_key_hex(), second.public_key_hex());
    }

    #[test]
    fn generates_and_reloads_encryption_key() {
        let tmp = NamedTempPath::new("encryption");
        let first = load_or_generate_encryption_key(tmp.path()).unwrap();
        let second = load_or_generate_encryption_key(tmp.path()).unwrap();
        assert_eq!(first.public_key_hex(), second.public_key_hex());
    }
}
