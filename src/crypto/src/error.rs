//! Error types for the cryptography module.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CryptoError>;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("signature verification failed: {0}")]
    SignatureVerification(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid signature encoding: {0}")]
    InvalidSignature(String),

    #[error("key storage error: {0}")]
    Storage(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CryptoError {
    pub fn key_generation<S: Into<String>>(msg: S) -> Self {
        CryptoError::KeyGeneration(msg.into())
    }

    pub fn invalid_key<S: Into<String>>(msg: S) -> Self {
        CryptoError::InvalidKey(msg.into())
    }

    pub fn invalid_signature<S: Into<String>>(msg: S) -> Self {
        CryptoError::InvalidSignature(msg.into())
    }

    pub fn storage<S: Into<String>>(msg: S) -> Self {
        CryptoError::Storage(msg.into())
    }
}
