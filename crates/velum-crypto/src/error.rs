//! Error types for cryptographic operations.

use thiserror::Error;

/// Cryptographic operation errors.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Key pair generation failed in the RNG or RSA engine.
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// Key material could not be parsed from its transport encoding.
    #[error("Key import failed: {0}")]
    KeyImport(String),

    /// Key material could not be serialized to its transport encoding.
    #[error("Key export failed: {0}")]
    KeyExport(String),

    /// Encryption failed in the wrap or AEAD step.
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed.
    ///
    /// Wrong key, truncated or corrupted payload, and authentication-tag
    /// mismatch are all reported identically.
    #[error("Decryption failed")]
    Decryption,
}

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
