//! Error types shared by the key store and session layers.

use thiserror::Error;

/// Result type alias using velum's shared Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Shared error type for key store and session operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Cryptographic operation failed (wraps velum_crypto::CryptoError)
    #[error("Crypto error: {0}")]
    Crypto(#[from] velum_crypto::CryptoError),

    /// Storage backend read or write failed (wraps sqlx::Error)
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Stored key material no longer parses
    #[error("Corrupt key material: {0}")]
    Corrupt(String),

    /// Key pair not found
    #[error("Key pair not found: {0}")]
    KeyNotFound(uuid::Uuid),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Legacy key migration failed; the legacy entry is left in place
    #[error("Migration error: {0}")]
    Migration(String),

    /// Operation not valid in the current session state
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl Error {
    /// The undifferentiated decryption failure reported at the session
    /// boundary. Callers cannot tell a wrong key from tampered data.
    pub fn decryption() -> Self {
        Error::Crypto(velum_crypto::CryptoError::Decryption)
    }
}
