//! # velum-session
//!
//! Per-user encryption session lifecycle and the messaging facade the
//! transport layer talks to.
//!
//! This crate provides:
//! - [`EncryptionSession`]: initialize/enable/disable/reset, key rotation,
//!   legacy key migration, and encrypt/decrypt of wire messages
//! - A per-user state machine (`NoKeys -> Generating -> Ready`) with
//!   per-user serialization of multi-step mutations
//! - [`SessionConfig`]: environment-driven wiring of the SQLite backends
//! - The `velum-dm` binary, a JSON-output command line front end
//!
//! Key material never lives in this crate; it is held by the injected
//! [`velum_store::KeyPairStore`] and only passes through here.
//!
//! ## Example
//!
//! ```rust,ignore
//! use velum_session::{EncryptionSession, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = EncryptionSession::from_config(&SessionConfig::from_env()).await?;
//!
//!     let info = session.initialize("alice").await?;
//!     let message = session.encrypt_message("see you at 6", &info.public_key).await?;
//!     let plaintext = session.decrypt_message(&message, "alice").await?;
//!
//!     assert_eq!(plaintext, "see you at 6");
//!     Ok(())
//! }
//! ```
pub mod config;
pub mod session;

pub use config::{SessionConfig, DEFAULT_DB_PATH};
pub use session::{CurrentKeyInfo, EncryptionSession, ReadyMode, SessionState};

// Re-export the wire type the facade speaks
pub use velum_crypto::EncryptedMessage;
