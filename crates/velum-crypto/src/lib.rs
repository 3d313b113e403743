//! # velum-crypto
//!
//! Cryptographic primitives for velum direct messaging.
//!
//! This crate provides hybrid message encryption: every message is
//! protected with a fresh symmetric content key, and that key is wrapped
//! with the recipient's public key. Senders only need the recipient's
//! published public key string; no passphrase exchange is involved.
//!
//! ## Cryptographic Primitives
//!
//! - **Key wrap**: RSA-2048 with OAEP padding (SHA-256)
//! - **Symmetric cipher**: AES-256-GCM (AEAD)
//! - **Key transport encoding**: base64 of SPKI DER (public) and
//!   PKCS#8 DER (private)
//! - **Random generation**: OS-seeded CSPRNG
//!
//! ## Payload Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │ Wrapped content key (modulus bytes)             │
//! ├─────────────────────────────────────────────────┤
//! │ AES-256-GCM ciphertext + 16-byte tag            │
//! └─────────────────────────────────────────────────┘
//!   + 12-byte nonce, carried alongside as `iv`
//! ```
//!
//! The wrapped-key segment length is derived from the key in use (the
//! modulus size in bytes), never hard-coded.
//!
//! ## Examples
//!
//! ### Generate a Keypair
//!
//! ```rust
//! use velum_crypto::Keypair;
//!
//! let keypair = Keypair::generate().unwrap();
//! let published = keypair.public.to_base64().unwrap();
//! println!("public key: {published}");
//! ```
//!
//! ### Encrypt and Decrypt a Message
//!
//! ```rust
//! use velum_crypto::{decrypt_message, encrypt_message, Keypair, PublicKey};
//!
//! let bob = Keypair::generate().unwrap();
//!
//! // The sender imports Bob's published key string
//! let bob_public = PublicKey::from_base64(&bob.public.to_base64().unwrap()).unwrap();
//!
//! let payload = encrypt_message(b"lunch at noon?", &bob_public).unwrap();
//! let wire = payload.to_message();
//!
//! // Bob decrypts from the wire form
//! let parsed = velum_crypto::EncryptedPayload::from_message(&wire).unwrap();
//! let plaintext = decrypt_message(&parsed, &bob.private).unwrap();
//! assert_eq!(plaintext, b"lunch at noon?");
//! ```

pub mod cipher;
pub mod error;
pub mod hybrid;
pub mod keys;

// Re-export commonly used types
pub use cipher::{CONTENT_KEY_LEN, NONCE_LEN, TAG_LEN};
pub use error::{CryptoError, CryptoResult};
pub use hybrid::{
    decrypt_message, encrypt_message, EncryptedMessage, EncryptedPayload, RESERVED_LEN,
};
pub use keys::{Keypair, PrivateKey, PublicKey, MODULUS_BITS};
