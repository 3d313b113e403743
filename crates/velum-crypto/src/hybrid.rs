//! Hybrid message encryption and decryption.
//!
//! Every message is encrypted with a fresh random content key under
//! AES-256-GCM, and that content key is wrapped with the recipient's RSA
//! public key using OAEP/SHA-256. Wrapped key and AEAD output travel as a
//! single byte string:
//!
//! ```text
//! +--------------------------+--------------------------------------+
//! | wrapped content key      | AES-256-GCM ciphertext + tag         |
//! | (modulus bytes, e.g. 256)| (plaintext length + 16)              |
//! +--------------------------+--------------------------------------+
//! ```
//!
//! The split offset is always derived from the key in use, never from a
//! hard-coded byte count, so payloads stay parseable if the modulus size
//! ever changes.
//!
//! # Encryption Flow
//!
//! 1. Generate a random 32-byte content key and 12-byte nonce
//! 2. Encrypt the plaintext with AES-256-GCM
//! 3. Wrap the content key with the recipient's public key (OAEP)
//! 4. Concatenate wrapped key || ciphertext, zeroize the content key
//!
//! # Decryption Flow
//!
//! 1. Split at the private key's modulus size
//! 2. Unwrap the content key with the private key
//! 3. Decrypt the remainder with the content key and the supplied nonce
//!
//! Compromise of one message's content key exposes no other message; no
//! key material besides the long-lived keypair is ever persisted.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rsa::Oaep;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::cipher::{
    aes_gcm_decrypt, aes_gcm_encrypt, generate_content_key, generate_nonce, CONTENT_KEY_LEN,
    NONCE_LEN,
};
use crate::error::{CryptoError, CryptoResult};
use crate::keys::{PrivateKey, PublicKey};

/// Length in bytes of the reserved field in [`EncryptedPayload`].
pub const RESERVED_LEN: usize = 16;

/// A single encrypted message.
///
/// Produced by [`encrypt_message`] and immutable from then on. The
/// `reserved` field is all zeros in the public-key flow; it holds space
/// for a passphrase-derived key wrap variant and is not part of the wire
/// encoding.
#[derive(Clone, PartialEq)]
pub struct EncryptedPayload {
    /// Wrapped content key followed by the AEAD ciphertext with tag.
    pub wrapped_and_ciphertext: Vec<u8>,
    /// Nonce used for the AEAD encryption, fresh per message.
    pub nonce: [u8; NONCE_LEN],
    /// Extension slot for a passphrase-wrapped variant; zero here.
    pub reserved: [u8; RESERVED_LEN],
}

impl EncryptedPayload {
    /// Encode for transport as `{ciphertext, iv}` base64 strings.
    pub fn to_message(&self) -> EncryptedMessage {
        EncryptedMessage {
            ciphertext: STANDARD.encode(&self.wrapped_and_ciphertext),
            iv: STANDARD.encode(self.nonce),
        }
    }

    /// Decode from the transport form.
    ///
    /// Malformed base64 or a nonce of the wrong length is reported as
    /// [`CryptoError::Decryption`]; transport defects and cryptographic
    /// failures are indistinguishable to callers.
    pub fn from_message(message: &EncryptedMessage) -> CryptoResult<Self> {
        let wrapped_and_ciphertext = STANDARD
            .decode(&message.ciphertext)
            .map_err(|_| CryptoError::Decryption)?;
        let nonce_bytes = STANDARD
            .decode(&message.iv)
            .map_err(|_| CryptoError::Decryption)?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(CryptoError::Decryption);
        }
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&nonce_bytes);
        Ok(Self {
            wrapped_and_ciphertext,
            nonce,
            reserved: [0u8; RESERVED_LEN],
        })
    }
}

impl std::fmt::Debug for EncryptedPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedPayload")
            .field(
                "wrapped_and_ciphertext",
                &format_args!("{} bytes", self.wrapped_and_ciphertext.len()),
            )
            .field("nonce", &format_args!("{} bytes", self.nonce.len()))
            .finish()
    }
}

/// Wire form of an encrypted message.
///
/// `ciphertext` is base64 of wrapped key || AEAD output; `iv` is base64 of
/// the 12-byte nonce. This is the shape handed to the message transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptedMessage {
    pub ciphertext: String,
    pub iv: String,
}

/// Encrypt a message for a single recipient.
///
/// Generates a fresh content key and nonce for this message only, then
/// wraps the content key with the recipient's public key.
///
/// # Example
///
/// ```rust
/// use velum_crypto::{decrypt_message, encrypt_message, Keypair};
///
/// let bob = Keypair::generate().unwrap();
///
/// let payload = encrypt_message(b"see you at 6", &bob.public).unwrap();
/// let plaintext = decrypt_message(&payload, &bob.private).unwrap();
///
/// assert_eq!(plaintext, b"see you at 6");
/// ```
pub fn encrypt_message(
    plaintext: &[u8],
    recipient: &PublicKey,
) -> CryptoResult<EncryptedPayload> {
    let mut content_key = generate_content_key();
    let nonce = generate_nonce();

    let ciphertext = aes_gcm_encrypt(&content_key, &nonce, plaintext)?;

    let mut rng = rand::thread_rng();
    let wrapped = recipient
        .as_rsa()
        .encrypt(&mut rng, Oaep::new::<Sha256>(), &content_key)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    content_key.zeroize();

    let mut wrapped_and_ciphertext = wrapped;
    wrapped_and_ciphertext.extend_from_slice(&ciphertext);

    Ok(EncryptedPayload {
        wrapped_and_ciphertext,
        nonce,
        reserved: [0u8; RESERVED_LEN],
    })
}

/// Decrypt a message with the recipient's private key.
///
/// The payload is split at the private key's modulus size, the content
/// key unwrapped, and the remainder opened with AES-256-GCM.
///
/// # Errors
///
/// Every failure mode (payload shorter than the wrapped-key segment,
/// unwrap failure, wrong content-key length, authentication-tag mismatch)
/// returns the same [`CryptoError::Decryption`].
pub fn decrypt_message(
    payload: &EncryptedPayload,
    private_key: &PrivateKey,
) -> CryptoResult<Vec<u8>> {
    let wrapped_len = private_key.wrapped_key_len();
    if payload.wrapped_and_ciphertext.len() < wrapped_len {
        return Err(CryptoError::Decryption);
    }
    let (wrapped, ciphertext) = payload.wrapped_and_ciphertext.split_at(wrapped_len);

    let mut content_key_bytes = private_key
        .as_rsa()
        .decrypt(Oaep::new::<Sha256>(), wrapped)
        .map_err(|_| CryptoError::Decryption)?;

    if content_key_bytes.len() != CONTENT_KEY_LEN {
        content_key_bytes.zeroize();
        return Err(CryptoError::Decryption);
    }

    let mut content_key = [0u8; CONTENT_KEY_LEN];
    content_key.copy_from_slice(&content_key_bytes);
    content_key_bytes.zeroize();

    let result = aes_gcm_decrypt(&content_key, &payload.nonce, ciphertext);
    content_key.zeroize();

    result
}
