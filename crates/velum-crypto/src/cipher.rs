//! AES-256-GCM cipher operations.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;

use crate::error::{CryptoError, CryptoResult};

/// Length in bytes of a per-message content key (AES-256).
pub const CONTENT_KEY_LEN: usize = 32;

/// Length in bytes of an AES-GCM nonce.
pub const NONCE_LEN: usize = 12;

/// Length in bytes of the GCM authentication tag appended to ciphertext.
pub const TAG_LEN: usize = 16;

/// Generate cryptographically secure random bytes.
pub fn generate_random<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Generate a random content key (32 bytes).
pub fn generate_content_key() -> [u8; CONTENT_KEY_LEN] {
    generate_random()
}

/// Generate a random nonce (12 bytes).
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    generate_random()
}

/// Encrypt plaintext with AES-256-GCM.
///
/// Returns ciphertext with appended authentication tag (16 bytes).
pub fn aes_gcm_encrypt(
    key: &[u8; CONTENT_KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
) -> CryptoResult<Vec<u8>> {
    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let nonce = Nonce::from_slice(nonce);

    cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::Encryption("AES-GCM encryption failed".into()))
}

/// Decrypt ciphertext with AES-256-GCM.
///
/// The ciphertext must include the authentication tag (16 bytes) at the
/// end. Tag mismatch, wrong key, and wrong nonce all fail the same way.
pub fn aes_gcm_decrypt(
    key: &[u8; CONTENT_KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
) -> CryptoResult<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::Decryption)?;

    let nonce = Nonce::from_slice(nonce);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::Decryption)
}
