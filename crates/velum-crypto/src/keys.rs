//! RSA keypair generation and transport encoding for message encryption.
//!
//! This module provides:
//! - Keypair generation using RSA-2048
//! - Public key export/import as base64-encoded SPKI DER
//! - Private key export/import as base64-encoded PKCS#8 DER
//!
//! # Security
//!
//! - Private key material is zeroized on drop
//! - Debug output never prints private key material
//! - Parameters are fixed (2048-bit modulus, OAEP, SHA-256) so any sender
//!   can wrap a content key for any recipient

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CryptoError, CryptoResult};

/// RSA modulus size used for every keypair, in bits.
///
/// Fixed for all participants; not caller-configurable. Wrapped-key
/// lengths are still always derived from the key at hand, never from
/// this constant.
pub const MODULUS_BITS: usize = 2048;

/// RSA public key used to wrap per-message content keys.
///
/// Public keys can be freely shared and are used by senders to encrypt
/// data that only the corresponding private key holder can decrypt.
#[derive(Clone, PartialEq)]
pub struct PublicKey(RsaPublicKey);

impl PublicKey {
    /// Encode as base64 of the SPKI DER form, the representation used for
    /// storage and for publication to the key directory.
    pub fn to_base64(&self) -> CryptoResult<String> {
        let der = self
            .0
            .to_public_key_der()
            .map_err(|e| CryptoError::KeyExport(e.to_string()))?;
        Ok(STANDARD.encode(der.as_bytes()))
    }

    /// Decode from base64-encoded SPKI DER.
    ///
    /// Fails with [`CryptoError::KeyImport`] on malformed base64 or on a
    /// blob that does not parse as an RSA public key.
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let der = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::KeyImport(e.to_string()))?;
        let key = RsaPublicKey::from_public_key_der(&der)
            .map_err(|e| CryptoError::KeyImport(e.to_string()))?;
        Ok(Self(key))
    }

    /// Length in bytes of a content key wrapped with this key.
    ///
    /// Equal to the modulus size in bytes; this is the split offset
    /// between the wrapped key and the AEAD ciphertext in a payload.
    pub fn wrapped_key_len(&self) -> usize {
        self.0.size()
    }

    /// Short hex fingerprint (SHA-256 of the modulus), for logs and
    /// key listings.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.n().to_bytes_be());
        hex::encode(&digest[..8])
    }

    pub(crate) fn as_rsa(&self) -> &RsaPublicKey {
        &self.0
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", self.fingerprint())
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let encoded = self.to_base64().map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&encoded)
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_base64(&s).map_err(serde::de::Error::custom)
    }
}

/// RSA private key with redacted debug output.
///
/// Private keys must be kept secret. The underlying key type zeroizes its
/// material when dropped. There is no `Serialize` impl; the only way out
/// of process is the explicit [`PrivateKey::to_base64`] export used by the
/// key store.
#[derive(Clone)]
pub struct PrivateKey(RsaPrivateKey);

impl PrivateKey {
    /// Encode as base64 of the PKCS#8 DER form, the representation used
    /// by the key store.
    pub fn to_base64(&self) -> CryptoResult<String> {
        let der = self
            .0
            .to_pkcs8_der()
            .map_err(|e| CryptoError::KeyExport(e.to_string()))?;
        Ok(STANDARD.encode(der.as_bytes()))
    }

    /// Decode from base64-encoded PKCS#8 DER.
    ///
    /// Fails with [`CryptoError::KeyImport`] on malformed base64 or on a
    /// blob that does not parse as an RSA private key. A public key blob
    /// is rejected here, not silently accepted.
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let der = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::KeyImport(e.to_string()))?;
        let key = RsaPrivateKey::from_pkcs8_der(&der)
            .map_err(|e| CryptoError::KeyImport(e.to_string()))?;
        Ok(Self(key))
    }

    /// Derive the corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.to_public_key())
    }

    /// Length in bytes of a content key wrapped for this key.
    ///
    /// Equal to the modulus size in bytes; payloads are split at this
    /// offset before unwrapping.
    pub fn wrapped_key_len(&self) -> usize {
        self.0.size()
    }

    pub(crate) fn as_rsa(&self) -> &RsaPrivateKey {
        &self.0
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// RSA keypair for hybrid message encryption.
#[derive(Clone)]
pub struct Keypair {
    /// The public key (can be shared).
    pub public: PublicKey,
    /// The private key (must be kept secret).
    pub private: PrivateKey,
}

impl Keypair {
    /// Generate a new random 2048-bit keypair.
    ///
    /// Uses a cryptographically secure random number generator. RNG or
    /// engine failure is fatal to setup and surfaces as
    /// [`CryptoError::KeyGeneration`].
    pub fn generate() -> CryptoResult<Self> {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, MODULUS_BITS)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let public = PublicKey(private.to_public_key());
        Ok(Self {
            public,
            private: PrivateKey(private),
        })
    }

    /// Create a keypair from an existing private key.
    pub fn from_private(private: PrivateKey) -> Self {
        let public = private.public_key();
        Self { public, private }
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &self.public)
            .field("private", &"[REDACTED]")
            .finish()
    }
}
