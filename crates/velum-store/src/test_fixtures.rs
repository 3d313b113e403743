//! Test fixtures for key-store tests.
//!
//! Provides process-wide cached RSA key pairs so individual tests do not pay
//! the generation cost repeatedly (2048-bit generation is slow in debug
//! builds).
// Note: Always compiled so integration tests (in tests/) can use the fixtures.

use std::sync::OnceLock;

use velum_crypto::Keypair;

use crate::key_pairs::KeyPairRecord;

static KEYPAIRS: [OnceLock<Keypair>; 4] = [
    OnceLock::new(),
    OnceLock::new(),
    OnceLock::new(),
    OnceLock::new(),
];

/// A cached RSA key pair for tests. `slot` (0..4) selects one of four
/// distinct pairs; the same slot always returns the same material within a
/// process.
pub fn test_keypair(slot: usize) -> Keypair {
    KEYPAIRS[slot]
        .get_or_init(|| Keypair::generate().expect("Failed to generate test key pair"))
        .clone()
}

/// A fresh record for `user_id` backed by the cached pair in `slot`.
pub fn test_record(user_id: &str, slot: usize) -> KeyPairRecord {
    KeyPairRecord::new(user_id, test_keypair(slot))
}
