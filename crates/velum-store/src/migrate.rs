//! One-way migration of legacy key material into the key-pair store.

use std::sync::Arc;

use tracing::{debug, info};

use velum_core::{Error, Result};
use velum_crypto::{Keypair, PrivateKey, PublicKey};

use crate::key_pairs::{KeyPairRecord, KeyPairStore};
use crate::legacy::LegacyKeyStore;

/// Converts keys found in legacy storage into stored key pairs, then erases
/// the legacy copies.
pub struct LegacyKeyMigrator {
    legacy: Arc<dyn LegacyKeyStore>,
    store: Arc<dyn KeyPairStore>,
}

impl LegacyKeyMigrator {
    /// Create a migrator over the given legacy source and key-pair store.
    pub fn new(legacy: Arc<dyn LegacyKeyStore>, store: Arc<dyn KeyPairStore>) -> Self {
        Self { legacy, store }
    }

    /// Migrate any legacy key material for `user_id`, returning the number
    /// of key pairs migrated (0 or 1; legacy storage held at most one pair
    /// per user).
    ///
    /// Malformed legacy data is reported as `Error::Migration` with the
    /// legacy entry left untouched and no partial record written. Safe to
    /// call repeatedly: once migrated, or when there is nothing to migrate,
    /// this is a no-op returning 0.
    pub async fn migrate(&self, user_id: &str) -> Result<u32> {
        let legacy = match self.legacy.fetch(user_id).await? {
            Some(record) => record,
            None => {
                debug!(
                    subsystem = "keystore",
                    component = "migrator",
                    op = "migrate",
                    user_id,
                    "No legacy key material"
                );
                return Ok(0);
            }
        };

        // Import both halves before writing anything.
        let public = PublicKey::from_base64(&legacy.raw_public)
            .map_err(|e| Error::Migration(format!("legacy public key for '{user_id}': {e}")))?;
        let private = PrivateKey::from_base64(&legacy.raw_private)
            .map_err(|e| Error::Migration(format!("legacy private key for '{user_id}': {e}")))?;

        if private.public_key() != public {
            return Err(Error::Migration(format!(
                "legacy key halves for '{user_id}' do not match"
            )));
        }

        // A stored pair with this public key means an earlier run got as far
        // as the put; only the legacy erase is left to redo.
        let existing = self.store.list_all(user_id).await?;
        if existing.iter().any(|r| r.public == public) {
            self.legacy.remove(user_id).await?;
            debug!(
                subsystem = "keystore",
                component = "migrator",
                op = "migrate",
                user_id,
                "Legacy key already stored; completed erase only"
            );
            return Ok(0);
        }

        let record = KeyPairRecord::new(user_id, Keypair { public, private });
        let stored = self.store.put(record).await?;

        // Legacy storage assumed a single key, so the migrated pair becomes
        // the current one.
        self.store.mark_current(user_id, stored.key_id).await?;
        self.legacy.remove(user_id).await?;

        info!(
            subsystem = "keystore",
            component = "migrator",
            op = "migrate",
            user_id,
            key_id = %stored.key_id,
            fingerprint = %stored.public.fingerprint(),
            migrated_count = 1u32,
            "Migrated legacy key material"
        );
        Ok(1)
    }
}
