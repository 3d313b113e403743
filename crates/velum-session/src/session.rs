//! Per-user encryption session lifecycle and messaging facade.
//!
//! [`EncryptionSession`] is the surface the message transport talks to. It
//! owns no key material itself; key pairs live in an injected
//! [`KeyPairStore`], public keys are announced through an injected
//! [`KeyDirectory`], and an optional [`LegacyKeyStore`] feeds one-way
//! migration of flat-file keys.
//!
//! Each user moves through `NoKeys -> Generating -> Ready(Enabled|Disabled)`
//! and back to `NoKeys` on reset. Multi-step mutations for the same user
//! (initialize, rotate, reset, migrate) are serialized by a per-user async
//! mutex so concurrent callers cannot race the current-pair marker.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use velum_core::{Error, Result};
use velum_crypto::{EncryptedMessage, EncryptedPayload, Keypair, PublicKey};
use velum_store::{
    FsLegacyKeyStore, KeyDirectory, KeyPairRecord, KeyPairStore, KeyPairSummary,
    LegacyKeyMigrator, LegacyKeyStore, SqliteKeyDirectory, SqliteKeyPairStore,
};

use crate::config::SessionConfig;

/// Whether a ready session is actively encrypting outbound messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadyMode {
    /// Keys stored and encryption switched on.
    Enabled,
    /// Keys stored but encryption switched off (the state after a restart).
    Disabled,
}

/// Lifecycle state of a user's encryption session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No key pairs stored for this user.
    NoKeys,
    /// Key generation in flight.
    Generating,
    /// At least one key pair stored.
    Ready(ReadyMode),
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoKeys => write!(f, "no_keys"),
            Self::Generating => write!(f, "generating"),
            Self::Ready(ReadyMode::Enabled) => write!(f, "ready_enabled"),
            Self::Ready(ReadyMode::Disabled) => write!(f, "ready_disabled"),
        }
    }
}

/// Identity of a user's current key pair, returned by `initialize` and
/// `rotate`. Carries only public material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentKeyInfo {
    pub key_id: Uuid,
    pub public_key: String,
}

/// Encryption session facade over injected key storage and directory
/// backends.
pub struct EncryptionSession {
    store: Arc<dyn KeyPairStore>,
    directory: Arc<dyn KeyDirectory>,
    migrator: Option<LegacyKeyMigrator>,
    states: RwLock<HashMap<String, SessionState>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl EncryptionSession {
    /// Create a session over the given key store and directory, with no
    /// legacy migration source.
    pub fn new(store: Arc<dyn KeyPairStore>, directory: Arc<dyn KeyDirectory>) -> Self {
        Self {
            store,
            directory,
            migrator: None,
            states: RwLock::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Attach a legacy key store; `initialize` and `migrate_legacy_keys`
    /// will recover flat-file keys from it.
    pub fn with_legacy(mut self, legacy: Arc<dyn LegacyKeyStore>) -> Self {
        self.migrator = Some(LegacyKeyMigrator::new(legacy, Arc::clone(&self.store)));
        self
    }

    /// Build a SQLite-backed session from configuration, opening (or
    /// creating) the key database and wiring the flat-file legacy store if
    /// one is configured.
    pub async fn from_config(config: &SessionConfig) -> Result<Self> {
        let pool = velum_store::connect(&config.db_path).await?;
        let store = Arc::new(SqliteKeyPairStore::new(pool.clone()));
        let directory = Arc::new(SqliteKeyDirectory::new(pool));

        let mut session = Self::new(store, directory);
        if let Some(dir) = &config.legacy_dir {
            session = session.with_legacy(Arc::new(FsLegacyKeyStore::new(dir)));
        }
        Ok(session)
    }

    /// Lock guarding multi-step mutations for one user.
    async fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn set_state(&self, user_id: &str, state: SessionState) {
        self.states.write().await.insert(user_id.to_string(), state);
    }

    /// Current state, classifying unseen users from the store. Keys on
    /// disk without an in-memory entry mean the process restarted, so the
    /// user must explicitly enable again.
    async fn classify(&self, user_id: &str) -> Result<SessionState> {
        if let Some(state) = self.states.read().await.get(user_id) {
            return Ok(*state);
        }
        let state = if self.store.list_all(user_id).await?.is_empty() {
            SessionState::NoKeys
        } else {
            SessionState::Ready(ReadyMode::Disabled)
        };
        self.set_state(user_id, state).await;
        Ok(state)
    }

    async fn publish_current(
        &self,
        user_id: &str,
        record: &KeyPairRecord,
    ) -> Result<CurrentKeyInfo> {
        let public_key = record.public.to_base64().map_err(Error::Crypto)?;
        self.directory.publish(user_id, &public_key).await?;
        Ok(CurrentKeyInfo {
            key_id: record.key_id,
            public_key,
        })
    }

    /// Set up encryption for a user.
    ///
    /// Legacy keys are recovered first if a legacy store is attached; a
    /// fresh pair is generated only if the user is still keyless after
    /// that. The current public key is published to the directory and the
    /// session lands in `Ready(Enabled)`.
    ///
    /// A migration failure propagates unchanged and moves nothing: the
    /// legacy entry stays put and the session state does not advance.
    pub async fn initialize(&self, user_id: &str) -> Result<CurrentKeyInfo> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;
        let started = Instant::now();

        if let Some(migrator) = &self.migrator {
            let migrated = migrator.migrate(user_id).await?;
            if migrated > 0 {
                debug!(
                    subsystem = "session",
                    op = "initialize",
                    user_id,
                    migrated_count = migrated,
                    "Recovered legacy key material during initialization"
                );
            }
        }

        let current = match self.store.get_current(user_id).await? {
            Some(record) => record,
            None => self.generate_first_pair(user_id).await?,
        };

        let info = match self.publish_current(user_id, &current).await {
            Ok(info) => info,
            Err(e) => {
                // The pair is stored; enable can republish later.
                self.set_state(user_id, SessionState::Ready(ReadyMode::Disabled))
                    .await;
                return Err(e);
            }
        };
        self.set_state(user_id, SessionState::Ready(ReadyMode::Enabled))
            .await;

        info!(
            subsystem = "session",
            op = "initialize",
            user_id,
            key_id = %info.key_id,
            duration_ms = started.elapsed().as_millis() as u64,
            "Encryption session initialized"
        );
        Ok(info)
    }

    async fn generate_first_pair(&self, user_id: &str) -> Result<KeyPairRecord> {
        self.set_state(user_id, SessionState::Generating).await;
        debug!(
            subsystem = "session",
            op = "generate",
            user_id,
            "Generating key pair"
        );

        let generated = tokio::task::spawn_blocking(Keypair::generate).await;
        let keypair = match generated {
            Ok(Ok(keypair)) => keypair,
            Ok(Err(e)) => {
                self.set_state(user_id, SessionState::NoKeys).await;
                return Err(e.into());
            }
            Err(e) => {
                self.set_state(user_id, SessionState::NoKeys).await;
                return Err(Error::Internal(format!("key generation task failed: {e}")));
            }
        };

        match self.store.put(KeyPairRecord::new(user_id, keypair)).await {
            Ok(record) => Ok(record),
            Err(e) => {
                self.set_state(user_id, SessionState::NoKeys).await;
                Err(e)
            }
        }
    }

    /// Switch encryption back on for a user with stored keys.
    ///
    /// Valid only from `Ready(Disabled)`. The current pair is re-validated
    /// against the store and its public key republished; if the store no
    /// longer holds one, the session falls back to `NoKeys` and an error is
    /// returned. Returns the current public key string.
    pub async fn enable(&self, user_id: &str) -> Result<String> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        match self.classify(user_id).await? {
            SessionState::Ready(ReadyMode::Disabled) => {}
            SessionState::Ready(ReadyMode::Enabled) => {
                return Err(Error::InvalidState(
                    "encryption is already enabled".to_string(),
                ));
            }
            other => {
                return Err(Error::InvalidState(format!(
                    "enable requires an initialized session, found {other}"
                )));
            }
        }

        let current = match self.store.get_current(user_id).await? {
            Some(record) => record,
            None => {
                self.set_state(user_id, SessionState::NoKeys).await;
                return Err(Error::NotFound(format!("current key pair for {user_id}")));
            }
        };

        let info = self.publish_current(user_id, &current).await?;
        self.set_state(user_id, SessionState::Ready(ReadyMode::Enabled))
            .await;

        info!(
            subsystem = "session",
            op = "enable",
            user_id,
            key_id = %info.key_id,
            "Encryption enabled"
        );
        Ok(info.public_key)
    }

    /// Switch encryption off without discarding keys.
    ///
    /// Valid only from `Ready(Enabled)`. Stored pairs remain usable for
    /// decryption and a later `enable`.
    pub async fn disable(&self, user_id: &str) -> Result<()> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let state = self.classify(user_id).await?;
        if state != SessionState::Ready(ReadyMode::Enabled) {
            return Err(Error::InvalidState(format!(
                "disable requires an enabled session, found {state}"
            )));
        }

        self.set_state(user_id, SessionState::Ready(ReadyMode::Disabled))
            .await;
        info!(subsystem = "session", op = "disable", user_id, "Encryption disabled");
        Ok(())
    }

    /// Discard every stored key pair for a user.
    ///
    /// Valid from any `Ready` state. Irreversible: messages encrypted to
    /// the discarded public keys become permanently undecryptable.
    pub async fn reset(&self, user_id: &str) -> Result<()> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let state = self.classify(user_id).await?;
        if !matches!(state, SessionState::Ready(_)) {
            return Err(Error::InvalidState(format!(
                "reset requires stored keys, found {state}"
            )));
        }

        let removed = self.store.delete_all(user_id).await?;
        self.set_state(user_id, SessionState::NoKeys).await;

        warn!(
            subsystem = "session",
            op = "reset",
            user_id,
            removed_pairs = removed,
            "Encryption reset; prior messages are no longer decryptable"
        );
        Ok(())
    }

    /// Encrypt a message for a recipient identified by their public key
    /// string.
    ///
    /// Stateless with respect to the sender's own keys; the recipient key
    /// string comes from the directory (or wherever the caller trusts).
    pub async fn encrypt_message(
        &self,
        plaintext: &str,
        recipient_public: &str,
    ) -> Result<EncryptedMessage> {
        let recipient = PublicKey::from_base64(recipient_public).map_err(Error::Crypto)?;
        let payload =
            velum_crypto::encrypt_message(plaintext.as_bytes(), &recipient).map_err(Error::Crypto)?;
        Ok(payload.to_message())
    }

    /// Decrypt a message addressed to `user_id`.
    ///
    /// The current pair is tried first, then retired pairs newest-first;
    /// rotation keeps old pairs around for exactly this. Every failure
    /// (malformed envelope, no keys at all, storage trouble, no pair that
    /// opens the message) surfaces as the same undifferentiated decryption
    /// error.
    pub async fn decrypt_message(
        &self,
        message: &EncryptedMessage,
        user_id: &str,
    ) -> Result<String> {
        let payload = match EncryptedPayload::from_message(message) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(
                    subsystem = "session",
                    op = "decrypt",
                    user_id,
                    error = %e,
                    "Malformed envelope"
                );
                return Err(Error::decryption());
            }
        };

        let records = match self.store.list_all(user_id).await {
            Ok(records) => records,
            Err(e) => {
                debug!(
                    subsystem = "session",
                    op = "decrypt",
                    user_id,
                    error = %e,
                    "Key store unavailable during decrypt"
                );
                return Err(Error::decryption());
            }
        };

        let (current, retired): (Vec<_>, Vec<_>) =
            records.into_iter().partition(|record| record.is_current);

        for record in current.iter().chain(retired.iter()) {
            if let Ok(plaintext) = velum_crypto::decrypt_message(&payload, &record.private) {
                // The tag verified, so this was the right pair; a non-text
                // payload is still a decryption failure to the caller.
                return String::from_utf8(plaintext).map_err(|_| Error::decryption());
            }
        }

        debug!(
            subsystem = "session",
            op = "decrypt",
            user_id,
            "No stored key pair opened the message"
        );
        Err(Error::decryption())
    }

    /// Move this user's legacy flat-file keys into the key store.
    ///
    /// Returns the number of migrated pairs (0 or 1). Safe to retry: a
    /// failed attempt leaves the legacy entry in place, and a rerun after
    /// success finds nothing to do. A successful migration out of `NoKeys`
    /// re-classifies the session as `Ready(Disabled)`.
    pub async fn migrate_legacy_keys(&self, user_id: &str) -> Result<u32> {
        let migrator = self
            .migrator
            .as_ref()
            .ok_or_else(|| Error::Config("no legacy key store configured".to_string()))?;

        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let migrated = migrator.migrate(user_id).await?;
        if migrated > 0 {
            let mut states = self.states.write().await;
            match states.get(user_id) {
                Some(SessionState::NoKeys) | None => {
                    states.insert(
                        user_id.to_string(),
                        SessionState::Ready(ReadyMode::Disabled),
                    );
                }
                _ => {}
            }
        }
        Ok(migrated)
    }

    /// Generate a fresh pair, make it current, and republish.
    ///
    /// Valid from any `Ready` state. Older pairs are retained so earlier
    /// messages stay decryptable.
    pub async fn rotate(&self, user_id: &str) -> Result<CurrentKeyInfo> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;
        let started = Instant::now();

        let state = self.classify(user_id).await?;
        if !matches!(state, SessionState::Ready(_)) {
            return Err(Error::InvalidState(format!(
                "rotate requires stored keys, found {state}"
            )));
        }

        let generated = tokio::task::spawn_blocking(Keypair::generate).await;
        let keypair = match generated {
            Ok(Ok(keypair)) => keypair,
            Ok(Err(e)) => return Err(e.into()),
            Err(e) => {
                return Err(Error::Internal(format!("key generation task failed: {e}")));
            }
        };

        let stored = self.store.put(KeyPairRecord::new(user_id, keypair)).await?;
        self.store.mark_current(user_id, stored.key_id).await?;
        let info = self.publish_current(user_id, &stored).await?;

        info!(
            subsystem = "session",
            op = "rotate",
            user_id,
            key_id = %info.key_id,
            duration_ms = started.elapsed().as_millis() as u64,
            "Key pair rotated; older pairs remain for decryption"
        );
        Ok(info)
    }

    /// Whether any key pairs are stored for this user. Pure query, no
    /// state change.
    pub async fn has_keys(&self, user_id: &str) -> Result<bool> {
        Ok(!self.store.list_all(user_id).await?.is_empty())
    }

    /// The public key the directory currently holds for a user, if any.
    ///
    /// Straight passthrough: the session never chooses which recipient key
    /// to trust, it hands back whatever the directory has.
    pub async fn recipient_key(&self, user_id: &str) -> Result<Option<String>> {
        self.directory.lookup(user_id).await
    }

    /// Observable session state for this user.
    pub async fn status(&self, user_id: &str) -> Result<SessionState> {
        self.classify(user_id).await
    }

    /// Stored key pair summaries, newest first. Exposes no private
    /// material.
    pub async fn list_keys(&self, user_id: &str) -> Result<Vec<KeyPairSummary>> {
        Ok(self
            .store
            .list_all(user_id)
            .await?
            .iter()
            .map(KeyPairRecord::summary)
            .collect())
    }
}

impl std::fmt::Debug for EncryptionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionSession")
            .field("legacy_migration", &self.migrator.is_some())
            .finish_non_exhaustive()
    }
}
