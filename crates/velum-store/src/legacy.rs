//! Legacy key storage: the pre-rotation scheme that kept exported key
//! strings in plain per-user files.
//!
//! This layer is a migration source only. It can be read and erased, never
//! written; new key material always goes through the key-pair store.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;

use velum_core::{Error, Result};

/// Raw key material found in legacy storage. Both halves are the exported
/// base64 string form, unvalidated.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyKeyRecord {
    pub user_id: String,
    pub raw_public: String,
    pub raw_private: String,
}

/// Read/erase access to the legacy storage location.
#[async_trait]
pub trait LegacyKeyStore: Send + Sync {
    /// Fetch the legacy record for a user, if one exists.
    ///
    /// A record with only one half present is reported as
    /// `Error::Migration` and left in place.
    async fn fetch(&self, user_id: &str) -> Result<Option<LegacyKeyRecord>>;

    /// Erase the legacy record for a user. A no-op if none exists.
    async fn remove(&self, user_id: &str) -> Result<()>;
}

/// Filesystem legacy store: `<dir>/<user_id>.public` and
/// `<dir>/<user_id>.private`.
pub struct FsLegacyKeyStore {
    dir: PathBuf,
}

impl FsLegacyKeyStore {
    /// Create a store reading from the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn public_path(&self, user_id: &str) -> PathBuf {
        self.dir.join(format!("{user_id}.public"))
    }

    fn private_path(&self, user_id: &str) -> PathBuf {
        self.dir.join(format!("{user_id}.private"))
    }
}

/// User ids become file names here, so path-like ids are rejected outright.
fn validate_user_id(user_id: &str) -> Result<()> {
    if user_id.is_empty() || user_id.contains(['/', '\\']) || user_id.starts_with('.') {
        return Err(Error::InvalidInput(format!(
            "invalid user id for legacy lookup: '{user_id}'"
        )));
    }
    Ok(())
}

async fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::Io(e)),
    }
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io(e)),
    }
}

#[async_trait]
impl LegacyKeyStore for FsLegacyKeyStore {
    async fn fetch(&self, user_id: &str) -> Result<Option<LegacyKeyRecord>> {
        validate_user_id(user_id)?;

        let raw_public = read_optional(&self.public_path(user_id)).await?;
        let raw_private = read_optional(&self.private_path(user_id)).await?;

        match (raw_public, raw_private) {
            (Some(raw_public), Some(raw_private)) => Ok(Some(LegacyKeyRecord {
                user_id: user_id.to_string(),
                raw_public,
                raw_private,
            })),
            (None, None) => Ok(None),
            _ => Err(Error::Migration(format!(
                "legacy key material for '{user_id}' is incomplete"
            ))),
        }
    }

    async fn remove(&self, user_id: &str) -> Result<()> {
        validate_user_id(user_id)?;

        remove_if_exists(&self.public_path(user_id)).await?;
        remove_if_exists(&self.private_path(user_id)).await?;
        Ok(())
    }
}

/// In-memory legacy store for tests.
#[derive(Default)]
pub struct MemoryLegacyKeyStore {
    records: Mutex<HashMap<String, (String, String)>>,
}

impl MemoryLegacyKeyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a legacy record. Test setup only; the trait itself has no write
    /// path.
    pub async fn insert(&self, user_id: &str, raw_public: &str, raw_private: &str) {
        self.records.lock().await.insert(
            user_id.to_string(),
            (raw_public.to_string(), raw_private.to_string()),
        );
    }
}

#[async_trait]
impl LegacyKeyStore for MemoryLegacyKeyStore {
    async fn fetch(&self, user_id: &str) -> Result<Option<LegacyKeyRecord>> {
        let records = self.records.lock().await;
        Ok(records
            .get(user_id)
            .map(|(raw_public, raw_private)| LegacyKeyRecord {
                user_id: user_id.to_string(),
                raw_public: raw_public.clone(),
                raw_private: raw_private.clone(),
            }))
    }

    async fn remove(&self, user_id: &str) -> Result<()> {
        self.records.lock().await.remove(user_id);
        Ok(())
    }
}
