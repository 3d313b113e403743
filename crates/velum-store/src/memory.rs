//! In-memory key-pair store for tests and callers that embed without SQLite.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use velum_core::{Error, Result};

use crate::key_pairs::{KeyPairRecord, KeyPairStore};

/// In-memory implementation of the key-pair store.
///
/// Mirrors the SQLite semantics: newest-first listing, first put becomes
/// current, `mark_current` is all-or-nothing.
#[derive(Default)]
pub struct MemoryKeyPairStore {
    records: Mutex<HashMap<String, Vec<KeyPairRecord>>>,
}

impl MemoryKeyPairStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyPairStore for MemoryKeyPairStore {
    async fn put(&self, record: KeyPairRecord) -> Result<KeyPairRecord> {
        let mut records = self.records.lock().await;
        let user_records = records.entry(record.user_id.clone()).or_default();

        let has_current = user_records.iter().any(|r| r.is_current);
        let stored = KeyPairRecord {
            is_current: !has_current,
            ..record
        };
        user_records.push(stored.clone());

        Ok(stored)
    }

    async fn get_current(&self, user_id: &str) -> Result<Option<KeyPairRecord>> {
        let records = self.records.lock().await;
        Ok(records
            .get(user_id)
            .and_then(|rs| rs.iter().find(|r| r.is_current).cloned()))
    }

    async fn list_all(&self, user_id: &str) -> Result<Vec<KeyPairRecord>> {
        let records = self.records.lock().await;
        let mut all = records.get(user_id).cloned().unwrap_or_default();
        all.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.key_id.cmp(&a.key_id))
        });
        Ok(all)
    }

    async fn mark_current(&self, user_id: &str, key_id: Uuid) -> Result<()> {
        let mut records = self.records.lock().await;
        let user_records = records
            .get_mut(user_id)
            .ok_or(Error::KeyNotFound(key_id))?;

        if !user_records.iter().any(|r| r.key_id == key_id) {
            return Err(Error::KeyNotFound(key_id));
        }
        for r in user_records.iter_mut() {
            r.is_current = r.key_id == key_id;
        }

        Ok(())
    }

    async fn delete(&self, key_id: Uuid) -> Result<bool> {
        let mut records = self.records.lock().await;
        for user_records in records.values_mut() {
            if let Some(pos) = user_records.iter().position(|r| r.key_id == key_id) {
                user_records.remove(pos);
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn delete_all(&self, user_id: &str) -> Result<u64> {
        let mut records = self.records.lock().await;
        Ok(records
            .remove(user_id)
            .map(|rs| rs.len() as u64)
            .unwrap_or(0))
    }
}
