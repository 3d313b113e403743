//! Public-key directory: maps user ids to their published public keys.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use velum_core::{Error, Result};

/// Publication and lookup of user public keys, in exported string form.
///
/// The core never chooses which recipient key to trust; it encrypts to
/// whatever string the directory returns.
#[async_trait]
pub trait KeyDirectory: Send + Sync {
    /// Publish (or replace) a user's public key.
    async fn publish(&self, user_id: &str, public_key: &str) -> Result<()>;

    /// Look up a user's published public key.
    async fn lookup(&self, user_id: &str) -> Result<Option<String>>;
}

/// SQLite implementation backed by the `published_keys` table.
#[derive(Clone)]
pub struct SqliteKeyDirectory {
    pool: SqlitePool,
}

impl SqliteKeyDirectory {
    /// Create a new SqliteKeyDirectory with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeyDirectory for SqliteKeyDirectory {
    async fn publish(&self, user_id: &str, public_key: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO published_keys (user_id, public_key, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (user_id) DO UPDATE
            SET public_key = excluded.public_key,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(public_key)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Storage)?;

        Ok(())
    }

    async fn lookup(&self, user_id: &str) -> Result<Option<String>> {
        let key = sqlx::query_scalar::<_, String>(
            r#"SELECT public_key FROM published_keys WHERE user_id = ?1"#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Storage)?;

        Ok(key)
    }
}

/// In-memory directory for tests.
#[derive(Default)]
pub struct MemoryKeyDirectory {
    keys: Mutex<HashMap<String, String>>,
}

impl MemoryKeyDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyDirectory for MemoryKeyDirectory {
    async fn publish(&self, user_id: &str, public_key: &str) -> Result<()> {
        self.keys
            .lock()
            .await
            .insert(user_id.to_string(), public_key.to_string());
        Ok(())
    }

    async fn lookup(&self, user_id: &str) -> Result<Option<String>> {
        Ok(self.keys.lock().await.get(user_id).cloned())
    }
}
