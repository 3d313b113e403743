//! Per-user key-pair persistence with rotation support.
//!
//! Key pairs are stored keyed by (user_id, key_id). A user may hold several
//! pairs at once; exactly one is marked current once any exist. Retired pairs
//! are kept so material encrypted before a rotation stays readable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use velum_core::{new_v7, Error, Result};
use velum_crypto::{Keypair, PrivateKey, PublicKey};

/// A stored key pair for one user.
#[derive(Debug, Clone)]
pub struct KeyPairRecord {
    pub key_id: Uuid,
    pub user_id: String,
    pub public: PublicKey,
    pub private: PrivateKey,
    pub created_at: DateTime<Utc>,
    pub is_current: bool,
}

impl KeyPairRecord {
    /// Build a record for a freshly generated key pair.
    ///
    /// The record starts out retired; the store decides the effective flag
    /// when the record is put (the first pair for a user becomes current).
    pub fn new(user_id: impl Into<String>, keypair: Keypair) -> Self {
        Self {
            key_id: new_v7(),
            user_id: user_id.into(),
            public: keypair.public,
            private: keypair.private,
            created_at: Utc::now(),
            is_current: false,
        }
    }

    /// Summary view without key material.
    pub fn summary(&self) -> KeyPairSummary {
        KeyPairSummary {
            key_id: self.key_id,
            user_id: self.user_id.clone(),
            fingerprint: self.public.fingerprint(),
            created_at: self.created_at,
            is_current: self.is_current,
        }
    }
}

/// Summary view of a key pair (no key material).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyPairSummary {
    pub key_id: Uuid,
    pub user_id: String,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub is_current: bool,
}

/// Durable per-user key-pair storage.
///
/// Each method is atomic on its own (a single transaction). Multi-step flows
/// for the same user (rotation, migration, reset) must be serialized by the
/// caller; the session layer holds a per-user lock around them.
#[async_trait]
pub trait KeyPairStore: Send + Sync {
    /// Store a key pair. The first pair stored for a user is marked current;
    /// later pairs are stored retired until `mark_current` designates one.
    /// Returns the record as stored, with the effective `is_current` flag.
    async fn put(&self, record: KeyPairRecord) -> Result<KeyPairRecord>;

    /// Fetch the user's current key pair, if any.
    async fn get_current(&self, user_id: &str) -> Result<Option<KeyPairRecord>>;

    /// List all key pairs for a user, newest first.
    async fn list_all(&self, user_id: &str) -> Result<Vec<KeyPairRecord>>;

    /// Move the current marker to `key_id`, atomically with respect to other
    /// writers. Fails with `Error::KeyNotFound` if the user has no pair with
    /// that id; the previous marker is left in place on failure.
    async fn mark_current(&self, user_id: &str, key_id: Uuid) -> Result<()>;

    /// Delete a single key pair. Returns whether a record was removed.
    ///
    /// Deleting the current pair leaves the user without a current pair
    /// until `mark_current` designates another.
    async fn delete(&self, key_id: Uuid) -> Result<bool>;

    /// Delete all key pairs for a user. Returns the number removed.
    async fn delete_all(&self, user_id: &str) -> Result<u64>;
}

/// Raw row shape; key material stays in its exported string form here.
#[derive(sqlx::FromRow)]
struct KeyPairRow {
    key_id: String,
    user_id: String,
    public_key: String,
    private_key: String,
    created_at: DateTime<Utc>,
    is_current: bool,
}

impl KeyPairRow {
    /// Re-import stored key material. A row that no longer parses is
    /// reported as corrupt, not as a decryption failure.
    fn try_into_record(self) -> Result<KeyPairRecord> {
        let key_id = Uuid::parse_str(&self.key_id)
            .map_err(|e| Error::Corrupt(format!("key_id '{}': {}", self.key_id, e)))?;
        let public = PublicKey::from_base64(&self.public_key)
            .map_err(|e| Error::Corrupt(format!("public key of {}: {}", key_id, e)))?;
        let private = PrivateKey::from_base64(&self.private_key)
            .map_err(|e| Error::Corrupt(format!("private key of {}: {}", key_id, e)))?;

        Ok(KeyPairRecord {
            key_id,
            user_id: self.user_id,
            public,
            private,
            created_at: self.created_at,
            is_current: self.is_current,
        })
    }
}

/// SQLite implementation of the key-pair store.
///
/// A partial unique index on `(user_id) WHERE is_current = 1` backs the
/// one-current-pair invariant at the schema level.
#[derive(Clone)]
pub struct SqliteKeyPairStore {
    pool: SqlitePool,
}

impl SqliteKeyPairStore {
    /// Create a new SqliteKeyPairStore with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl KeyPairStore for SqliteKeyPairStore {
    async fn put(&self, record: KeyPairRecord) -> Result<KeyPairRecord> {
        let public_key = record.public.to_base64()?;
        let private_key = record.private.to_base64()?;

        let mut tx = self.pool.begin().await.map_err(Error::Storage)?;

        let has_current: bool = sqlx::query_scalar(
            r#"SELECT EXISTS(SELECT 1 FROM key_pairs WHERE user_id = ?1 AND is_current = 1)"#,
        )
        .bind(&record.user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Storage)?;

        let stored = KeyPairRecord {
            is_current: !has_current,
            ..record
        };

        sqlx::query(
            r#"
            INSERT INTO key_pairs (key_id, user_id, public_key, private_key, created_at, is_current)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(stored.key_id.to_string())
        .bind(&stored.user_id)
        .bind(&public_key)
        .bind(&private_key)
        .bind(stored.created_at)
        .bind(stored.is_current)
        .execute(&mut *tx)
        .await
        .map_err(Error::Storage)?;

        tx.commit().await.map_err(Error::Storage)?;

        Ok(stored)
    }

    async fn get_current(&self, user_id: &str) -> Result<Option<KeyPairRecord>> {
        let row = sqlx::query_as::<_, KeyPairRow>(
            r#"
            SELECT key_id, user_id, public_key, private_key, created_at, is_current
            FROM key_pairs
            WHERE user_id = ?1 AND is_current = 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Storage)?;

        row.map(KeyPairRow::try_into_record).transpose()
    }

    async fn list_all(&self, user_id: &str) -> Result<Vec<KeyPairRecord>> {
        let rows = sqlx::query_as::<_, KeyPairRow>(
            r#"
            SELECT key_id, user_id, public_key, private_key, created_at, is_current
            FROM key_pairs
            WHERE user_id = ?1
            ORDER BY created_at DESC, key_id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Storage)?;

        rows.into_iter().map(KeyPairRow::try_into_record).collect()
    }

    async fn mark_current(&self, user_id: &str, key_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Storage)?;

        sqlx::query(r#"UPDATE key_pairs SET is_current = 0 WHERE user_id = ?1"#)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Storage)?;

        let updated =
            sqlx::query(r#"UPDATE key_pairs SET is_current = 1 WHERE user_id = ?1 AND key_id = ?2"#)
                .bind(user_id)
                .bind(key_id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(Error::Storage)?;

        if updated.rows_affected() == 0 {
            // Dropping the transaction rolls the cleared marker back.
            return Err(Error::KeyNotFound(key_id));
        }

        tx.commit().await.map_err(Error::Storage)?;

        Ok(())
    }

    async fn delete(&self, key_id: Uuid) -> Result<bool> {
        let result = sqlx::query(r#"DELETE FROM key_pairs WHERE key_id = ?1"#)
            .bind(key_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(Error::Storage)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_all(&self, user_id: &str) -> Result<u64> {
        let result = sqlx::query(r#"DELETE FROM key_pairs WHERE user_id = ?1"#)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Storage)?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::connect;
    use crate::test_fixtures::{test_keypair, test_record};

    async fn setup_store() -> (SqliteKeyPairStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = connect(dir.path().join("keys.db"))
            .await
            .expect("Failed to open database");
        (SqliteKeyPairStore::new(pool), dir)
    }

    #[tokio::test]
    async fn test_first_put_becomes_current() {
        let (store, _dir) = setup_store().await;

        let stored = store
            .put(test_record("alice", 0))
            .await
            .expect("Failed to put key pair");

        assert!(stored.is_current);
        let current = store
            .get_current("alice")
            .await
            .expect("Failed to get current")
            .expect("Current pair should exist");
        assert_eq!(current.key_id, stored.key_id);
    }

    #[tokio::test]
    async fn test_second_put_does_not_steal_current() {
        let (store, _dir) = setup_store().await;

        let first = store.put(test_record("alice", 0)).await.expect("first put");
        let second = store
            .put(test_record("alice", 1))
            .await
            .expect("second put");

        assert!(first.is_current);
        assert!(!second.is_current);

        let current = store
            .get_current("alice")
            .await
            .expect("Failed to get current")
            .expect("Current pair should exist");
        assert_eq!(current.key_id, first.key_id);
    }

    #[tokio::test]
    async fn test_get_current_none_for_unknown_user() {
        let (store, _dir) = setup_store().await;

        let current = store
            .get_current("nobody")
            .await
            .expect("Failed to get current");
        assert!(current.is_none());
    }

    #[tokio::test]
    async fn test_list_all_newest_first() {
        let (store, _dir) = setup_store().await;

        let first = store.put(test_record("alice", 0)).await.expect("first put");
        let second = store
            .put(test_record("alice", 1))
            .await
            .expect("second put");

        let all = store.list_all("alice").await.expect("Failed to list");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].key_id, second.key_id);
        assert_eq!(all[1].key_id, first.key_id);
    }

    #[tokio::test]
    async fn test_mark_current_moves_marker() {
        let (store, _dir) = setup_store().await;

        let first = store.put(test_record("alice", 0)).await.expect("first put");
        let second = store
            .put(test_record("alice", 1))
            .await
            .expect("second put");

        store
            .mark_current("alice", second.key_id)
            .await
            .expect("Failed to mark current");

        let all = store.list_all("alice").await.expect("Failed to list");
        let current: Vec<_> = all.iter().filter(|r| r.is_current).collect();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].key_id, second.key_id);
        assert!(!all.iter().any(|r| r.key_id == first.key_id && r.is_current));
    }

    #[tokio::test]
    async fn test_mark_current_unknown_key_fails_and_preserves_marker() {
        let (store, _dir) = setup_store().await;

        let stored = store.put(test_record("alice", 0)).await.expect("put");

        let missing = Uuid::new_v4();
        let result = store.mark_current("alice", missing).await;
        assert!(matches!(result, Err(Error::KeyNotFound(id)) if id == missing));

        // The failed attempt must not have cleared the existing marker.
        let current = store
            .get_current("alice")
            .await
            .expect("Failed to get current")
            .expect("Current pair should survive failed mark");
        assert_eq!(current.key_id, stored.key_id);
    }

    #[tokio::test]
    async fn test_mark_current_other_users_unaffected() {
        let (store, _dir) = setup_store().await;

        let alice = store.put(test_record("alice", 0)).await.expect("put alice");
        let bob_first = store.put(test_record("bob", 1)).await.expect("put bob 1");
        let bob_second = store.put(test_record("bob", 2)).await.expect("put bob 2");

        store
            .mark_current("bob", bob_second.key_id)
            .await
            .expect("Failed to mark current");

        let alice_current = store
            .get_current("alice")
            .await
            .expect("get alice")
            .expect("alice still has a current pair");
        assert_eq!(alice_current.key_id, alice.key_id);

        let bob_current = store
            .get_current("bob")
            .await
            .expect("get bob")
            .expect("bob has a current pair");
        assert_eq!(bob_current.key_id, bob_second.key_id);
        assert_ne!(bob_current.key_id, bob_first.key_id);
    }

    #[tokio::test]
    async fn test_delete_single_pair() {
        let (store, _dir) = setup_store().await;

        let first = store.put(test_record("alice", 0)).await.expect("first put");
        let second = store
            .put(test_record("alice", 1))
            .await
            .expect("second put");

        assert!(store.delete(second.key_id).await.expect("delete"));
        assert!(!store.delete(second.key_id).await.expect("re-delete"));

        let all = store.list_all("alice").await.expect("list");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].key_id, first.key_id);
    }

    #[tokio::test]
    async fn test_delete_all_removes_only_that_user() {
        let (store, _dir) = setup_store().await;

        store.put(test_record("alice", 0)).await.expect("put alice");
        store.put(test_record("alice", 1)).await.expect("put alice");
        store.put(test_record("bob", 2)).await.expect("put bob");

        let removed = store.delete_all("alice").await.expect("delete_all");
        assert_eq!(removed, 2);

        assert!(store.list_all("alice").await.expect("list").is_empty());
        assert_eq!(store.list_all("bob").await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn test_roundtrip_preserves_key_material() {
        let (store, _dir) = setup_store().await;

        let keypair = test_keypair(0);
        let record = KeyPairRecord::new("alice", keypair.clone());
        store.put(record).await.expect("put");

        let loaded = store
            .get_current("alice")
            .await
            .expect("get")
            .expect("pair exists");
        assert_eq!(loaded.public, keypair.public);
        assert_eq!(
            loaded.private.to_base64().expect("export"),
            keypair.private.to_base64().expect("export")
        );
    }

    #[tokio::test]
    async fn test_unparseable_row_reported_as_corrupt() {
        let (store, _dir) = setup_store().await;

        let stored = store.put(test_record("alice", 0)).await.expect("put");

        sqlx::query("UPDATE key_pairs SET public_key = 'not a key' WHERE key_id = ?1")
            .bind(stored.key_id.to_string())
            .execute(&store.pool)
            .await
            .expect("corrupt row");

        let result = store.get_current("alice").await;
        assert!(matches!(result, Err(Error::Corrupt(_))));
    }

    #[test]
    fn test_summary_carries_no_key_material() {
        let record = test_record("alice", 0);
        let summary = record.summary();

        assert_eq!(summary.key_id, record.key_id);
        assert_eq!(summary.fingerprint, record.public.fingerprint());

        let json = serde_json::to_string(&summary).expect("serialize");
        assert!(!json.contains(&record.public.to_base64().expect("export")));
    }
}
