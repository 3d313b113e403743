//! Integration tests for the encryption session facade over in-memory
//! backends.
//!
//! This suite validates:
//! - Initialization (fresh generation, legacy recovery, idempotence)
//! - The session state machine and its invalid transitions
//! - Encrypt/decrypt through the facade, including rotation fallback
//! - Undifferentiated decryption failures at the facade boundary
//! - Reset irreversibility and directory publication
//! - Config-built sessions over the real SQLite and flat-file backends

use std::sync::Arc;

use velum_core::Error;
use velum_crypto::{CryptoError, PublicKey};
use velum_session::{EncryptionSession, ReadyMode, SessionConfig, SessionState};
use velum_store::test_fixtures::{test_keypair, test_record};
use velum_store::{
    KeyDirectory, KeyPairStore, LegacyKeyStore, MemoryKeyDirectory, MemoryKeyPairStore,
    MemoryLegacyKeyStore,
};

struct Rig {
    session: EncryptionSession,
    store: Arc<MemoryKeyPairStore>,
    directory: Arc<MemoryKeyDirectory>,
}

fn setup() -> Rig {
    let store = Arc::new(MemoryKeyPairStore::new());
    let directory = Arc::new(MemoryKeyDirectory::new());
    let session = EncryptionSession::new(store.clone(), directory.clone());
    Rig {
        session,
        store,
        directory,
    }
}

fn setup_with_legacy() -> (Rig, Arc<MemoryLegacyKeyStore>) {
    let store = Arc::new(MemoryKeyPairStore::new());
    let directory = Arc::new(MemoryKeyDirectory::new());
    let legacy = Arc::new(MemoryLegacyKeyStore::new());
    let session =
        EncryptionSession::new(store.clone(), directory.clone()).with_legacy(legacy.clone());
    (
        Rig {
            session,
            store,
            directory,
        },
        legacy,
    )
}

/// Seed a stored key pair without going through facade generation.
async fn seed_user(rig: &Rig, user_id: &str, slot: usize) -> String {
    let stored = rig
        .store
        .put(test_record(user_id, slot))
        .await
        .expect("seed key pair");
    stored.public.to_base64().expect("export public")
}

fn assert_decryption_error(err: Error) {
    match err {
        Error::Crypto(CryptoError::Decryption) => {}
        other => panic!("expected undifferentiated decryption error, got {other:?}"),
    }
}

#[tokio::test]
async fn initialize_returns_decodable_public_key() {
    let rig = setup();

    let info = rig.session.initialize("u1").await.expect("initialize");

    assert!(!info.public_key.is_empty());
    assert!(PublicKey::from_base64(&info.public_key).is_ok());
    assert!(rig.session.has_keys("u1").await.expect("has_keys"));
    assert_eq!(
        rig.session.status("u1").await.expect("status"),
        SessionState::Ready(ReadyMode::Enabled)
    );
}

#[tokio::test]
async fn initialize_reuses_existing_pair() {
    let rig = setup();

    let first = rig.session.initialize("u1").await.expect("initialize");
    let second = rig.session.initialize("u1").await.expect("re-initialize");

    assert_eq!(first.key_id, second.key_id);
    assert_eq!(rig.session.list_keys("u1").await.expect("list").len(), 1);
}

#[tokio::test]
async fn initialize_publishes_to_directory() {
    let rig = setup();

    let info = rig.session.initialize("u1").await.expect("initialize");

    let published = rig.directory.lookup("u1").await.expect("lookup");
    assert_eq!(published, Some(info.public_key));
}

#[tokio::test]
async fn encrypt_decrypt_roundtrip_via_facade() {
    let rig = setup();
    let bob_public = seed_user(&rig, "bob", 0).await;

    let message = rig
        .session
        .encrypt_message("hello", &bob_public)
        .await
        .expect("encrypt");
    let plaintext = rig
        .session
        .decrypt_message(&message, "bob")
        .await
        .expect("decrypt");

    assert_eq!(plaintext, "hello");
}

#[tokio::test]
async fn decrypt_with_wrong_user_fails() {
    let rig = setup();
    let bob_public = seed_user(&rig, "bob", 0).await;
    seed_user(&rig, "mallory", 1).await;

    let message = rig
        .session
        .encrypt_message("for bob only", &bob_public)
        .await
        .expect("encrypt");

    let err = rig
        .session
        .decrypt_message(&message, "mallory")
        .await
        .expect_err("wrong recipient must not decrypt");
    assert_decryption_error(err);
}

#[tokio::test]
async fn decrypt_without_any_keys_fails_the_same_way() {
    let rig = setup();
    let bob_public = seed_user(&rig, "bob", 0).await;

    let message = rig
        .session
        .encrypt_message("hi", &bob_public)
        .await
        .expect("encrypt");

    let err = rig
        .session
        .decrypt_message(&message, "keyless")
        .await
        .expect_err("keyless user must not decrypt");
    assert_decryption_error(err);
}

#[tokio::test]
async fn encrypt_rejects_malformed_recipient_key() {
    let rig = setup();

    let err = rig
        .session
        .encrypt_message("hi", "not base64 der!")
        .await
        .expect_err("malformed key must be rejected");
    assert!(matches!(err, Error::Crypto(CryptoError::KeyImport(_))));
}

#[tokio::test]
async fn migrate_moves_legacy_pair_and_reclassifies() {
    let (rig, legacy) = setup_with_legacy();
    let keypair = test_keypair(2);
    legacy
        .insert(
            "u4",
            &keypair.public.to_base64().expect("export public"),
            &keypair.private.to_base64().expect("export private"),
        )
        .await;

    let migrated = rig.session.migrate_legacy_keys("u4").await.expect("migrate");
    assert_eq!(migrated, 1);

    assert_eq!(legacy.fetch("u4").await.expect("fetch"), None);
    assert_eq!(
        rig.session.status("u4").await.expect("status"),
        SessionState::Ready(ReadyMode::Disabled)
    );

    let keys = rig.session.list_keys("u4").await.expect("list");
    assert_eq!(keys.len(), 1);
    assert!(keys[0].is_current);

    // The second run finds nothing left to move.
    let again = rig.session.migrate_legacy_keys("u4").await.expect("migrate");
    assert_eq!(again, 0);
}

#[tokio::test]
async fn migrated_pair_decrypts_via_facade() {
    let (rig, legacy) = setup_with_legacy();
    let keypair = test_keypair(2);
    legacy
        .insert(
            "u4",
            &keypair.public.to_base64().expect("export public"),
            &keypair.private.to_base64().expect("export private"),
        )
        .await;

    let public = keypair.public.to_base64().expect("export public");
    let message = rig
        .session
        .encrypt_message("sent before migration", &public)
        .await
        .expect("encrypt");

    rig.session.migrate_legacy_keys("u4").await.expect("migrate");

    let plaintext = rig
        .session
        .decrypt_message(&message, "u4")
        .await
        .expect("decrypt after migration");
    assert_eq!(plaintext, "sent before migration");
}

#[tokio::test]
async fn migrate_without_legacy_store_is_config_error() {
    let rig = setup();

    let err = rig
        .session
        .migrate_legacy_keys("u1")
        .await
        .expect_err("no legacy store configured");
    assert!(matches!(err, Error::Config(_)));
}

#[tokio::test]
async fn initialize_recovers_legacy_keys_without_generating() {
    let (rig, legacy) = setup_with_legacy();
    let keypair = test_keypair(3);
    legacy
        .insert(
            "u5",
            &keypair.public.to_base64().expect("export public"),
            &keypair.private.to_base64().expect("export private"),
        )
        .await;

    let info = rig.session.initialize("u5").await.expect("initialize");

    assert_eq!(
        info.public_key,
        keypair.public.to_base64().expect("export public")
    );
    assert_eq!(legacy.fetch("u5").await.expect("fetch"), None);
    assert_eq!(rig.session.list_keys("u5").await.expect("list").len(), 1);
}

#[tokio::test]
async fn reset_discards_keys_and_prior_ciphertexts() {
    let rig = setup();
    let public = seed_user(&rig, "u1", 0).await;

    let message = rig
        .session
        .encrypt_message("gone after reset", &public)
        .await
        .expect("encrypt");

    rig.session.reset("u1").await.expect("reset");

    assert!(!rig.session.has_keys("u1").await.expect("has_keys"));
    assert_eq!(
        rig.session.status("u1").await.expect("status"),
        SessionState::NoKeys
    );
    let err = rig
        .session
        .decrypt_message(&message, "u1")
        .await
        .expect_err("prior ciphertext must be undecryptable");
    assert_decryption_error(err);
}

#[tokio::test]
async fn reset_without_keys_is_invalid_state() {
    let rig = setup();

    let err = rig
        .session
        .reset("nobody")
        .await
        .expect_err("nothing to reset");
    assert!(matches!(err, Error::InvalidState(_)));
}

#[tokio::test]
async fn rotation_keeps_old_material_decryptable() {
    let rig = setup();
    let old_public = seed_user(&rig, "u1", 0).await;

    let before_rotation = rig
        .session
        .encrypt_message("old key material", &old_public)
        .await
        .expect("encrypt");

    let info = rig.session.rotate("u1").await.expect("rotate");
    assert_ne!(info.public_key, old_public);

    let keys = rig.session.list_keys("u1").await.expect("list");
    assert_eq!(keys.len(), 2);
    assert_eq!(keys.iter().filter(|k| k.is_current).count(), 1);
    assert_eq!(
        keys.iter().find(|k| k.is_current).map(|k| k.key_id),
        Some(info.key_id)
    );

    // The retired pair still opens the earlier message.
    let plaintext = rig
        .session
        .decrypt_message(&before_rotation, "u1")
        .await
        .expect("decrypt with retired pair");
    assert_eq!(plaintext, "old key material");

    // And the new pair handles new traffic.
    let after_rotation = rig
        .session
        .encrypt_message("new key material", &info.public_key)
        .await
        .expect("encrypt");
    assert_eq!(
        rig.session
            .decrypt_message(&after_rotation, "u1")
            .await
            .expect("decrypt with current pair"),
        "new key material"
    );
}

#[tokio::test]
async fn rotation_republishes_to_directory() {
    let rig = setup();
    seed_user(&rig, "u1", 0).await;

    let info = rig.session.rotate("u1").await.expect("rotate");

    let published = rig.directory.lookup("u1").await.expect("lookup");
    assert_eq!(published, Some(info.public_key));
}

#[tokio::test]
async fn rotate_without_keys_is_invalid_state() {
    let rig = setup();

    let err = rig
        .session
        .rotate("nobody")
        .await
        .expect_err("nothing to rotate");
    assert!(matches!(err, Error::InvalidState(_)));
}

#[tokio::test]
async fn concurrent_rotations_leave_exactly_one_current() {
    let rig = setup();
    seed_user(&rig, "u1", 0).await;

    let (first, second) = tokio::join!(rig.session.rotate("u1"), rig.session.rotate("u1"));
    first.expect("first rotation");
    second.expect("second rotation");

    let keys = rig.session.list_keys("u1").await.expect("list");
    assert_eq!(keys.len(), 3);
    assert_eq!(keys.iter().filter(|k| k.is_current).count(), 1);
}

#[tokio::test]
async fn enable_from_enabled_is_invalid() {
    let rig = setup();
    rig.session.initialize("u1").await.expect("initialize");

    let err = rig
        .session
        .enable("u1")
        .await
        .expect_err("already enabled");
    assert!(matches!(err, Error::InvalidState(_)));
}

#[tokio::test]
async fn disable_then_enable_roundtrip() {
    let rig = setup();
    let info = rig.session.initialize("u1").await.expect("initialize");

    rig.session.disable("u1").await.expect("disable");
    assert_eq!(
        rig.session.status("u1").await.expect("status"),
        SessionState::Ready(ReadyMode::Disabled)
    );

    let public = rig.session.enable("u1").await.expect("enable");
    assert_eq!(public, info.public_key);
    assert_eq!(
        rig.session.status("u1").await.expect("status"),
        SessionState::Ready(ReadyMode::Enabled)
    );
}

#[tokio::test]
async fn disable_without_enabled_session_fails() {
    let rig = setup();
    seed_user(&rig, "u1", 0).await;

    // Stored keys classify as Ready(Disabled), not Enabled.
    let err = rig
        .session
        .disable("u1")
        .await
        .expect_err("not enabled");
    assert!(matches!(err, Error::InvalidState(_)));
}

#[tokio::test]
async fn fresh_session_classifies_stored_keys_as_disabled() {
    let rig = setup();
    let info = rig.session.initialize("u1").await.expect("initialize");

    // A second facade over the same store stands in for a process restart.
    let restarted = EncryptionSession::new(rig.store.clone(), rig.directory.clone());
    assert_eq!(
        restarted.status("u1").await.expect("status"),
        SessionState::Ready(ReadyMode::Disabled)
    );

    let public = restarted.enable("u1").await.expect("enable");
    assert_eq!(public, info.public_key);
}

#[tokio::test]
async fn enable_when_store_was_emptied_corrects_state() {
    let rig = setup();
    seed_user(&rig, "u1", 0).await;
    assert_eq!(
        rig.session.status("u1").await.expect("status"),
        SessionState::Ready(ReadyMode::Disabled)
    );

    // Wipe behind the facade's back.
    rig.store.delete_all("u1").await.expect("delete_all");

    let err = rig.session.enable("u1").await.expect_err("no keys left");
    assert!(matches!(err, Error::NotFound(_)));
    assert_eq!(
        rig.session.status("u1").await.expect("status"),
        SessionState::NoKeys
    );
}

#[tokio::test]
async fn status_of_unknown_user_is_no_keys() {
    let rig = setup();
    assert_eq!(
        rig.session.status("stranger").await.expect("status"),
        SessionState::NoKeys
    );
}

#[tokio::test]
async fn from_config_wires_sqlite_and_legacy_backends() {
    let db_dir = tempfile::tempdir().expect("tempdir");
    let legacy_dir = tempfile::tempdir().expect("tempdir");

    let keypair = test_keypair(2);
    std::fs::write(
        legacy_dir.path().join("u9.public"),
        keypair.public.to_base64().expect("export public"),
    )
    .expect("write public");
    std::fs::write(
        legacy_dir.path().join("u9.private"),
        keypair.private.to_base64().expect("export private"),
    )
    .expect("write private");

    let config = SessionConfig::default()
        .with_db_path(db_dir.path().join("velum.db"))
        .with_legacy_dir(legacy_dir.path());
    let session = EncryptionSession::from_config(&config)
        .await
        .expect("from_config");

    // Initialization recovers the legacy pair instead of generating.
    let info = session.initialize("u9").await.expect("initialize");
    assert_eq!(
        info.public_key,
        keypair.public.to_base64().expect("export public")
    );
    assert!(!legacy_dir.path().join("u9.private").exists());

    // Round trip through the SQLite-backed facade.
    let message = session
        .encrypt_message("over sqlite", &info.public_key)
        .await
        .expect("encrypt");
    assert_eq!(
        session
            .decrypt_message(&message, "u9")
            .await
            .expect("decrypt"),
        "over sqlite"
    );
}
