// Store encrypt/decrypt lifecycle and its guard rails

use tokenvault::codec::{self, CodecError};
use tokenvault::provider::Provider;
use tokenvault::provision::{decrypt_store, encrypt_store, require_db_key_from, DB_KEY_ENV};
use tokenvault::store::SecretStore;

fn seed_store(db_path: &std::path::Path) {
    let store = SecretStore::open(db_path).unwrap();
    store
        .upsert_client("acme", "cid1", "secret1", Provider::Google)
        .unwrap();
    store
        .upsert_user_token("alice@x.com", "acme", "refresh123")
        .unwrap();
}

#[test]
fn test_encrypt_decrypt_lifecycle_preserves_store() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("secrets.db");
    let enc_path = dir.path().join("secrets.db.enc");
    seed_store(&db_path);

    let key = codec::generate_key();

    // Seal: blob appears, plaintext is removed
    encrypt_store(&db_path, &enc_path, &key, false).unwrap();
    assert!(enc_path.exists());
    assert!(!db_path.exists());

    // Restore: the store works again with its contents intact
    decrypt_store(&enc_path, &db_path, &key).unwrap();
    let store = SecretStore::open(&db_path).unwrap();
    let token = store.get_active_token("alice@x.com").unwrap();
    assert_eq!(token.refresh_token, "refresh123");
    assert_eq!(store.get_client("acme").unwrap().client_secret, "secret1");
}

#[test]
fn test_encrypt_can_keep_plaintext() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("secrets.db");
    let enc_path = dir.path().join("secrets.db.enc");
    seed_store(&db_path);

    encrypt_store(&db_path, &enc_path, &codec::generate_key(), true).unwrap();
    assert!(enc_path.exists());
    assert!(db_path.exists());
}

#[test]
fn test_encrypt_requires_plaintext_source() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("secrets.db");
    let enc_path = dir.path().join("secrets.db.enc");

    let err = encrypt_store(&db_path, &enc_path, &codec::generate_key(), false).unwrap_err();
    assert!(err.to_string().contains("nothing to encrypt"));
    assert!(!enc_path.exists());
}

#[test]
fn test_decrypt_requires_blob() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("secrets.db");
    let enc_path = dir.path().join("secrets.db.enc");

    let err = decrypt_store(&enc_path, &db_path, &codec::generate_key()).unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[test]
fn test_decrypt_refuses_to_overwrite_plaintext() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("secrets.db");
    let enc_path = dir.path().join("secrets.db.enc");
    seed_store(&db_path);

    let key = codec::generate_key();
    encrypt_store(&db_path, &enc_path, &key, true).unwrap();

    // Plaintext still on disk: decrypting onto it must refuse
    let err = decrypt_store(&enc_path, &db_path, &key).unwrap_err();
    assert!(err.to_string().contains("already exists"));

    // The live store was not touched
    let store = SecretStore::open(&db_path).unwrap();
    assert!(store.get_active_token("alice@x.com").is_ok());
}

#[test]
fn test_decrypt_with_wrong_key_fails_authentication() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("secrets.db");
    let enc_path = dir.path().join("secrets.db.enc");
    seed_store(&db_path);

    encrypt_store(&db_path, &enc_path, &codec::generate_key(), false).unwrap();

    let err = decrypt_store(&enc_path, &db_path, &codec::generate_key()).unwrap_err();
    assert!(matches!(
        err.root_cause().downcast_ref::<CodecError>(),
        Some(CodecError::AuthenticationFailed)
    ));

    // No partial plaintext was written
    assert!(!db_path.exists());
}

#[test]
fn test_missing_db_key_is_fatal() {
    let err = require_db_key_from(|_| None).unwrap_err();
    assert!(err.to_string().contains("TOKENVAULT_DB_KEY is not set"));
}

#[test]
fn test_db_key_read_from_environment_source() {
    let key = require_db_key_from(|name| {
        assert_eq!(name, DB_KEY_ENV);
        Some("some-base64-key".to_string())
    })
    .unwrap();
    assert_eq!(key, "some-base64-key");
}

#[test]
fn test_decrypt_rejects_garbage_blob() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("secrets.db");
    let enc_path = dir.path().join("secrets.db.enc");
    std::fs::write(&enc_path, b"this is not an encrypted store").unwrap();

    let err = decrypt_store(&enc_path, &db_path, &codec::generate_key()).unwrap_err();
    assert!(matches!(
        err.root_cause().downcast_ref::<CodecError>(),
        Some(CodecError::InvalidFormat(_))
    ));
}
