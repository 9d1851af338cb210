// Durability of the secret store across process-style reopen

use tokenvault::provider::Provider;
use tokenvault::store::{SecretStore, StoreError};

#[test]
fn test_mutations_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("secrets.db");

    {
        let store = SecretStore::open(&db_path).unwrap();
        store
            .upsert_client("acme", "cid1", "secret1", Provider::Google)
            .unwrap();
        store
            .upsert_user_token("alice@x.com", "acme", "refresh123")
            .unwrap();
    }

    // Separate "invocation": everything committed is visible
    {
        let store = SecretStore::open(&db_path).unwrap();
        let client = store.get_client_by_provider(Provider::Google).unwrap();
        assert_eq!(client.key, "acme");

        let token = store.get_active_token("alice@x.com").unwrap();
        assert_eq!(token.refresh_token, "refresh123");

        store.revoke_token("alice@x.com").unwrap();
    }

    // Revocation is durable too, and the audit row remains
    {
        let store = SecretStore::open(&db_path).unwrap();
        assert!(matches!(
            store.get_active_token("alice@x.com"),
            Err(StoreError::NotFound)
        ));
        let history = store.list_tokens("alice@x.com").unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].revoked);
    }
}

#[test]
fn test_failed_write_leaves_file_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("secrets.db");

    {
        let store = SecretStore::open(&db_path).unwrap();
        let err = store
            .upsert_user_token("alice@x.com", "ghost", "refresh123")
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownClient(_)));
    }

    let store = SecretStore::open(&db_path).unwrap();
    assert!(store.list_tokens("alice@x.com").unwrap().is_empty());
}
