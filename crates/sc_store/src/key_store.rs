//! Private key persistence, keyed by local user id.
//!
//! Only `KeyCustody` (in the client crate) holds a `PrivateKeyStore`; no
//! other component reads or writes key material directly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use sc_crypto::{KeyPair, PrivateKey};

use crate::{db::Store, error::StoreError, models::PrivateKeyRow};

/// A persisted private key and when it was generated.
#[derive(Clone, Debug)]
pub struct StoredKey {
    pub private: PrivateKey,
    pub created_at: DateTime<Utc>,
}

impl StoredKey {
    pub fn new(private: PrivateKey) -> Self {
        Self {
            private,
            created_at: Utc::now(),
        }
    }

    pub fn key_pair(&self) -> KeyPair {
        KeyPair::from_private(self.private.clone())
    }
}

#[async_trait]
pub trait PrivateKeyStore: Send + Sync {
    async fn load(&self, user_id: &str) -> Result<Option<StoredKey>, StoreError>;

    async fn save(&self, user_id: &str, key: &StoredKey) -> Result<(), StoreError>;

    /// Returns whether a key was present.
    async fn delete(&self, user_id: &str) -> Result<bool, StoreError>;
}

// ── SQLite ───────────────────────────────────────────────────────────────────

/// Private keys in the local SQLite database, secret column vault-encrypted.
#[derive(Clone)]
pub struct SqliteKeyStore {
    store: Store,
}

impl SqliteKeyStore {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Public key recorded for `user_id`; readable while the vault is locked.
    pub async fn public_key(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        Ok(sqlx::query_scalar::<_, String>("SELECT public_key FROM private_keys WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.store.pool)
            .await?)
    }
}

#[async_trait]
impl PrivateKeyStore for SqliteKeyStore {
    async fn load(&self, user_id: &str) -> Result<Option<StoredKey>, StoreError> {
        let row: Option<PrivateKeyRow> = sqlx::query_as(
            "SELECT user_id, public_key, secret_enc, created_at FROM private_keys WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.store.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let secret = self.store.decrypt_value(&row.secret_enc).await?;
        let private = PrivateKey::from_bytes(&secret)?;
        if private.public_key().to_b64() != row.public_key {
            return Err(StoreError::Corrupt(format!("public key mismatch for {user_id}")));
        }
        Ok(Some(StoredKey {
            private,
            created_at: row.created_at,
        }))
    }

    async fn save(&self, user_id: &str, key: &StoredKey) -> Result<(), StoreError> {
        let secret_enc = self.store.encrypt_value(key.private.secret_bytes()).await?;
        sqlx::query(
            "INSERT OR REPLACE INTO private_keys (user_id, public_key, secret_enc, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(key.private.public_key().to_b64())
        .bind(&secret_enc)
        .bind(key.created_at)
        .execute(&self.store.pool)
        .await?;
        tracing::info!(target: "sc_store", event = "private_key_saved", user_id = %user_id);
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM private_keys WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.store.pool)
            .await?;
        let removed = result.rows_affected() > 0;
        tracing::info!(target: "sc_store", event = "private_key_deleted", user_id = %user_id, removed);
        Ok(removed)
    }
}

// ── In-memory ────────────────────────────────────────────────────────────────

/// Process-local store for tests and demos. Counts writes so callers can
/// assert on side effects.
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: Mutex<HashMap<String, StoredKey>>,
    writes: AtomicUsize,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save` + `delete` calls that changed storage.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PrivateKeyStore for MemoryKeyStore {
    async fn load(&self, user_id: &str) -> Result<Option<StoredKey>, StoreError> {
        Ok(self.keys.lock().get(user_id).cloned())
    }

    async fn save(&self, user_id: &str, key: &StoredKey) -> Result<(), StoreError> {
        self.keys.lock().insert(user_id.to_string(), key.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<bool, StoreError> {
        let removed = self.keys.lock().remove(user_id).is_some();
        if removed {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::Vault;

    async fn sqlite_store(dir: &tempfile::TempDir) -> SqliteKeyStore {
        let store = Store::open(&dir.path().join("keys.db"), Vault::new()).await.unwrap();
        store.vault.unlock_with_key([5u8; 32]).await;
        SqliteKeyStore::new(store)
    }

    #[tokio::test]
    async fn sqlite_save_load_delete() {
        let dir = tempfile::tempdir().unwrap();
        let keys = sqlite_store(&dir).await;
        assert!(keys.load("alice").await.unwrap().is_none());

        let pair = KeyPair::generate().unwrap();
        keys.save("alice", &StoredKey::new(pair.private().clone())).await.unwrap();

        let loaded = keys.load("alice").await.unwrap().unwrap();
        assert_eq!(loaded.key_pair().public, pair.public);
        assert_eq!(keys.public_key("alice").await.unwrap(), Some(pair.public_b64()));

        assert!(keys.delete("alice").await.unwrap());
        assert!(!keys.delete("alice").await.unwrap());
        assert!(keys.load("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sqlite_secret_column_is_not_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let keys = sqlite_store(&dir).await;
        let pair = KeyPair::generate().unwrap();
        keys.save("bob", &StoredKey::new(pair.private().clone())).await.unwrap();

        let secret_enc: String = sqlx::query_scalar("SELECT secret_enc FROM private_keys WHERE user_id = 'bob'")
            .fetch_one(&keys.store.pool)
            .await
            .unwrap();
        let raw = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, secret_enc).unwrap();
        assert!(!raw.windows(32).any(|w| w == pair.private().secret_bytes()));
    }

    #[tokio::test]
    async fn sqlite_load_needs_unlocked_vault() {
        let dir = tempfile::tempdir().unwrap();
        let keys = sqlite_store(&dir).await;
        let pair = KeyPair::generate().unwrap();
        keys.save("carol", &StoredKey::new(pair.private().clone())).await.unwrap();

        keys.store.vault.lock().await;
        assert!(matches!(keys.load("carol").await, Err(StoreError::VaultLocked)));
        assert!(keys.public_key("carol").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn memory_store_counts_writes() {
        let keys = MemoryKeyStore::new();
        let pair = KeyPair::generate().unwrap();
        keys.save("dave", &StoredKey::new(pair.private().clone())).await.unwrap();
        assert!(!keys.delete("nobody").await.unwrap());
        assert!(keys.delete("dave").await.unwrap());
        assert_eq!(keys.writes(), 2);
    }
}
