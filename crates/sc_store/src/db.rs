//! Database abstraction over SQLite via sqlx.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};

use sc_crypto::{aead, kdf};

use crate::{error::StoreError, models::VaultMetaRow, vault::Vault};

const VALUE_AAD: &[u8] = b"sc-store-v1";
const CHECK_AAD: &[u8] = b"sc-store-check-v1";
const CHECK_PLAINTEXT: &[u8] = b"secure-chat-vault";

/// Central store handle.  Cheap to clone (Arc internally).
#[derive(Clone)]
pub struct Store {
    pub pool: SqlitePool,
    pub vault: Vault,
}

impl Store {
    /// Open (or create) the SQLite database at `db_path`.
    /// Runs all pending migrations automatically.
    ///
    /// WAL journal mode is configured at connection time, not inside a
    /// migration: SQLite forbids changing `journal_mode` inside a
    /// transaction and sqlx wraps every migration in one.
    pub async fn open(db_path: &Path, vault: Vault) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Database(sqlx::Error::Io(e)))?;
        }
        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePool::connect_with(opts).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        Ok(Self { pool, vault })
    }

    /// Unlock the vault with the user's password. The first unlock of a new
    /// database picks the salt and records a check value; later unlocks
    /// verify against it and fail with `WrongPassword`.
    pub async fn unlock(&self, password: &[u8]) -> Result<(), StoreError> {
        let meta: Option<VaultMetaRow> =
            sqlx::query_as("SELECT id, salt_hex, check_enc, created_at FROM vault_meta WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;

        match meta {
            Some(row) => {
                let salt: [u8; kdf::SALT_LEN] = hex::decode(&row.salt_hex)
                    .ok()
                    .and_then(|b| b.try_into().ok())
                    .ok_or_else(|| StoreError::Corrupt("vault salt".into()))?;
                self.vault.unlock(password, &salt).await?;

                let check = STANDARD
                    .decode(&row.check_enc)
                    .map_err(|_| StoreError::Corrupt("vault check value".into()))?;
                let verified = self
                    .vault
                    .with_key(|key| Ok(aead::open_combined(key, &check, CHECK_AAD).is_ok()))
                    .await?;
                if !verified {
                    self.vault.lock().await;
                    return Err(StoreError::WrongPassword);
                }
            }
            None => {
                let salt = kdf::generate_salt()?;
                self.vault.unlock(password, &salt).await?;
                let check_enc = self
                    .vault
                    .with_key(|key| Ok(STANDARD.encode(aead::seal_combined(key, CHECK_PLAINTEXT, CHECK_AAD)?)))
                    .await?;
                sqlx::query("INSERT INTO vault_meta (id, salt_hex, check_enc, created_at) VALUES (1, ?, ?, ?)")
                    .bind(hex::encode(salt))
                    .bind(check_enc)
                    .bind(Utc::now())
                    .execute(&self.pool)
                    .await?;
                tracing::info!(target: "sc_store", event = "vault_initialised");
            }
        }
        Ok(())
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    /// Encrypt a plaintext value with the vault key.
    pub async fn encrypt_value(&self, plaintext: &[u8]) -> Result<String, StoreError> {
        self.vault
            .with_key(|key| Ok(STANDARD.encode(aead::seal_combined(key, plaintext, VALUE_AAD)?)))
            .await
    }

    /// Decrypt a vault-encrypted value.
    pub async fn decrypt_value(&self, b64: &str) -> Result<zeroize::Zeroizing<Vec<u8>>, StoreError> {
        let ct = STANDARD
            .decode(b64)
            .map_err(|e| StoreError::Crypto(sc_crypto::CryptoError::Base64Decode(e)))?;
        self.vault
            .with_key(|key| Ok(aead::open_combined(key, &ct, VALUE_AAD)?))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::Store;
    use crate::{error::StoreError, vault::Vault};

    #[tokio::test]
    async fn values_round_trip_through_vault() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("keys.db"), Vault::new()).await.expect("open store");
        store.vault.unlock_with_key([9u8; 32]).await;

        let enc = store.encrypt_value(b"secret").await.unwrap();
        assert_eq!(store.decrypt_value(&enc).await.unwrap().as_slice(), b"secret");

        store.vault.lock().await;
        assert!(matches!(store.decrypt_value(&enc).await, Err(StoreError::VaultLocked)));
    }

    #[tokio::test]
    async fn password_is_verified_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.db");

        let store = Store::open(&path, Vault::new()).await.unwrap();
        store.unlock(b"correct horse").await.unwrap();
        let enc = store.encrypt_value(b"k").await.unwrap();
        store.pool.close().await;

        let reopened = Store::open(&path, Vault::new()).await.unwrap();
        assert!(matches!(reopened.unlock(b"wrong").await, Err(StoreError::WrongPassword)));
        assert!(reopened.vault.is_locked().await);

        reopened.unlock(b"correct horse").await.unwrap();
        assert_eq!(reopened.decrypt_value(&enc).await.unwrap().as_slice(), b"k");
    }
}
