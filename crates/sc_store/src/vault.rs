//! Vault: in-memory key material unlocked by user password.
//!
//! The vault holds the 32-byte key that encrypts private keys at rest.
//! When the session closes (or auto-lock fires), the vault is locked and
//! the key is zeroized from memory.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use zeroize::ZeroizeOnDrop;

use sc_crypto::kdf::{vault_key_from_password, SALT_LEN};
use crate::error::StoreError;

pub const DEFAULT_AUTO_LOCK_SECS: u64 = 1800;

#[derive(ZeroizeOnDrop)]
struct VaultInner {
    key: [u8; 32],
    #[zeroize(skip)]
    last_activity: Instant,
    #[zeroize(skip)]
    auto_lock_secs: u64,
}

impl VaultInner {
    fn expired(&self) -> bool {
        self.auto_lock_secs > 0
            && self.last_activity.elapsed() > Duration::from_secs(self.auto_lock_secs)
    }
}

/// Thread-safe vault handle.  Clone to share between store handles.
#[derive(Clone)]
pub struct Vault {
    inner: Arc<RwLock<Option<VaultInner>>>,
    auto_lock_secs: u64,
}

impl Vault {
    pub fn new() -> Self {
        Self::with_auto_lock(DEFAULT_AUTO_LOCK_SECS)
    }

    /// `auto_lock_secs == 0` disables auto-lock.
    pub fn with_auto_lock(auto_lock_secs: u64) -> Self {
        Self {
            inner: Arc::new(RwLock::new(None)),
            auto_lock_secs,
        }
    }

    /// Derive the vault key from the password and salt and hold it.
    pub async fn unlock(&self, password: &[u8], salt: &[u8; SALT_LEN]) -> Result<(), StoreError> {
        let vault_key = vault_key_from_password(password, salt)?;
        self.unlock_with_key(vault_key.0).await;
        Ok(())
    }

    /// Unlock with an existing key (e.g. from an OS keyring).
    pub async fn unlock_with_key(&self, key: [u8; 32]) {
        let mut guard = self.inner.write().await;
        *guard = Some(VaultInner {
            key,
            last_activity: Instant::now(),
            auto_lock_secs: self.auto_lock_secs,
        });
    }

    /// Lock the vault and zeroize the key.
    pub async fn lock(&self) {
        let mut guard = self.inner.write().await;
        *guard = None;
    }

    pub async fn is_locked(&self) -> bool {
        let mut guard = self.inner.write().await;
        match guard.as_ref() {
            Some(inner) if inner.expired() => {
                tracing::info!(target: "sc_store", event = "vault_auto_lock");
                *guard = None;
                true
            }
            Some(_) => false,
            None => true,
        }
    }

    /// Run `f` with the raw key. Errors if the vault is locked or the
    /// auto-lock timer has expired; otherwise resets the timer.
    pub async fn with_key<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&[u8; 32]) -> Result<R, StoreError>,
    {
        let mut guard = self.inner.write().await;
        if guard.as_ref().is_some_and(VaultInner::expired) {
            tracing::info!(target: "sc_store", event = "vault_auto_lock");
            *guard = None;
        }
        match guard.as_mut() {
            Some(inner) => {
                inner.last_activity = Instant::now();
                f(&inner.key)
            }
            None => Err(StoreError::VaultLocked),
        }
    }
}

impl Default for Vault {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn locked_until_unlocked() {
        let vault = Vault::new();
        assert!(vault.is_locked().await);
        assert!(matches!(vault.with_key(|_| Ok(())).await, Err(StoreError::VaultLocked)));

        vault.unlock_with_key([3u8; 32]).await;
        assert!(!vault.is_locked().await);
        let first = vault.with_key(|k| Ok(k[0])).await.unwrap();
        assert_eq!(first, 3);

        vault.lock().await;
        assert!(vault.is_locked().await);
    }

    #[tokio::test]
    async fn auto_lock_expires_key() {
        let vault = Vault::with_auto_lock(1);
        vault.unlock_with_key([1u8; 32]).await;
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(matches!(vault.with_key(|_| Ok(())).await, Err(StoreError::VaultLocked)));
    }

    #[tokio::test]
    async fn zero_disables_auto_lock() {
        let vault = Vault::with_auto_lock(0);
        vault.unlock_with_key([1u8; 32]).await;
        assert!(!vault.is_locked().await);
    }
}
