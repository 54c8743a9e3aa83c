//! Key custody: one long-term keypair per user identity.
//!
//! The private half lives in a `PrivateKeyStore` and an in-memory cache;
//! only the public half is ever handed to the directory. Ensuring a keypair
//! is idempotent and safe to run at every session start.

use std::sync::Arc;

use parking_lot::RwLock;

use sc_crypto::{random, CryptoError, KeyPair, PrivateKey, PublicKey};
use sc_store::{PrivateKeyStore, StoredKey};

use crate::{collaborators::Directory, error::CustodyError};

pub struct KeyCustody {
    user_id: String,
    store: Arc<dyn PrivateKeyStore>,
    directory: Arc<dyn Directory>,
    cached: RwLock<Option<KeyPair>>,
}

impl KeyCustody {
    pub fn new(
        user_id: impl Into<String>,
        store: Arc<dyn PrivateKeyStore>,
        directory: Arc<dyn Directory>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            store,
            directory,
            cached: RwLock::new(None),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Make sure a local private key exists and its public half is published.
    ///
    /// - local key and matching published key: no writes at all
    /// - local key, directory copy missing or different: republish it
    /// - no local key: generate, persist once, publish once
    ///
    /// A locally held key is never replaced; doing so would orphan every
    /// message already wrapped to it.
    pub async fn ensure_key_pair(&self) -> Result<KeyPair, CustodyError> {
        if !random::is_available() {
            return Err(CryptoError::CryptoUnavailable("OS random source unreadable".into()).into());
        }

        let published = self.directory.public_key(&self.user_id).await?;

        if let Some(pair) = self.key_pair().await? {
            let local_b64 = pair.public_b64();
            match published.as_deref() {
                Some(p) if p == local_b64 => {}
                Some(_) => {
                    tracing::warn!(
                        target: "secure_chat",
                        event = "public_key_mismatch",
                        user_id = %self.user_id,
                        "directory key differs from local key; republishing local key"
                    );
                    self.directory.publish_public_key(&self.user_id, &local_b64).await?;
                }
                None => {
                    tracing::info!(target: "secure_chat", event = "public_key_republished", user_id = %self.user_id);
                    self.directory.publish_public_key(&self.user_id, &local_b64).await?;
                }
            }
            return Ok(pair);
        }

        if published.is_some() {
            tracing::warn!(
                target: "secure_chat",
                event = "published_key_without_private",
                user_id = %self.user_id,
                "no local private key for published key; earlier messages to this user become unreadable here"
            );
        }

        let pair = KeyPair::generate()?;
        self.store
            .save(&self.user_id, &StoredKey::new(pair.private().clone()))
            .await?;
        self.directory
            .publish_public_key(&self.user_id, &pair.public_b64())
            .await?;
        *self.cached.write() = Some(pair.clone());

        tracing::info!(
            target: "secure_chat",
            event = "key_pair_generated",
            user_id = %self.user_id,
            fingerprint = %pair.public.fingerprint(),
        );
        Ok(pair)
    }

    /// The locally held keypair, from cache or storage.
    pub async fn key_pair(&self) -> Result<Option<KeyPair>, CustodyError> {
        if let Some(pair) = self.cached.read().clone() {
            return Ok(Some(pair));
        }
        let Some(stored) = self.store.load(&self.user_id).await? else {
            return Ok(None);
        };
        let pair = stored.key_pair();
        *self.cached.write() = Some(pair.clone());
        Ok(Some(pair))
    }

    pub async fn private_key(&self) -> Result<Option<PrivateKey>, CustodyError> {
        Ok(self.key_pair().await?.map(|pair| pair.private().clone()))
    }

    pub async fn public_key(&self) -> Result<Option<PublicKey>, CustodyError> {
        Ok(self.key_pair().await?.map(|pair| pair.public))
    }

    /// Safety number shown to users comparing keys out of band.
    pub async fn fingerprint(&self) -> Result<Option<String>, CustodyError> {
        Ok(self.public_key().await?.map(|pk| pk.fingerprint()))
    }

    /// Forget the private key (logout). The published public key is left in
    /// place; peers keep addressing it until a new one is generated.
    pub async fn clear(&self) -> Result<bool, CustodyError> {
        self.cached.write().take();
        let removed = self.store.delete(&self.user_id).await?;
        tracing::info!(target: "secure_chat", event = "private_key_cleared", user_id = %self.user_id, removed);
        Ok(removed)
    }
}
