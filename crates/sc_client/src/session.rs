use std::sync::Arc;

use sc_store::PrivateKeyStore;

use crate::{collaborators::Collaborators, config::ClientConfig, custody::KeyCustody};

/// Everything a logged-in user's pipeline needs, passed explicitly.
#[derive(Clone)]
pub struct Session {
    pub user_id: String,
    pub config: ClientConfig,
    pub custody: Arc<KeyCustody>,
    pub collaborators: Collaborators,
}

impl Session {
    pub fn new(
        user_id: impl Into<String>,
        config: ClientConfig,
        key_store: Arc<dyn PrivateKeyStore>,
        collaborators: Collaborators,
    ) -> Self {
        let user_id = user_id.into();
        let custody = Arc::new(KeyCustody::new(
            user_id.clone(),
            key_store,
            collaborators.directory.clone(),
        ));
        Self {
            user_id,
            config,
            custody,
            collaborators,
        }
    }
}
