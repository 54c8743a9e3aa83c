//! Contracts of the external collaborators the pipeline talks to.
//!
//! The real backend is a REST + real-time chat server with object storage;
//! `loopback::LoopbackServer` implements every trait in memory.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

use sc_proto::{ClientEvent, ServerEvent, StoredMessage};

use crate::error::TransportError;

/// One room member as listed by the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub user_id: String,
    /// Base64 public key from the user's profile, if ever published.
    pub public_key: Option<String>,
}

/// User/room directory.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn room_members(&self, room_id: &str) -> Result<Vec<Member>, TransportError>;

    async fn public_key(&self, user_id: &str) -> Result<Option<String>, TransportError>;

    async fn publish_public_key(&self, user_id: &str, public_key_b64: &str) -> Result<(), TransportError>;
}

/// Real-time channel: at-least-once, in order per room.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, user_id: &str) -> Result<UnboundedReceiver<ServerEvent>, TransportError>;

    async fn send(&self, user_id: &str, event: ClientEvent) -> Result<(), TransportError>;

    async fn disconnect(&self, user_id: &str) -> Result<(), TransportError>;
}

/// REST history fetch.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn messages(&self, room_id: &str) -> Result<Vec<StoredMessage>, TransportError>;
}

/// Object storage for attachment blobs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put_blob(&self, bytes: Vec<u8>) -> Result<String, TransportError>;

    async fn get_blob(&self, url: &str) -> Result<Vec<u8>, TransportError>;
}

/// The four collaborator handles a session is built from.
#[derive(Clone)]
pub struct Collaborators {
    pub directory: Arc<dyn Directory>,
    pub transport: Arc<dyn Transport>,
    pub history: Arc<dyn HistoryStore>,
    pub blobs: Arc<dyn BlobStore>,
}

impl Collaborators {
    /// Use one backend object for every role.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: Directory + Transport + HistoryStore + BlobStore + 'static,
    {
        Self {
            directory: backend.clone(),
            transport: backend.clone(),
            history: backend.clone(),
            blobs: backend,
        }
    }
}
