//! Display-ready messages and lazily fetched attachments.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use zeroize::Zeroizing;

use sc_crypto::{attachment, AttachmentEncryption, MessageKey};
use sc_proto::AttachmentMeta;

use crate::{
    collaborators::BlobStore,
    error::PipelineError,
    policy::RenderedBody,
};

#[derive(Debug, Clone)]
pub struct RenderedMessage {
    /// Server id; `None` for a local echo not yet acknowledged.
    pub id: Option<String>,
    pub room_id: String,
    pub sender: String,
    pub client_message_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub encrypted: bool,
    pub body: RenderedBody,
    pub attachments: Vec<AttachmentHandle>,
}

impl RenderedMessage {
    pub fn text(&self) -> &str {
        self.body.display_text()
    }
}

#[derive(Debug, Clone)]
enum Source {
    Plain,
    Encrypted {
        encryption: AttachmentEncryption,
        key: Arc<MessageKey>,
    },
    /// Encrypted, but the message key could not be recovered.
    Locked,
    /// Local echo: the blob is still being uploaded.
    Uploading,
}

/// An attachment whose bytes are fetched and, if needed, decrypted on demand.
/// Holds the parent message key for exactly as long as the handle lives.
#[derive(Debug, Clone)]
pub struct AttachmentHandle {
    pub meta: AttachmentMeta,
    source: Source,
}

impl AttachmentHandle {
    pub(crate) fn plain(meta: AttachmentMeta) -> Self {
        Self { meta, source: Source::Plain }
    }

    pub(crate) fn encrypted(meta: AttachmentMeta, encryption: AttachmentEncryption, key: Arc<MessageKey>) -> Self {
        Self {
            meta,
            source: Source::Encrypted { encryption, key },
        }
    }

    pub(crate) fn locked(meta: AttachmentMeta) -> Self {
        Self { meta, source: Source::Locked }
    }

    pub(crate) fn uploading(meta: AttachmentMeta) -> Self {
        Self { meta, source: Source::Uploading }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self.source, Source::Encrypted { .. } | Source::Locked)
    }

    pub fn is_available(&self) -> bool {
        matches!(self.source, Source::Plain | Source::Encrypted { .. })
    }

    /// Download the blob and return the original bytes. Encrypted blobs that
    /// fail authentication yield an error, never partial media.
    pub async fn fetch(&self, blobs: &dyn BlobStore) -> Result<Zeroizing<Vec<u8>>, PipelineError> {
        match &self.source {
            Source::Locked | Source::Uploading => Err(PipelineError::AttachmentUnavailable),
            Source::Plain => Ok(Zeroizing::new(blobs.get_blob(&self.meta.url).await?)),
            Source::Encrypted { encryption, key } => {
                let ciphertext = blobs.get_blob(&self.meta.url).await?;
                let encryption = encryption.clone();
                let key = key.clone();
                let opened = tokio::task::spawn_blocking(move || {
                    attachment::open_attachment(&ciphertext, &encryption, &key)
                })
                .await
                .map_err(|e| PipelineError::Task(e.to_string()))?;
                match opened {
                    Ok(bytes) => Ok(bytes),
                    Err(err) => {
                        tracing::warn!(
                            target: "secure_chat",
                            event = "attachment_decrypt_failed",
                            url = %self.meta.url,
                            error = %err,
                        );
                        Err(err.into())
                    }
                }
            }
        }
    }
}
