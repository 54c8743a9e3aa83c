use thiserror::Error;

use sc_crypto::CryptoError;
use sc_proto::ProtoError;
use sc_store::StoreError;

/// Failure reported by an external collaborator (directory, real-time
/// channel, history, object storage).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Not connected")]
    NotConnected,

    #[error("Unknown room: {0}")]
    UnknownRoom(String),

    #[error("Not a member of room {0}")]
    NotAMember(String),

    #[error("Blob not found: {0}")]
    BlobNotFound(String),

    #[error("Rejected by server: {0}")]
    Rejected(#[from] ProtoError),

    #[error("Transport failure: {0}")]
    Io(String),
}

#[derive(Debug, Error)]
pub enum CustodyError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Key storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Directory error: {0}")]
    Directory(#[from] TransportError),
}

impl CustodyError {
    pub fn is_crypto_unavailable(&self) -> bool {
        matches!(self, CustodyError::Crypto(CryptoError::CryptoUnavailable(_)))
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Policy refusal: the conversation is expected to be private but some
    /// key is missing. Nothing was transmitted.
    #[error("Cannot send securely: missing encryption keys for: {}", missing.join(", "))]
    EncryptionUnavailable { missing: Vec<String> },

    #[error("Message has neither text nor attachments")]
    EmptyDraft,

    #[error("Attachment {name} is {size} bytes, limit is {limit}")]
    AttachmentTooLarge { name: String, size: u64, limit: u64 },

    #[error("Attachment content unavailable")]
    AttachmentUnavailable,

    #[error("Duplicate client message id {0}")]
    DuplicateMessageId(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Custody(#[from] CustodyError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Crypto task aborted: {0}")]
    Task(String),
}
