use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("Message has neither content nor attachments")]
    EmptyMessage,

    #[error("Message is missing a room id")]
    MissingRoom,

    /// Violates the plaintext-xor-encrypted invariant.
    #[error("Malformed message: {0}")]
    Malformed(String),
}
