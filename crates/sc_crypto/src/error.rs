use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// The OS random source could not be read; encryption features are off
    /// for this process but plaintext messaging keeps working.
    #[error("Cryptographic primitives unavailable: {0}")]
    CryptoUnavailable(String),

    #[error("Recipient {user_id} has no published public key")]
    MissingRecipientKey { user_id: String },

    #[error("Envelope has no recipients")]
    NoRecipients,

    #[error("Message is not addressed to this identity")]
    NotARecipient,

    /// Authentication failure, wrong key, or a structurally corrupt envelope.
    /// Never accompanied by partial plaintext.
    #[error("Decryption failed (authentication tag mismatch or corrupt envelope)")]
    DecryptionFailed,

    #[error("AEAD encryption failed")]
    AeadEncrypt,

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}

impl CryptoError {
    /// True for failures the degradation policy renders as a placeholder.
    pub fn is_undecryptable(&self) -> bool {
        matches!(self, CryptoError::DecryptionFailed | CryptoError::NotARecipient)
    }
}
