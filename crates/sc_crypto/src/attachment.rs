//! Attachment cipher.
//!
//! Attachments are sealed under the parent message's `MessageKey` with their
//! own fresh IV; no key is derived or wrapped per attachment. The ciphertext
//! blob travels separately (object storage), only `{algorithm, iv}` rides in
//! the message. Cleartext type and size are left to the caller as metadata.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::{aead, error::CryptoError, keys::MessageKey};

pub const ALGORITHM: &str = aead::ALGORITHM;

const ATTACHMENT_AAD: &[u8] = b"sc-attachment-v1";

/// `attachments[].encryption` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentEncryption {
    pub algorithm: String,
    /// Base64 12-byte IV.
    pub iv: String,
}

#[derive(Debug)]
pub struct SealedAttachment {
    pub ciphertext: Vec<u8>,
    pub iv: [u8; aead::IV_LEN],
}

impl SealedAttachment {
    pub fn encryption(&self) -> AttachmentEncryption {
        AttachmentEncryption {
            algorithm: ALGORITHM.to_string(),
            iv: STANDARD.encode(self.iv),
        }
    }
}

pub fn seal_attachment(file_bytes: &[u8], key: &MessageKey) -> Result<SealedAttachment, CryptoError> {
    let (ciphertext, iv) = aead::encrypt(key.as_bytes(), file_bytes, ATTACHMENT_AAD)?;
    Ok(SealedAttachment { ciphertext, iv })
}

/// Any failure leaves nothing usable: no partial media is ever returned.
pub fn open_attachment(
    ciphertext: &[u8],
    encryption: &AttachmentEncryption,
    key: &MessageKey,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if encryption.algorithm != ALGORITHM {
        return Err(CryptoError::DecryptionFailed);
    }
    let iv = STANDARD
        .decode(&encryption.iv)
        .map_err(|_| CryptoError::DecryptionFailed)?;
    aead::decrypt(key.as_bytes(), &iv, ciphertext, ATTACHMENT_AAD)
}
