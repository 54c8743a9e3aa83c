//! Authenticated Encryption with Associated Data
//!
//! Uses AES-256-GCM.
//! Key size: 32 bytes.  IV: 12 bytes (random, fresh per call).  Tag: 16 bytes.
//!
//! Two shapes are offered:
//!   - detached: `(ciphertext+tag, iv)`, for envelopes that carry the IV
//!     in its own wire field
//!   - combined: `[ iv (12 bytes) | ciphertext + tag ]`, for local storage
//!     and key wrapping

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use zeroize::Zeroizing;

use crate::{error::CryptoError, random};

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

pub const ALGORITHM: &str = "AES-256-GCM";

/// Encrypt under a freshly drawn IV. Returns `(ciphertext+tag, iv)`.
pub fn encrypt(
    key: &[u8; KEY_LEN],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<(Vec<u8>, [u8; IV_LEN]), CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::AeadEncrypt)?;
    let iv = random::array::<IV_LEN>()?;

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::AeadEncrypt)?;

    Ok((ciphertext, iv))
}

pub fn decrypt(
    key: &[u8; KEY_LEN],
    iv: &[u8],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if iv.len() != IV_LEN || ciphertext.len() < TAG_LEN {
        return Err(CryptoError::DecryptionFailed);
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::DecryptionFailed)?;

    let plaintext = cipher
        .decrypt(Nonce::from_slice(iv), Payload { msg: ciphertext, aad })
        .map_err(|_| CryptoError::DecryptionFailed)?;

    Ok(Zeroizing::new(plaintext))
}

/// Encrypt and prepend the IV.
pub fn seal_combined(key: &[u8; KEY_LEN], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let (ciphertext, iv) = encrypt(key, plaintext, aad)?;
    let mut out = Vec::with_capacity(IV_LEN + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt wire-format bytes (iv || ciphertext+tag).
pub fn open_combined(
    key: &[u8; KEY_LEN],
    data: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if data.len() < IV_LEN + TAG_LEN {
        return Err(CryptoError::DecryptionFailed);
    }
    let (iv, ct) = data.split_at(IV_LEN);
    decrypt(key, iv, ct, aad)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_iv_per_call() {
        let key = [7u8; KEY_LEN];
        let (ct1, iv1) = encrypt(&key, b"same", b"").unwrap();
        let (ct2, iv2) = encrypt(&key, b"same", b"").unwrap();
        assert_ne!(iv1, iv2);
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn aad_mismatch_fails() {
        let key = [1u8; KEY_LEN];
        let sealed = seal_combined(&key, b"payload", b"ctx-a").unwrap();
        assert!(matches!(
            open_combined(&key, &sealed, b"ctx-b"),
            Err(CryptoError::DecryptionFailed)
        ));
        assert_eq!(open_combined(&key, &sealed, b"ctx-a").unwrap().as_slice(), b"payload");
    }

    #[test]
    fn short_input_rejected() {
        let key = [1u8; KEY_LEN];
        assert!(matches!(open_combined(&key, &[0u8; 20], b""), Err(CryptoError::DecryptionFailed)));
        assert!(matches!(decrypt(&key, &[0u8; 8], &[0u8; 32], b""), Err(CryptoError::DecryptionFailed)));
    }
}
