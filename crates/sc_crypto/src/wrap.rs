//! Key wrapping: seal a message key to one recipient's public key.
//!
//! Wire layout of a wrapped key (before base64):
//!   [ ephemeral X25519 public (32) | iv (12) | AES-256-GCM(key) (32 + 16 tag) ]
//!
//! The recipient's user id is the associated data, so a wrapped key copied
//! into another recipient entry fails to open.

use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

use crate::{
    aead,
    error::CryptoError,
    kdf,
    keys::{MessageKey, PrivateKey, PublicKey, KEY_LEN},
    random,
};

pub const WRAPPED_LEN: usize = KEY_LEN + aead::IV_LEN + KEY_LEN + aead::TAG_LEN;

pub fn wrap_key(recipient: &PublicKey, key: &MessageKey, user_id: &str) -> Result<Vec<u8>, CryptoError> {
    let ephemeral = StaticSecret::from(random::array::<KEY_LEN>()?);
    let ephemeral_pub = X25519Public::from(&ephemeral);

    let shared = ephemeral.diffie_hellman(&recipient.to_x25519());
    if !shared.was_contributory() {
        return Err(CryptoError::InvalidKey(format!(
            "public key for {user_id} is a low-order point"
        )));
    }
    let kek = kdf::wrap_key_from_dh(shared.as_bytes(), ephemeral_pub.as_bytes(), recipient.as_bytes())?;
    let sealed = aead::seal_combined(&kek, key.as_bytes(), user_id.as_bytes())?;

    let mut out = Vec::with_capacity(WRAPPED_LEN);
    out.extend_from_slice(ephemeral_pub.as_bytes());
    out.extend_from_slice(&sealed);
    Ok(out)
}

pub fn unwrap_key(private: &PrivateKey, wrapped: &[u8], user_id: &str) -> Result<MessageKey, CryptoError> {
    if wrapped.len() != WRAPPED_LEN {
        return Err(CryptoError::DecryptionFailed);
    }
    let (eph_bytes, sealed) = wrapped.split_at(KEY_LEN);
    let eph: [u8; KEY_LEN] = eph_bytes.try_into().map_err(|_| CryptoError::DecryptionFailed)?;

    let shared = private.to_x25519().diffie_hellman(&X25519Public::from(eph));
    if !shared.was_contributory() {
        return Err(CryptoError::DecryptionFailed);
    }
    let recipient_pub = private.public_key();
    let kek = kdf::wrap_key_from_dh(shared.as_bytes(), &eph, recipient_pub.as_bytes())?;
    let raw = aead::open_combined(&kek, sealed, user_id.as_bytes())?;
    MessageKey::from_bytes(&raw)
}
