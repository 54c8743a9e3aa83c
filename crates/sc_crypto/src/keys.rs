//! Per-user asymmetric key material.
//!
//! Each user identity owns one static X25519 keypair. The public half is
//! published to the user directory (base64 on the wire) so senders can wrap
//! message keys for it; the private half never leaves the device that
//! generated it. Losing the private half makes every envelope addressed to
//! that user permanently unopenable; there is no recovery path.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::ZeroizeOnDrop;

use crate::{error::CryptoError, random};

pub const KEY_LEN: usize = 32;

// ── Public key ────────────────────────────────────────────────────────────────

/// 32-byte X25519 public key, standard base64 on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicKey([u8; KEY_LEN]);

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!(
                "Public key must be {KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    pub fn to_b64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn from_b64(s: &str) -> Result<Self, CryptoError> {
        let bytes = STANDARD.decode(s.trim())?;
        Self::from_bytes(&bytes)
    }

    /// Human-readable fingerprint: BLAKE3 of the public key, truncated to
    /// 20 bytes, hex-encoded in groups of 4 for display.
    ///
    /// Example: "a1b2 c3d4 e5f6 7890 abcd ef01 2345 6789 0abc def0"
    pub fn fingerprint(&self) -> String {
        let hash = blake3::hash(&self.0);
        let hex = hex::encode(&hash.as_bytes()[..20]);
        hex.as_bytes()
            .chunks(4)
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub(crate) fn to_x25519(self) -> X25519Public {
        X25519Public::from(self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_b64())
    }
}

impl TryFrom<String> for PublicKey {
    type Error = CryptoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_b64(&value)
    }
}

impl From<PublicKey> for String {
    fn from(key: PublicKey) -> Self {
        key.to_b64()
    }
}

// ── Private key ───────────────────────────────────────────────────────────────

/// Static X25519 secret. Drop clears memory via ZeroizeOnDrop.
#[derive(Clone, ZeroizeOnDrop)]
pub struct PrivateKey {
    secret_bytes: [u8; KEY_LEN],
}

impl PrivateKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let secret_bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!(
                "Private key must be {KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self { secret_bytes })
    }

    pub fn secret_bytes(&self) -> &[u8; KEY_LEN] {
        &self.secret_bytes
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(X25519Public::from(&self.to_x25519()).to_bytes())
    }

    pub(crate) fn to_x25519(&self) -> StaticSecret {
        StaticSecret::from(self.secret_bytes)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

// ── Keypair ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct KeyPair {
    pub public: PublicKey,
    private: PrivateKey,
}

impl KeyPair {
    /// Fails with `CryptoUnavailable` when the OS random source is unusable.
    pub fn generate() -> Result<Self, CryptoError> {
        let private = PrivateKey {
            secret_bytes: random::array::<KEY_LEN>()?,
        };
        Ok(Self {
            public: private.public_key(),
            private,
        })
    }

    pub fn from_private(private: PrivateKey) -> Self {
        Self {
            public: private.public_key(),
            private,
        }
    }

    pub fn private(&self) -> &PrivateKey {
        &self.private
    }

    pub fn public_b64(&self) -> String {
        self.public.to_b64()
    }
}

// ── Per-message symmetric key ─────────────────────────────────────────────────

/// 256-bit AES key generated once per outgoing message. Never serialised and
/// never transmitted raw; it crosses the wire only wrapped per recipient.
/// One message key seals the content and every attachment of that message.
#[derive(ZeroizeOnDrop)]
pub struct MessageKey([u8; KEY_LEN]);

impl MessageKey {
    pub fn generate() -> Result<Self, CryptoError> {
        Ok(Self(random::array::<KEY_LEN>()?))
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; KEY_LEN] = bytes.try_into().map_err(|_| CryptoError::DecryptionFailed)?;
        Ok(Self(arr))
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MessageKey(<redacted>)")
    }
}
