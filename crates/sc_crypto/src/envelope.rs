//! Envelope codec: seal a message for N recipients, open it as one of them.
//!
//! seal:
//!   1. every recipient must carry a public key, checked before any key or
//!      ciphertext exists (all-or-nothing)
//!   2. draw one fresh `MessageKey`
//!   3. AES-256-GCM the plaintext under it with a fresh 12-byte IV
//!   4. wrap the raw key once per recipient, preserving input order
//!
//! open:
//!   1. locate the caller's own recipient entry (`NotARecipient` otherwise)
//!   2. unwrap the message key with the local private key
//!   3. authenticate and decrypt; any failure is `DecryptionFailed`
//!
//! The returned `MessageKey` stays with the caller so the same message's
//! attachments can be sealed/opened before the key is dropped.

use std::collections::HashSet;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::{
    aead,
    error::CryptoError,
    keys::{MessageKey, PrivateKey, PublicKey},
    wrap,
};

/// Identifier carried in `encryption.algorithm`: key wrap + content cipher.
pub const ALGORITHM: &str = "X25519-HKDF-SHA256+AES-256-GCM";

const CONTENT_AAD: &[u8] = b"sc-content-v1";

/// One intended reader as known to the directory at send time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub user_id: String,
    pub public_key: Option<PublicKey>,
}

impl Recipient {
    pub fn new(user_id: impl Into<String>, public_key: Option<PublicKey>) -> Self {
        Self {
            user_id: user_id.into(),
            public_key,
        }
    }
}

/// `{ userId, encryptedKey }` entry of an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientKey {
    pub user_id: String,
    /// Base64 wrapped message key (see `wrap`).
    pub encrypted_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub algorithm: String,
    /// Base64 AES-256-GCM ciphertext + tag.
    pub ciphertext: String,
    /// Base64 12-byte IV of the content encryption.
    pub iv: String,
    /// Fixed at send time; not updated when membership changes later.
    pub recipients: Vec<RecipientKey>,
}

impl Envelope {
    pub fn recipient(&self, user_id: &str) -> Option<&RecipientKey> {
        self.recipients.iter().find(|r| r.user_id == user_id)
    }

    pub fn is_addressed_to(&self, user_id: &str) -> bool {
        self.recipient(user_id).is_some()
    }
}

/// Output of `seal`: the envelope plus the still-open message key.
#[derive(Debug)]
pub struct Sealed {
    pub envelope: Envelope,
    pub key: MessageKey,
}

/// Output of `open`.
pub struct Opened {
    pub plaintext: Zeroizing<Vec<u8>>,
    pub key: MessageKey,
}

impl std::fmt::Debug for Opened {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Opened")
            .field("plaintext_len", &self.plaintext.len())
            .finish_non_exhaustive()
    }
}

impl Opened {
    pub fn text(&self) -> Result<String, CryptoError> {
        String::from_utf8(self.plaintext.to_vec()).map_err(|_| CryptoError::DecryptionFailed)
    }
}

pub fn seal(plaintext: &[u8], recipients: &[Recipient]) -> Result<Sealed, CryptoError> {
    if recipients.is_empty() {
        return Err(CryptoError::NoRecipients);
    }
    // Checked up front: a missing key must abort before anything is generated.
    let mut keyed = Vec::with_capacity(recipients.len());
    let mut seen = HashSet::new();
    for recipient in recipients {
        let public_key = recipient
            .public_key
            .as_ref()
            .ok_or_else(|| CryptoError::MissingRecipientKey {
                user_id: recipient.user_id.clone(),
            })?;
        if seen.insert(recipient.user_id.as_str()) {
            keyed.push((recipient.user_id.as_str(), public_key));
        }
    }

    let key = MessageKey::generate()?;
    let (ciphertext, iv) = aead::encrypt(key.as_bytes(), plaintext, CONTENT_AAD)?;

    let recipients = keyed
        .into_iter()
        .map(|(user_id, public_key)| {
            let wrapped = wrap::wrap_key(public_key, &key, user_id)?;
            Ok(RecipientKey {
                user_id: user_id.to_string(),
                encrypted_key: STANDARD.encode(wrapped),
            })
        })
        .collect::<Result<Vec<_>, CryptoError>>()?;

    tracing::debug!(
        target: "secure_chat",
        event = "seal_ok",
        recipients = recipients.len(),
        plaintext_bytes = plaintext.len()
    );

    Ok(Sealed {
        envelope: Envelope {
            algorithm: ALGORITHM.to_string(),
            ciphertext: STANDARD.encode(ciphertext),
            iv: STANDARD.encode(iv),
            recipients,
        },
        key,
    })
}

pub fn open(envelope: &Envelope, self_user_id: &str, private_key: &PrivateKey) -> Result<Opened, CryptoError> {
    let entry = envelope
        .recipient(self_user_id)
        .ok_or(CryptoError::NotARecipient)?;

    if envelope.algorithm != ALGORITHM {
        tracing::warn!(
            target: "secure_chat",
            event = "open_unknown_algorithm",
            algorithm = %envelope.algorithm
        );
        return Err(CryptoError::DecryptionFailed);
    }

    let wrapped = decode(&entry.encrypted_key)?;
    let key = wrap::unwrap_key(private_key, &wrapped, self_user_id)?;

    let iv = decode(&envelope.iv)?;
    let ciphertext = decode(&envelope.ciphertext)?;
    let plaintext = aead::decrypt(key.as_bytes(), &iv, &ciphertext, CONTENT_AAD)?;

    Ok(Opened { plaintext, key })
}

fn decode(field: &str) -> Result<Vec<u8>, CryptoError> {
    STANDARD.decode(field).map_err(|_| CryptoError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyPair;

    fn party(name: &str) -> (Recipient, KeyPair) {
        let pair = KeyPair::generate().unwrap();
        (Recipient::new(name, Some(pair.public)), pair)
    }

    fn flip_bit(b64: &str, byte: usize, bit: u8) -> String {
        let mut raw = STANDARD.decode(b64).unwrap();
        let idx = byte % raw.len();
        raw[idx] ^= 1 << bit;
        STANDARD.encode(raw)
    }

    #[test]
    fn round_trip_for_every_recipient() {
        let parties: Vec<_> = ["alice", "bob", "carol"].iter().map(|n| party(n)).collect();
        let recipients: Vec<_> = parties.iter().map(|(r, _)| r.clone()).collect();

        for plaintext in [&b""[..], b"hello", &[0xffu8; 4096][..], "héllo wörld".as_bytes()] {
            let sealed = seal(plaintext, &recipients).unwrap();
            assert_eq!(sealed.envelope.recipients.len(), 3);
            for (r, pair) in &parties {
                let opened = open(&sealed.envelope, &r.user_id, pair.private()).unwrap();
                assert_eq!(opened.plaintext.as_slice(), plaintext);
            }
        }
    }

    #[test]
    fn recipients_keep_input_order() {
        let parties: Vec<_> = ["zed", "amy", "kim"].iter().map(|n| party(n)).collect();
        let recipients: Vec<_> = parties.iter().map(|(r, _)| r.clone()).collect();
        let sealed = seal(b"x", &recipients).unwrap();
        let ids: Vec<_> = sealed.envelope.recipients.iter().map(|r| r.user_id.as_str()).collect();
        assert_eq!(ids, ["zed", "amy", "kim"]);
    }

    #[test]
    fn duplicate_recipient_wrapped_once() {
        let (bob, _) = party("bob");
        let sealed = seal(b"x", &[bob.clone(), bob]).unwrap();
        assert_eq!(sealed.envelope.recipients.len(), 1);
    }

    #[test]
    fn non_recipient_is_excluded() {
        let (alice, _) = party("alice");
        let (bob, _) = party("bob");
        let (_, carol) = party("carol");
        let sealed = seal(b"hello", &[alice, bob]).unwrap();
        assert!(matches!(
            open(&sealed.envelope, "carol", carol.private()),
            Err(CryptoError::NotARecipient)
        ));
    }

    #[test]
    fn missing_key_aborts_whole_seal() {
        let (alice, _) = party("alice");
        let bob = Recipient::new("bob", None);
        let err = seal(b"secret", &[alice, bob]).unwrap_err();
        assert!(matches!(err, CryptoError::MissingRecipientKey { ref user_id } if user_id == "bob"));
    }

    #[test]
    fn empty_recipient_list_refused() {
        assert!(matches!(seal(b"x", &[]), Err(CryptoError::NoRecipients)));
    }

    #[test]
    fn bit_flips_fail_authentication() {
        let (bob_r, bob) = party("bob");
        let sealed = seal(b"attack at dawn", &[bob_r]).unwrap();
        let ct_len = STANDARD.decode(&sealed.envelope.ciphertext).unwrap().len();

        for byte in 0..ct_len {
            for bit in [0u8, 3, 7] {
                let mut env = sealed.envelope.clone();
                env.ciphertext = flip_bit(&env.ciphertext, byte, bit);
                assert!(matches!(open(&env, "bob", bob.private()), Err(CryptoError::DecryptionFailed)));
            }
        }
        for byte in 0..aead::IV_LEN {
            let mut env = sealed.envelope.clone();
            env.iv = flip_bit(&env.iv, byte, 1);
            assert!(matches!(open(&env, "bob", bob.private()), Err(CryptoError::DecryptionFailed)));
        }
        for byte in 0..wrap::WRAPPED_LEN {
            let mut env = sealed.envelope.clone();
            env.recipients[0].encrypted_key = flip_bit(&env.recipients[0].encrypted_key, byte, 5);
            assert!(matches!(open(&env, "bob", bob.private()), Err(CryptoError::DecryptionFailed)));
        }
    }

    #[test]
    fn swapped_wrapped_keys_fail() {
        let (alice_r, alice) = party("alice");
        let (bob_r, _) = party("bob");
        let mut sealed = seal(b"x", &[alice_r, bob_r]).unwrap();
        let bob_key = sealed.envelope.recipients[1].encrypted_key.clone();
        sealed.envelope.recipients[0].encrypted_key = bob_key;
        assert!(matches!(
            open(&sealed.envelope, "alice", alice.private()),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn unknown_algorithm_refused() {
        let (bob_r, bob) = party("bob");
        let mut sealed = seal(b"x", &[bob_r]).unwrap();
        sealed.envelope.algorithm = "RSA-OAEP+AES-GCM".into();
        assert!(matches!(
            open(&sealed.envelope, "bob", bob.private()),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn envelope_json_shape() {
        let (bob_r, _) = party("bob");
        let sealed = seal(b"x", &[bob_r]).unwrap();
        let json = serde_json::to_value(&sealed.envelope).unwrap();
        assert_eq!(json["algorithm"], ALGORITHM);
        assert!(json["recipients"][0]["userId"].is_string());
        assert!(json["recipients"][0]["encryptedKey"].is_string());
        assert_eq!(STANDARD.decode(json["iv"].as_str().unwrap()).unwrap().len(), aead::IV_LEN);
    }
}
