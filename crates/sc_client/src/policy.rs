//! Degradation policy: what happens when encryption cannot be used.
//!
//! Sending: the configured `SendPolicy` decides between refusing, warning
//! and falling back to plaintext. Receiving: any message that cannot be
//! decrypted renders as `PLACEHOLDER`, never as raw ciphertext, and never
//! stops the rest of the room from rendering.

use sc_crypto::{CryptoError, PublicKey, Recipient};

use crate::{collaborators::Member, config::SendPolicy, error::PipelineError};

/// Shown in place of content that cannot be decrypted on this device.
pub const PLACEHOLDER: &str = "message content unavailable";

#[derive(Debug)]
pub enum SendPlan {
    Encrypt(Vec<Recipient>),
    Plaintext { warning: Option<String> },
}

/// Decide how an outgoing message for a room is sent.
///
/// The sender is always a recipient of their own message; if the directory
/// omits them they are appended with `own_key`.
pub fn plan_send(
    policy: SendPolicy,
    crypto_available: bool,
    self_user_id: &str,
    own_key: Option<&PublicKey>,
    members: &[Member],
) -> Result<SendPlan, PipelineError> {
    if policy == SendPolicy::Plaintext {
        return Ok(SendPlan::Plaintext { warning: None });
    }
    if !crypto_available {
        return match policy {
            SendPolicy::Prefer => Ok(SendPlan::Plaintext {
                warning: Some("encryption unavailable on this device; sent as plaintext".into()),
            }),
            _ => Err(PipelineError::EncryptionUnavailable {
                missing: vec![self_user_id.to_string()],
            }),
        };
    }

    let mut recipients = Vec::with_capacity(members.len() + 1);
    let mut missing = Vec::new();
    let mut saw_self = false;

    for member in members {
        let key = if member.user_id == self_user_id {
            saw_self = true;
            own_key.cloned()
        } else {
            parse_member_key(member)
        };
        if key.is_none() {
            missing.push(member.user_id.clone());
        }
        recipients.push(Recipient::new(member.user_id.clone(), key));
    }
    if !saw_self {
        match own_key {
            Some(key) => recipients.push(Recipient::new(self_user_id, Some(key.clone()))),
            None => missing.push(self_user_id.to_string()),
        }
    }

    if missing.is_empty() {
        return Ok(SendPlan::Encrypt(recipients));
    }
    match policy {
        SendPolicy::Prefer => Ok(SendPlan::Plaintext {
            warning: Some(format!(
                "sent without encryption; missing keys for {}",
                missing.join(", ")
            )),
        }),
        _ => Err(PipelineError::EncryptionUnavailable { missing }),
    }
}

fn parse_member_key(member: &Member) -> Option<PublicKey> {
    let b64 = member.public_key.as_deref()?;
    match PublicKey::from_b64(b64) {
        Ok(key) => Some(key),
        Err(err) => {
            tracing::warn!(
                target: "secure_chat",
                event = "bad_directory_key",
                user_id = %member.user_id,
                error = %err,
            );
            None
        }
    }
}

/// Why an encrypted message could not be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unavailable {
    /// This device holds no private key (never generated, or cleared).
    NoLocalKey,
    /// The envelope was not addressed to this user.
    NotARecipient,
    /// Tampering, wrong key or corrupt envelope.
    DecryptionFailed,
    /// Encryption primitives are off in this process.
    CryptoUnavailable,
    /// Payload mixes encrypted and plaintext parts.
    Malformed,
}

impl From<&CryptoError> for Unavailable {
    fn from(err: &CryptoError) -> Self {
        match err {
            CryptoError::NotARecipient => Unavailable::NotARecipient,
            CryptoError::CryptoUnavailable(_) => Unavailable::CryptoUnavailable,
            _ => Unavailable::DecryptionFailed,
        }
    }
}

/// Display-ready message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedBody {
    Plaintext(String),
    Decrypted(String),
    Unavailable(Unavailable),
}

impl RenderedBody {
    pub fn display_text(&self) -> &str {
        match self {
            RenderedBody::Plaintext(text) | RenderedBody::Decrypted(text) => text,
            RenderedBody::Unavailable(_) => PLACEHOLDER,
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, RenderedBody::Unavailable(_))
    }
}
