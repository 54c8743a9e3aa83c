//! Message payloads.
//!
//! `WireMessage` is the field-exact JSON document that crosses the
//! real-time channel and is stored in room history. `ChatMessage` is the
//! typed view every handler works with: a message is either entirely
//! plaintext or entirely encrypted, never a mix.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sc_crypto::{AttachmentEncryption, Envelope, RecipientKey};

use crate::error::ProtoError;

// ── Wire format ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAttachment {
    pub url: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    /// Stored (ciphertext) size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<AttachmentEncryption>,
}

/// `encryption` block of a message. The ciphertext itself rides in `content`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EncryptionInfo {
    #[serde(default)]
    pub algorithm: String,
    #[serde(default)]
    pub iv: String,
    #[serde(default)]
    pub recipients: Vec<RecipientKey>,
}

impl EncryptionInfo {
    /// Document stores hand back `{}` / `{recipients: []}` for messages that
    /// never had encryption.
    fn is_blank(&self) -> bool {
        self.algorithm.is_empty() && self.iv.is_empty() && self.recipients.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub room_id: String,
    pub sender: String,
    /// Ciphertext (base64) when `encryption` is present, else plaintext.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<WireAttachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<EncryptionInfo>,
}

impl WireMessage {
    /// Server-side acceptance check: a room and something to deliver.
    pub fn validate_for_send(&self) -> Result<(), ProtoError> {
        if self.room_id.trim().is_empty() {
            return Err(ProtoError::MissingRoom);
        }
        if self.content.trim().is_empty() && self.attachments.is_empty() {
            return Err(ProtoError::EmptyMessage);
        }
        Ok(())
    }
}

/// A message as persisted by the server: the wire payload plus server
/// metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(flatten)]
    pub message: WireMessage,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read_by: Vec<String>,
}

// ── Typed view ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageMeta {
    pub room_id: String,
    pub sender: String,
    pub client_message_id: Option<String>,
}

/// Cleartext attachment metadata; type and size are not treated as secret.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttachmentMeta {
    pub url: String,
    pub content_type: Option<String>,
    pub original_name: Option<String>,
    pub size: Option<u64>,
    pub original_type: Option<String>,
    pub original_size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedAttachment {
    pub meta: AttachmentMeta,
    pub encryption: AttachmentEncryption,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaintextMessage {
    pub meta: MessageMeta,
    pub content: String,
    pub attachments: Vec<AttachmentMeta>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedMessage {
    pub meta: MessageMeta,
    /// Content ciphertext, IV and per-recipient wrapped keys.
    pub envelope: Envelope,
    pub attachments: Vec<EncryptedAttachment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatMessage {
    Plaintext(PlaintextMessage),
    Encrypted(EncryptedMessage),
}

impl ChatMessage {
    pub fn meta(&self) -> &MessageMeta {
        match self {
            ChatMessage::Plaintext(m) => &m.meta,
            ChatMessage::Encrypted(m) => &m.meta,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, ChatMessage::Encrypted(_))
    }
}

impl From<WireAttachment> for AttachmentMeta {
    fn from(a: WireAttachment) -> Self {
        Self {
            url: a.url,
            content_type: a.content_type,
            original_name: a.original_name,
            size: a.size,
            original_type: a.original_type,
            original_size: a.original_size,
        }
    }
}

impl AttachmentMeta {
    fn into_wire(self, encryption: Option<AttachmentEncryption>) -> WireAttachment {
        WireAttachment {
            url: self.url,
            content_type: self.content_type,
            original_name: self.original_name,
            size: self.size,
            original_type: self.original_type,
            original_size: self.original_size,
            encryption,
        }
    }
}

impl TryFrom<WireMessage> for ChatMessage {
    type Error = ProtoError;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        let meta = MessageMeta {
            room_id: wire.room_id,
            sender: wire.sender,
            client_message_id: wire.client_message_id,
        };

        match wire.encryption.filter(|e| !e.is_blank()) {
            None => {
                let attachments = wire
                    .attachments
                    .into_iter()
                    .map(|a| {
                        if a.encryption.is_some() {
                            return Err(ProtoError::Malformed(
                                "encrypted attachment on a plaintext message".into(),
                            ));
                        }
                        Ok(AttachmentMeta::from(a))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ChatMessage::Plaintext(PlaintextMessage {
                    meta,
                    content: wire.content,
                    attachments,
                }))
            }
            Some(info) => {
                if info.recipients.is_empty() {
                    return Err(ProtoError::Malformed("encryption without recipients".into()));
                }
                let attachments = wire
                    .attachments
                    .into_iter()
                    .map(|mut a| match a.encryption.take() {
                        Some(encryption) => Ok(EncryptedAttachment {
                            meta: AttachmentMeta::from(a),
                            encryption,
                        }),
                        None => Err(ProtoError::Malformed(
                            "plaintext attachment on an encrypted message".into(),
                        )),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ChatMessage::Encrypted(EncryptedMessage {
                    meta,
                    envelope: Envelope {
                        algorithm: info.algorithm,
                        ciphertext: wire.content,
                        iv: info.iv,
                        recipients: info.recipients,
                    },
                    attachments,
                }))
            }
        }
    }
}

impl From<ChatMessage> for WireMessage {
    fn from(msg: ChatMessage) -> Self {
        match msg {
            ChatMessage::Plaintext(m) => WireMessage {
                room_id: m.meta.room_id,
                sender: m.meta.sender,
                content: m.content,
                attachments: m.attachments.into_iter().map(|a| a.into_wire(None)).collect(),
                client_message_id: m.meta.client_message_id,
                encryption: None,
            },
            ChatMessage::Encrypted(m) => WireMessage {
                room_id: m.meta.room_id,
                sender: m.meta.sender,
                content: m.envelope.ciphertext,
                attachments: m
                    .attachments
                    .into_iter()
                    .map(|a| a.meta.into_wire(Some(a.encryption)))
                    .collect(),
                client_message_id: m.meta.client_message_id,
                encryption: Some(EncryptionInfo {
                    algorithm: m.envelope.algorithm,
                    iv: m.envelope.iv,
                    recipients: m.envelope.recipients,
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encrypted_doc() -> serde_json::Value {
        json!({
            "_id": "m1",
            "roomId": "r1",
            "sender": "alice",
            "content": "Y2lwaGVy",
            "attachments": [{
                "url": "mem://blob/1",
                "type": "image/png",
                "originalName": "cat.png",
                "size": 2064,
                "originalType": "image/png",
                "originalSize": 2048,
                "encryption": { "algorithm": "AES-256-GCM", "iv": "AAAAAAAAAAAAAAAA" }
            }],
            "clientMessageId": "c-1",
            "encryption": {
                "algorithm": "X25519-HKDF-SHA256+AES-256-GCM",
                "iv": "AAAAAAAAAAAAAAAA",
                "recipients": [{ "userId": "bob", "encryptedKey": "a2V5" }]
            },
            "createdAt": "2026-01-02T03:04:05Z",
            "readBy": ["alice"]
        })
    }

    #[test]
    fn stored_message_parses_field_exact_document() {
        let stored: StoredMessage = serde_json::from_value(encrypted_doc()).unwrap();
        assert_eq!(stored.id, "m1");
        assert_eq!(stored.message.client_message_id.as_deref(), Some("c-1"));
        assert_eq!(stored.message.attachments[0].content_type.as_deref(), Some("image/png"));
        assert_eq!(stored.read_by, vec!["alice".to_string()]);
    }

    #[test]
    fn encrypted_document_becomes_encrypted_variant() {
        let stored: StoredMessage = serde_json::from_value(encrypted_doc()).unwrap();
        let msg = ChatMessage::try_from(stored.message.clone()).unwrap();
        let ChatMessage::Encrypted(enc) = &msg else {
            panic!("expected encrypted variant");
        };
        assert_eq!(enc.envelope.ciphertext, "Y2lwaGVy");
        assert_eq!(enc.envelope.recipients[0].user_id, "bob");
        assert_eq!(enc.attachments[0].meta.original_size, Some(2048));

        let back = WireMessage::from(msg);
        assert_eq!(back, stored.message);
    }

    #[test]
    fn blank_encryption_object_is_plaintext() {
        let wire: WireMessage = serde_json::from_value(json!({
            "roomId": "r1",
            "sender": "alice",
            "content": "hi",
            "encryption": { "recipients": [] }
        }))
        .unwrap();
        assert!(matches!(ChatMessage::try_from(wire).unwrap(), ChatMessage::Plaintext(_)));
    }

    #[test]
    fn partial_states_are_rejected() {
        let mut wire: WireMessage = serde_json::from_value(encrypted_doc()).unwrap();
        wire.attachments[0].encryption = None;
        assert!(matches!(ChatMessage::try_from(wire), Err(ProtoError::Malformed(_))));

        let mut wire: WireMessage = serde_json::from_value(encrypted_doc()).unwrap();
        wire.encryption.as_mut().unwrap().recipients.clear();
        assert!(matches!(ChatMessage::try_from(wire), Err(ProtoError::Malformed(_))));

        let mut wire: WireMessage = serde_json::from_value(encrypted_doc()).unwrap();
        wire.encryption = None;
        assert!(matches!(ChatMessage::try_from(wire), Err(ProtoError::Malformed(_))));
    }

    #[test]
    fn plaintext_omits_encryption_field() {
        let msg = ChatMessage::Plaintext(PlaintextMessage {
            meta: MessageMeta {
                room_id: "r1".into(),
                sender: "alice".into(),
                client_message_id: None,
            },
            content: "hello".into(),
            attachments: vec![],
        });
        let json = serde_json::to_value(WireMessage::from(msg)).unwrap();
        assert!(json.get("encryption").is_none());
        assert_eq!(json["content"], "hello");
    }

    #[test]
    fn send_validation() {
        let mut wire = WireMessage {
            room_id: "r1".into(),
            sender: "alice".into(),
            content: "   ".into(),
            attachments: vec![],
            client_message_id: None,
            encryption: None,
        };
        assert!(matches!(wire.validate_for_send(), Err(ProtoError::EmptyMessage)));
        wire.content = "hi".into();
        assert!(wire.validate_for_send().is_ok());
        wire.room_id.clear();
        assert!(matches!(wire.validate_for_send(), Err(ProtoError::MissingRoom)));
    }
}
