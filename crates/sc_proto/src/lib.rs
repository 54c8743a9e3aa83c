//! sc_proto — Wire types for Secure Chat
//!
//! All on-wire types are JSON with camelCase field names, matching the
//! message documents the chat server persists and fans out.
//!
//! # Modules
//! - `message` — wire payload, server-stored message, typed `ChatMessage`
//! - `events`  — real-time channel frames (client → server, server → client)
//! - `error`   — payload validation errors

pub mod error;
pub mod events;
pub mod message;

pub use error::ProtoError;
pub use events::{ClientEvent, Presence, ServerEvent};
pub use message::{
    AttachmentMeta, ChatMessage, EncryptedAttachment, EncryptedMessage, EncryptionInfo,
    MessageMeta, PlaintextMessage, StoredMessage, WireAttachment, WireMessage,
};
