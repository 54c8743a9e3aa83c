//! Real-time channel frames.
//!
//! Typing and presence are relayed as-is; only `SendMessage` /
//! `ReceiveMessage` carry message payloads, and the server treats those as
//! opaque.

use serde::{Deserialize, Serialize};

use crate::message::{StoredMessage, WireMessage};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    JoinRoom {
        #[serde(rename = "roomId")]
        room_id: String,
    },
    LeaveRoom {
        #[serde(rename = "roomId")]
        room_id: String,
    },
    SendMessage(WireMessage),
    Typing {
        #[serde(rename = "roomId")]
        room_id: String,
        #[serde(rename = "isTyping")]
        is_typing: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Online,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    ReceiveMessage(StoredMessage),
    UserTyping {
        #[serde(rename = "roomId")]
        room_id: String,
        #[serde(rename = "userId")]
        user_id: String,
        #[serde(rename = "isTyping")]
        is_typing: bool,
    },
    UserOnline {
        #[serde(rename = "userId")]
        user_id: String,
        status: Presence,
    },
}
