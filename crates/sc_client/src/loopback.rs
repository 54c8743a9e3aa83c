//! In-process chat server implementing every collaborator contract.
//!
//! Assigns ids and timestamps, persists messages in receipt order, and fans
//! each one out to every connected member of the room, sender included.
//! Message content is stored and relayed without inspection.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use sc_proto::{ClientEvent, Presence, ServerEvent, StoredMessage};

use crate::{
    collaborators::{BlobStore, Directory, HistoryStore, Member, Transport},
    error::TransportError,
};

const BLOB_SCHEME: &str = "mem://blob/";

#[derive(Default)]
struct ServerState {
    /// room id -> member ids, in join order
    rooms: HashMap<String, Vec<String>>,
    public_keys: HashMap<String, String>,
    publishes: HashMap<String, usize>,
    history: HashMap<String, Vec<StoredMessage>>,
    blobs: HashMap<String, Vec<u8>>,
    connections: HashMap<String, UnboundedSender<ServerEvent>>,
    /// (room, user) pairs that left the room's real-time channel
    muted: HashSet<(String, String)>,
}

impl ServerState {
    fn members(&self, room_id: &str) -> Result<&Vec<String>, TransportError> {
        self.rooms
            .get(room_id)
            .ok_or_else(|| TransportError::UnknownRoom(room_id.to_string()))
    }

    fn require_member(&self, room_id: &str, user_id: &str) -> Result<(), TransportError> {
        if self.members(room_id)?.iter().any(|m| m == user_id) {
            Ok(())
        } else {
            Err(TransportError::NotAMember(room_id.to_string()))
        }
    }

    fn fan_out(&self, room_id: &str, skip: Option<&str>, event: &ServerEvent) {
        let Some(members) = self.rooms.get(room_id) else {
            return;
        };
        for member in members {
            if Some(member.as_str()) == skip || self.muted.contains(&(room_id.to_string(), member.clone())) {
                continue;
            }
            if let Some(tx) = self.connections.get(member) {
                // A dropped receiver is a disconnected client.
                let _ = tx.send(event.clone());
            }
        }
    }

    fn broadcast(&self, skip: &str, event: &ServerEvent) {
        for (user, tx) in &self.connections {
            if user != skip {
                let _ = tx.send(event.clone());
            }
        }
    }
}

#[derive(Default)]
pub struct LoopbackServer {
    state: Mutex<ServerState>,
}

impl LoopbackServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn create_room(&self, room_id: &str, members: &[&str]) {
        self.state.lock().rooms.insert(
            room_id.to_string(),
            members.iter().map(|m| m.to_string()).collect(),
        );
    }

    pub fn add_member(&self, room_id: &str, user_id: &str) {
        let mut state = self.state.lock();
        let members = state.rooms.entry(room_id.to_string()).or_default();
        if !members.iter().any(|m| m == user_id) {
            members.push(user_id.to_string());
        }
    }

    /// How many times `user_id` has published a public key.
    pub fn publish_count(&self, user_id: &str) -> usize {
        self.state.lock().publishes.get(user_id).copied().unwrap_or(0)
    }

    /// Drop a published key, as if the profile record was reset.
    pub fn forget_public_key(&self, user_id: &str) {
        self.state.lock().public_keys.remove(user_id);
    }

    /// Everything persisted for a room, as stored.
    pub fn stored(&self, room_id: &str) -> Vec<StoredMessage> {
        self.state.lock().history.get(room_id).cloned().unwrap_or_default()
    }

    /// Number of messages accepted across all rooms.
    pub fn message_count(&self) -> usize {
        self.state.lock().history.values().map(Vec::len).sum()
    }

    /// Flip one byte of a stored blob.
    pub fn corrupt_blob(&self, url: &str, offset: usize) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        let blob = state
            .blobs
            .get_mut(url)
            .ok_or_else(|| TransportError::BlobNotFound(url.to_string()))?;
        let len = blob.len();
        if len == 0 {
            return Ok(());
        }
        blob[offset % len] ^= 0x01;
        Ok(())
    }

    /// Re-deliver a stored message to its room, as an at-least-once
    /// channel may.
    pub fn redeliver(&self, room_id: &str, message_id: &str) -> bool {
        let state = self.state.lock();
        let Some(stored) = state
            .history
            .get(room_id)
            .and_then(|h| h.iter().find(|m| m.id == message_id))
            .cloned()
        else {
            return false;
        };
        state.fan_out(room_id, None, &ServerEvent::ReceiveMessage(stored));
        true
    }
}

#[async_trait]
impl Directory for LoopbackServer {
    async fn room_members(&self, room_id: &str) -> Result<Vec<Member>, TransportError> {
        let state = self.state.lock();
        Ok(state
            .members(room_id)?
            .iter()
            .map(|user_id| Member {
                user_id: user_id.clone(),
                public_key: state.public_keys.get(user_id).cloned(),
            })
            .collect())
    }

    async fn public_key(&self, user_id: &str) -> Result<Option<String>, TransportError> {
        Ok(self.state.lock().public_keys.get(user_id).cloned())
    }

    async fn publish_public_key(&self, user_id: &str, public_key_b64: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.public_keys.insert(user_id.to_string(), public_key_b64.to_string());
        *state.publishes.entry(user_id.to_string()).or_default() += 1;
        Ok(())
    }
}

#[async_trait]
impl Transport for LoopbackServer {
    async fn connect(&self, user_id: &str) -> Result<UnboundedReceiver<ServerEvent>, TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        state.connections.insert(user_id.to_string(), tx);
        state.broadcast(
            user_id,
            &ServerEvent::UserOnline {
                user_id: user_id.to_string(),
                status: Presence::Online,
            },
        );
        Ok(rx)
    }

    async fn send(&self, user_id: &str, event: ClientEvent) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if !state.connections.contains_key(user_id) {
            return Err(TransportError::NotConnected);
        }
        match event {
            ClientEvent::JoinRoom { room_id } => {
                state.require_member(&room_id, user_id)?;
                state.muted.remove(&(room_id, user_id.to_string()));
            }
            ClientEvent::LeaveRoom { room_id } => {
                state.muted.insert((room_id, user_id.to_string()));
            }
            ClientEvent::Typing { room_id, is_typing } => {
                state.require_member(&room_id, user_id)?;
                state.fan_out(
                    &room_id,
                    Some(user_id),
                    &ServerEvent::UserTyping {
                        room_id: room_id.clone(),
                        user_id: user_id.to_string(),
                        is_typing,
                    },
                );
            }
            ClientEvent::SendMessage(mut message) => {
                // The authenticated connection decides the sender.
                message.sender = user_id.to_string();
                message.validate_for_send()?;
                state.require_member(&message.room_id, user_id)?;

                let room_id = message.room_id.clone();
                let stored = StoredMessage {
                    id: Uuid::new_v4().to_string(),
                    message,
                    created_at: Utc::now(),
                    read_by: vec![user_id.to_string()],
                };
                state
                    .history
                    .entry(room_id.clone())
                    .or_default()
                    .push(stored.clone());
                tracing::debug!(target: "secure_chat", event = "loopback_stored", room_id = %room_id, message_id = %stored.id);
                state.fan_out(&room_id, None, &ServerEvent::ReceiveMessage(stored));
            }
        }
        Ok(())
    }

    async fn disconnect(&self, user_id: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.connections.remove(user_id).is_some() {
            state.broadcast(
                user_id,
                &ServerEvent::UserOnline {
                    user_id: user_id.to_string(),
                    status: Presence::Offline,
                },
            );
        }
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for LoopbackServer {
    async fn messages(&self, room_id: &str) -> Result<Vec<StoredMessage>, TransportError> {
        let state = self.state.lock();
        state.members(room_id)?;
        Ok(state.history.get(room_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl BlobStore for LoopbackServer {
    async fn put_blob(&self, bytes: Vec<u8>) -> Result<String, TransportError> {
        let url = format!("{BLOB_SCHEME}{}", Uuid::new_v4());
        self.state.lock().blobs.insert(url.clone(), bytes);
        Ok(url)
    }

    async fn get_blob(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        self.state
            .lock()
            .blobs
            .get(url)
            .cloned()
            .ok_or_else(|| TransportError::BlobNotFound(url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sc_proto::WireMessage;

    fn wire(room_id: &str, content: &str) -> WireMessage {
        WireMessage {
            room_id: room_id.into(),
            sender: "spoofed".into(),
            content: content.into(),
            attachments: Vec::new(),
            client_message_id: Some("t1".into()),
            encryption: None,
        }
    }

    #[tokio::test]
    async fn fans_out_to_members_including_sender() {
        let server = LoopbackServer::new();
        server.create_room("r1", &["alice", "bob"]);
        let mut alice = server.connect("alice").await.unwrap();
        let mut bob = server.connect("bob").await.unwrap();
        let mut carol = server.connect("carol").await.unwrap();

        server
            .send("alice", ClientEvent::SendMessage(wire("r1", "hi")))
            .await
            .unwrap();

        // alice first saw bob come online
        assert!(matches!(alice.try_recv(), Ok(ServerEvent::UserOnline { .. })));
        for rx in [&mut alice, &mut bob] {
            loop {
                match rx.try_recv().unwrap() {
                    ServerEvent::ReceiveMessage(m) => {
                        assert_eq!(m.message.sender, "alice");
                        assert_eq!(m.read_by, ["alice"]);
                        break;
                    }
                    _ => continue,
                }
            }
        }
        while let Ok(event) = carol.try_recv() {
            assert!(!matches!(event, ServerEvent::ReceiveMessage(_)));
        }
        assert_eq!(server.stored("r1").len(), 1);
    }

    #[tokio::test]
    async fn rejects_empty_and_non_member() {
        let server = LoopbackServer::new();
        server.create_room("r1", &["alice"]);
        let _alice = server.connect("alice").await.unwrap();
        let _carol = server.connect("carol").await.unwrap();

        assert!(matches!(
            server.send("alice", ClientEvent::SendMessage(wire("r1", "  "))).await,
            Err(TransportError::Rejected(_))
        ));
        assert!(matches!(
            server.send("carol", ClientEvent::SendMessage(wire("r1", "x"))).await,
            Err(TransportError::NotAMember(_))
        ));
        assert!(matches!(
            server.send("dave", ClientEvent::SendMessage(wire("r1", "x"))).await,
            Err(TransportError::NotConnected)
        ));
        assert_eq!(server.message_count(), 0);
    }

    #[tokio::test]
    async fn leave_room_mutes_fan_out() {
        let server = LoopbackServer::new();
        server.create_room("r1", &["alice", "bob"]);
        let _alice = server.connect("alice").await.unwrap();
        let mut bob = server.connect("bob").await.unwrap();

        server.send("bob", ClientEvent::LeaveRoom { room_id: "r1".into() }).await.unwrap();
        server.send("alice", ClientEvent::SendMessage(wire("r1", "hi"))).await.unwrap();
        assert!(bob.try_recv().is_err());

        server.send("bob", ClientEvent::JoinRoom { room_id: "r1".into() }).await.unwrap();
        server.send("alice", ClientEvent::SendMessage(wire("r1", "again"))).await.unwrap();
        assert!(matches!(bob.try_recv(), Ok(ServerEvent::ReceiveMessage(_))));
    }

    #[tokio::test]
    async fn blobs_round_trip_and_corrupt() {
        let server = LoopbackServer::new();
        let url = server.put_blob(vec![1, 2, 3]).await.unwrap();
        assert_eq!(server.get_blob(&url).await.unwrap(), [1, 2, 3]);
        server.corrupt_blob(&url, 1).unwrap();
        assert_eq!(server.get_blob(&url).await.unwrap(), [1, 3, 3]);
        assert!(server.get_blob("mem://blob/none").await.is_err());
    }
}
