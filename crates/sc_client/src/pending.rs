//! Outgoing messages awaiting the server's echo.
//!
//! Every send registers a `clientMessageId` token here. The server fans the
//! stored message back to the sender with the same token; `reconcile`
//! resolves a token at most once no matter how often its echo is
//! redelivered. A send that fails before reaching the transport is
//! `discard`ed instead, since no echo can follow.

use std::collections::HashMap;
use std::time::Instant;

/// Progress of one outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutgoingState {
    Composing,
    Encrypting,
    AttachmentSealing,
    Transmitting,
    /// Handed to the transport, waiting for the echo.
    Pending,
    Failed(String),
}

impl OutgoingState {
    /// True once the payload may have reached the transport.
    pub fn is_transmitted(&self) -> bool {
        !matches!(
            self,
            OutgoingState::Composing | OutgoingState::Encrypting | OutgoingState::AttachmentSealing
        )
    }
}

#[derive(Debug, Clone)]
pub struct PendingSlot {
    pub room_id: String,
    /// Position of the local echo in the room timeline.
    pub index: usize,
    pub state: OutgoingState,
    pub registered_at: Instant,
}

#[derive(Debug, Default)]
pub struct PendingTable {
    slots: HashMap<String, PendingSlot>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the token is already pending.
    pub fn register(&mut self, token: &str, room_id: &str, index: usize) -> bool {
        if self.slots.contains_key(token) {
            return false;
        }
        self.slots.insert(
            token.to_string(),
            PendingSlot {
                room_id: room_id.to_string(),
                index,
                state: OutgoingState::Composing,
                registered_at: Instant::now(),
            },
        );
        true
    }

    pub fn advance(&mut self, token: &str, state: OutgoingState) {
        if let Some(slot) = self.slots.get_mut(token) {
            tracing::debug!(target: "secure_chat", event = "outgoing_state", token = %token, state = ?state);
            slot.state = state;
        }
    }

    pub fn get(&self, token: &str) -> Option<&PendingSlot> {
        self.slots.get(token)
    }

    /// Resolve a token. The first call returns the slot; every later call
    /// for the same token returns `None`.
    pub fn reconcile(&mut self, token: &str) -> Option<PendingSlot> {
        self.slots.remove(token)
    }

    /// Drop a token whose message never left this device.
    pub fn discard(&mut self, token: &str) -> Option<PendingSlot> {
        self.slots.remove(token)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slots still pending for a room, in timeline order.
    pub fn for_room(&self, room_id: &str) -> Vec<(String, PendingSlot)> {
        let mut slots: Vec<_> = self
            .slots
            .iter()
            .filter(|(_, s)| s.room_id == room_id)
            .map(|(t, s)| (t.clone(), s.clone()))
            .collect();
        slots.sort_by_key(|(_, s)| s.index);
        slots
    }

    /// Re-point a slot after its room timeline was rebuilt.
    pub fn relocate(&mut self, token: &str, index: usize) {
        if let Some(slot) = self.slots.get_mut(token) {
            slot.index = index;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconcile_is_exactly_once() {
        let mut table = PendingTable::new();
        assert!(table.register("t1", "r1", 0));
        assert!(!table.register("t1", "r1", 1));

        table.advance("t1", OutgoingState::Pending);
        let slot = table.reconcile("t1").unwrap();
        assert_eq!(slot.state, OutgoingState::Pending);
        assert_eq!(slot.index, 0);
        assert!(table.reconcile("t1").is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn only_pre_transport_states_are_untransmitted() {
        assert!(!OutgoingState::Composing.is_transmitted());
        assert!(!OutgoingState::Encrypting.is_transmitted());
        assert!(!OutgoingState::AttachmentSealing.is_transmitted());
        assert!(OutgoingState::Transmitting.is_transmitted());
        assert!(OutgoingState::Pending.is_transmitted());
    }

    #[test]
    fn unknown_token_is_ignored() {
        let mut table = PendingTable::new();
        table.advance("nope", OutgoingState::Transmitting);
        assert!(table.reconcile("nope").is_none());
    }

    #[test]
    fn for_room_sorted_by_index() {
        let mut table = PendingTable::new();
        table.register("b", "r1", 3);
        table.register("a", "r1", 1);
        table.register("c", "r2", 0);
        let tokens: Vec<_> = table.for_room("r1").into_iter().map(|(t, _)| t).collect();
        assert_eq!(tokens, ["a", "b"]);
    }
}
