//! Per-room message timeline as the user sees it.
//!
//! Entries appear in receipt order. Server messages are deduplicated by id
//! (the channel is at-least-once); a local echo is replaced in place when
//! its `clientMessageId` comes back.

use std::collections::{HashMap, HashSet};

use crate::{
    error::PipelineError,
    pending::{OutgoingState, PendingTable},
    rendered::RenderedMessage,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct TimelineEntry {
    pub status: DeliveryStatus,
    pub message: RenderedMessage,
}

/// What `apply_incoming` did with a server message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Replaced the sender's local echo.
    Reconciled { index: usize },
    Appended { index: usize },
    /// Already shown; redelivery ignored.
    Duplicate,
}

#[derive(Debug, Default)]
struct RoomLog {
    entries: Vec<TimelineEntry>,
    seen: HashSet<String>,
}

impl RoomLog {
    fn push(&mut self, entry: TimelineEntry) -> usize {
        if let Some(id) = &entry.message.id {
            self.seen.insert(id.clone());
        }
        self.entries.push(entry);
        self.entries.len() - 1
    }
}

#[derive(Debug, Default)]
pub struct Timeline {
    rooms: HashMap<String, RoomLog>,
    pending: PendingTable,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show a local echo and register its token. A retry of a send that
    /// failed before transmission re-arms the earlier failed entry.
    pub fn add_pending(&mut self, token: &str, echo: RenderedMessage) -> Result<usize, PipelineError> {
        if self.pending.get(token).is_some() {
            return Err(PipelineError::DuplicateMessageId(token.to_string()));
        }
        let room_id = echo.room_id.clone();
        let log = self.rooms.entry(room_id.clone()).or_default();
        let retry = log.entries.iter().position(|e| {
            e.message.id.is_none()
                && matches!(e.status, DeliveryStatus::Failed(_))
                && e.message.client_message_id.as_deref() == Some(token)
        });
        let entry = TimelineEntry {
            status: DeliveryStatus::Pending,
            message: echo,
        };
        let index = match retry {
            Some(index) => {
                log.entries[index] = entry;
                index
            }
            None => log.push(entry),
        };
        self.pending.register(token, &room_id, index);
        Ok(index)
    }

    pub fn advance(&mut self, token: &str, state: OutgoingState) {
        self.pending.advance(token, state);
    }

    /// Mark an outgoing message failed. If it may have reached the transport
    /// the token stays registered, so a late echo from an at-least-once
    /// channel still lands on this entry; otherwise the token is released.
    pub fn fail(&mut self, token: &str, reason: impl Into<String>) {
        let reason = reason.into();
        let Some(slot) = self.pending.get(token).cloned() else {
            return;
        };
        if let Some(entry) = self
            .rooms
            .get_mut(&slot.room_id)
            .and_then(|log| log.entries.get_mut(slot.index))
        {
            entry.status = DeliveryStatus::Failed(reason.clone());
        }
        if slot.state.is_transmitted() {
            self.pending.advance(token, OutgoingState::Failed(reason));
        } else {
            self.pending.discard(token);
        }
    }

    /// Replace the local echo for `token` with the acknowledged message.
    /// Succeeds at most once per token, and only within the echo's room.
    pub fn reconcile(&mut self, token: &str, acknowledged: RenderedMessage) -> Option<usize> {
        if self.pending.get(token)?.room_id != acknowledged.room_id {
            return None;
        }
        let slot = self.pending.reconcile(token)?;
        let log = self.rooms.get_mut(&slot.room_id)?;
        if let Some(id) = &acknowledged.id {
            log.seen.insert(id.clone());
        }
        let entry = log.entries.get_mut(slot.index)?;
        entry.message = acknowledged;
        entry.status = DeliveryStatus::Delivered;
        Some(slot.index)
    }

    pub fn apply_incoming(&mut self, message: RenderedMessage) -> Applied {
        if let Some(id) = &message.id {
            let seen = self
                .rooms
                .get(&message.room_id)
                .is_some_and(|log| log.seen.contains(id));
            if seen {
                return Applied::Duplicate;
            }
        }
        if let Some(token) = message.client_message_id.clone() {
            if let Some(index) = self.reconcile(&token, message.clone()) {
                return Applied::Reconciled { index };
            }
        }
        let index = self
            .rooms
            .entry(message.room_id.clone())
            .or_default()
            .push(TimelineEntry {
                status: DeliveryStatus::Delivered,
                message,
            });
        Applied::Appended { index }
    }

    /// Merge fetched history into a room. History comes first; entries
    /// already shown but absent from the snapshot (live messages newer than
    /// it, unresolved echoes, failed sends) follow in their previous order.
    /// Echoes whose token appears in the history are resolved.
    pub fn merge_history(&mut self, room_id: &str, history: Vec<RenderedMessage>) {
        let old = self.rooms.remove(room_id).unwrap_or_default();
        let mut log = RoomLog::default();
        let mut tokens = HashSet::new();
        for message in history {
            if message.id.as_ref().is_some_and(|id| log.seen.contains(id)) {
                continue;
            }
            if let Some(token) = &message.client_message_id {
                tokens.insert(token.clone());
            }
            log.push(TimelineEntry {
                status: DeliveryStatus::Delivered,
                message,
            });
        }

        let pending_at: HashMap<usize, String> = self
            .pending
            .for_room(room_id)
            .into_iter()
            .map(|(token, slot)| (slot.index, token))
            .collect();

        for (old_index, entry) in old.entries.into_iter().enumerate() {
            if let Some(token) = pending_at.get(&old_index) {
                if tokens.contains(token) {
                    self.pending.reconcile(token);
                } else {
                    let index = log.push(entry);
                    self.pending.relocate(token, index);
                }
                continue;
            }
            let in_history = match &entry.message.id {
                Some(id) => log.seen.contains(id),
                None => false,
            };
            if !in_history {
                log.push(entry);
            }
        }
        self.rooms.insert(room_id.to_string(), log);
    }

    pub fn entries(&self, room_id: &str) -> Vec<TimelineEntry> {
        self.rooms
            .get(room_id)
            .map(|log| log.entries.clone())
            .unwrap_or_default()
    }

    pub fn pending(&self) -> &PendingTable {
        &self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::RenderedBody;

    fn message(id: Option<&str>, token: Option<&str>, text: &str) -> RenderedMessage {
        RenderedMessage {
            id: id.map(String::from),
            room_id: "r1".into(),
            sender: "alice".into(),
            client_message_id: token.map(String::from),
            created_at: None,
            encrypted: false,
            body: RenderedBody::Plaintext(text.into()),
            attachments: Vec::new(),
        }
    }

    #[test]
    fn echo_replaces_pending_entry_once() {
        let mut timeline = Timeline::new();
        timeline.add_pending("t1", message(None, Some("t1"), "hi")).unwrap();

        let applied = timeline.apply_incoming(message(Some("m1"), Some("t1"), "hi"));
        assert_eq!(applied, Applied::Reconciled { index: 0 });
        assert_eq!(
            timeline.apply_incoming(message(Some("m1"), Some("t1"), "hi")),
            Applied::Duplicate
        );

        let entries = timeline.entries("r1");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, DeliveryStatus::Delivered);
        assert_eq!(entries[0].message.id.as_deref(), Some("m1"));
        assert!(timeline.pending().is_empty());
    }

    #[test]
    fn duplicate_token_rejected() {
        let mut timeline = Timeline::new();
        timeline.add_pending("t1", message(None, Some("t1"), "a")).unwrap();
        assert!(matches!(
            timeline.add_pending("t1", message(None, Some("t1"), "b")),
            Err(PipelineError::DuplicateMessageId(_))
        ));
    }

    #[test]
    fn failed_entry_still_reconciles_on_late_echo() {
        let mut timeline = Timeline::new();
        timeline.add_pending("t1", message(None, Some("t1"), "a")).unwrap();
        timeline.advance("t1", OutgoingState::Transmitting);
        timeline.fail("t1", "network");
        assert_eq!(
            timeline.entries("r1")[0].status,
            DeliveryStatus::Failed("network".into())
        );
        assert_eq!(
            timeline.apply_incoming(message(Some("m1"), Some("t1"), "a")),
            Applied::Reconciled { index: 0 }
        );
        assert_eq!(timeline.entries("r1")[0].status, DeliveryStatus::Delivered);
    }

    #[test]
    fn failure_before_transport_releases_token() {
        let mut timeline = Timeline::new();
        timeline.add_pending("t1", message(None, Some("t1"), "a")).unwrap();
        timeline.fail("t1", "missing keys");
        assert!(timeline.pending().is_empty());

        let index = timeline.add_pending("t1", message(None, Some("t1"), "a")).unwrap();
        assert_eq!(index, 0);
        let entries = timeline.entries("r1");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, DeliveryStatus::Pending);
    }

    #[test]
    fn echo_from_another_room_is_not_reconciled() {
        let mut timeline = Timeline::new();
        timeline.add_pending("t1", message(None, Some("t1"), "a")).unwrap();

        let mut elsewhere = message(Some("m9"), Some("t1"), "a");
        elsewhere.room_id = "r2".into();
        assert_eq!(timeline.apply_incoming(elsewhere), Applied::Appended { index: 0 });

        assert_eq!(timeline.entries("r1")[0].status, DeliveryStatus::Pending);
        assert_eq!(timeline.entries("r2").len(), 1);
        assert!(timeline.pending().get("t1").is_some());
    }

    #[test]
    fn stale_history_keeps_live_messages() {
        let mut timeline = Timeline::new();
        timeline.apply_incoming(message(Some("m1"), None, "old"));
        timeline.apply_incoming(message(Some("m2"), None, "live"));

        timeline.merge_history("r1", vec![message(Some("m1"), None, "old")]);

        let texts: Vec<_> = timeline
            .entries("r1")
            .iter()
            .map(|e| e.message.text().to_string())
            .collect();
        assert_eq!(texts, ["old", "live"]);
        assert_eq!(
            timeline.apply_incoming(message(Some("m2"), None, "live")),
            Applied::Duplicate
        );
    }

    #[test]
    fn foreign_messages_append_in_receipt_order() {
        let mut timeline = Timeline::new();
        timeline.apply_incoming(message(Some("m1"), None, "one"));
        timeline.apply_incoming(message(Some("m2"), Some("other-device"), "two"));
        let texts: Vec<_> = timeline
            .entries("r1")
            .iter()
            .map(|e| e.message.text().to_string())
            .collect();
        assert_eq!(texts, ["one", "two"]);
    }

    #[test]
    fn history_resolves_matching_echoes_and_keeps_others() {
        let mut timeline = Timeline::new();
        timeline.add_pending("t1", message(None, Some("t1"), "sent")).unwrap();
        timeline.add_pending("t2", message(None, Some("t2"), "in flight")).unwrap();

        timeline.merge_history(
            "r1",
            vec![
                message(Some("m0"), None, "old"),
                message(Some("m1"), Some("t1"), "sent"),
                message(Some("m1"), Some("t1"), "sent"),
            ],
        );

        let entries = timeline.entries("r1");
        let texts: Vec<_> = entries.iter().map(|e| e.message.text().to_string()).collect();
        assert_eq!(texts, ["old", "sent", "in flight"]);
        assert_eq!(entries[2].status, DeliveryStatus::Pending);
        assert_eq!(timeline.pending().len(), 1);

        assert_eq!(
            timeline.apply_incoming(message(Some("m2"), Some("t2"), "in flight")),
            Applied::Reconciled { index: 2 }
        );
    }
}
