//! Message delivery pipeline.
//!
//! Outgoing:
//!   Composing -> Encrypting -> AttachmentSealing -> Transmitting -> Pending
//!   -> Delivered (echo reconciled) | Failed
//! Nothing reaches the transport before every cryptographic step for the
//! message has succeeded. Dropping a `send` future before it completes marks
//! the local echo failed and transmits nothing.
//!
//! Incoming: every stored message is rendered independently; a message that
//! cannot be decrypted becomes a placeholder and never blocks its neighbours.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use sc_crypto::{attachment, envelope, random, CryptoError, Envelope, MessageKey, Recipient, Sealed};
use sc_proto::{
    AttachmentMeta, ChatMessage, ClientEvent, EncryptedAttachment, EncryptedMessage, MessageMeta,
    PlaintextMessage, Presence, ServerEvent, StoredMessage,
};

use crate::{
    custody::KeyCustody,
    error::PipelineError,
    pending::OutgoingState,
    policy::{self, RenderedBody, SendPlan, Unavailable},
    rendered::{AttachmentHandle, RenderedMessage},
    session::Session,
    timeline::{Applied, Timeline, TimelineEntry},
};

// ── Drafts & outcomes ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DraftFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Draft {
    pub room_id: String,
    pub text: String,
    pub files: Vec<DraftFile>,
    /// Generated when not supplied.
    pub client_message_id: Option<String>,
}

impl Draft {
    pub fn text(room_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            text: text.into(),
            files: Vec::new(),
            client_message_id: None,
        }
    }

    pub fn with_file(mut self, name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.files.push(DraftFile {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub client_message_id: String,
    pub encrypted: bool,
    /// Set when the message went out unencrypted under `SendPolicy::Prefer`.
    pub warning: Option<String>,
}

/// One event from the real-time channel, after rendering.
#[derive(Debug, Clone)]
pub enum Inbound {
    Message { applied: Applied, message: RenderedMessage },
    Typing { room_id: String, user_id: String, is_typing: bool },
    Presence { user_id: String, status: Presence },
}

// ── Pipeline ─────────────────────────────────────────────────────────────────

pub struct DeliveryPipeline {
    session: Session,
    crypto_available: bool,
    timeline: Mutex<Timeline>,
    inbox: tokio::sync::Mutex<UnboundedReceiver<ServerEvent>>,
}

impl DeliveryPipeline {
    /// Start a session: ensure the user's keypair, then connect.
    ///
    /// Key custody failures do not abort the session; sends then follow the
    /// configured policy and encrypted history renders as placeholders.
    pub async fn open(session: Session) -> Result<Self, PipelineError> {
        let mut crypto_available = random::is_available();
        if crypto_available {
            match session.custody.ensure_key_pair().await {
                Ok(pair) => tracing::info!(
                    target: "secure_chat",
                    event = "session_key_ready",
                    user_id = %session.user_id,
                    fingerprint = %pair.public.fingerprint(),
                ),
                Err(err) if err.is_crypto_unavailable() => {
                    crypto_available = false;
                    tracing::warn!(target: "secure_chat", event = "crypto_unavailable", error = %err);
                }
                Err(err) => tracing::warn!(
                    target: "secure_chat",
                    event = "key_custody_failed",
                    user_id = %session.user_id,
                    error = %err,
                ),
            }
        } else {
            tracing::warn!(target: "secure_chat", event = "crypto_unavailable", user_id = %session.user_id);
        }

        let inbox = session
            .collaborators
            .transport
            .connect(&session.user_id)
            .await?;
        tracing::info!(target: "secure_chat", event = "session_opened", user_id = %session.user_id, crypto_available);

        Ok(Self {
            session,
            crypto_available,
            timeline: Mutex::new(Timeline::new()),
            inbox: tokio::sync::Mutex::new(inbox),
        })
    }

    pub async fn close(self) -> Result<(), PipelineError> {
        self.session
            .collaborators
            .transport
            .disconnect(&self.session.user_id)
            .await?;
        tracing::info!(target: "secure_chat", event = "session_closed", user_id = %self.session.user_id);
        Ok(())
    }

    /// Close the session and forget the local private key.
    pub async fn logout(self) -> Result<(), PipelineError> {
        self.session.custody.clear().await?;
        self.close().await
    }

    pub fn user_id(&self) -> &str {
        &self.session.user_id
    }

    pub fn custody(&self) -> &KeyCustody {
        &self.session.custody
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn crypto_available(&self) -> bool {
        self.crypto_available
    }

    pub async fn join_room(&self, room_id: &str) -> Result<(), PipelineError> {
        self.emit(ClientEvent::JoinRoom { room_id: room_id.to_string() }).await
    }

    pub async fn leave_room(&self, room_id: &str) -> Result<(), PipelineError> {
        self.emit(ClientEvent::LeaveRoom { room_id: room_id.to_string() }).await
    }

    pub async fn set_typing(&self, room_id: &str, is_typing: bool) -> Result<(), PipelineError> {
        self.emit(ClientEvent::Typing {
            room_id: room_id.to_string(),
            is_typing,
        })
        .await
    }

    async fn emit(&self, event: ClientEvent) -> Result<(), PipelineError> {
        self.session
            .collaborators
            .transport
            .send(&self.session.user_id, event)
            .await?;
        Ok(())
    }

    // ── Outgoing ─────────────────────────────────────────────────────────────

    pub async fn send(&self, draft: Draft) -> Result<SendOutcome, PipelineError> {
        self.check_draft(&draft)?;
        let token = draft
            .client_message_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        self.timeline.lock().add_pending(&token, self.local_echo(&token, &draft))?;
        let mut guard = CancelGuard::new(&self.timeline, &token);

        let result = self.deliver(&token, draft).await;
        guard.disarm();
        match result {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.timeline.lock().fail(&token, err.to_string());
                let event = match err {
                    PipelineError::EncryptionUnavailable { .. } => "send_refused",
                    _ => "send_failed",
                };
                tracing::warn!(
                    target: "secure_chat",
                    event,
                    user_id = %self.session.user_id,
                    token = %token,
                    error = %err,
                );
                Err(err)
            }
        }
    }

    fn check_draft(&self, draft: &Draft) -> Result<(), PipelineError> {
        if draft.text.trim().is_empty() && draft.files.is_empty() {
            return Err(PipelineError::EmptyDraft);
        }
        let limit = self.session.config.max_attachment_bytes;
        for file in &draft.files {
            let size = file.bytes.len() as u64;
            if size > limit {
                return Err(PipelineError::AttachmentTooLarge {
                    name: file.name.clone(),
                    size,
                    limit,
                });
            }
        }
        Ok(())
    }

    fn local_echo(&self, token: &str, draft: &Draft) -> RenderedMessage {
        RenderedMessage {
            id: None,
            room_id: draft.room_id.clone(),
            sender: self.session.user_id.clone(),
            client_message_id: Some(token.to_string()),
            created_at: None,
            encrypted: false,
            body: RenderedBody::Plaintext(draft.text.clone()),
            attachments: draft
                .files
                .iter()
                .map(|f| AttachmentHandle::uploading(file_meta(f)))
                .collect(),
        }
    }

    async fn deliver(&self, token: &str, draft: Draft) -> Result<SendOutcome, PipelineError> {
        let user_id = &self.session.user_id;
        let collaborators = &self.session.collaborators;

        let members = collaborators.directory.room_members(&draft.room_id).await?;
        let own_key = if self.crypto_available {
            match self.session.custody.public_key().await {
                Ok(key) => key,
                Err(err) => {
                    tracing::warn!(target: "secure_chat", event = "own_key_unreadable", error = %err);
                    None
                }
            }
        } else {
            None
        };

        let plan = policy::plan_send(
            self.session.config.send_policy,
            self.crypto_available,
            user_id,
            own_key.as_ref(),
            &members,
        )?;

        let meta = MessageMeta {
            room_id: draft.room_id.clone(),
            sender: user_id.clone(),
            client_message_id: Some(token.to_string()),
        };
        let attachment_count = draft.files.len();
        let (message, warning) = match plan {
            SendPlan::Encrypt(recipients) => (self.seal_message(token, meta, draft, recipients).await?, None),
            SendPlan::Plaintext { warning } => (self.plain_message(meta, draft).await?, warning),
        };
        let encrypted = message.is_encrypted();

        self.timeline.lock().advance(token, OutgoingState::Transmitting);
        collaborators
            .transport
            .send(user_id, ClientEvent::SendMessage(message.into()))
            .await?;
        self.timeline.lock().advance(token, OutgoingState::Pending);

        tracing::info!(
            target: "secure_chat",
            event = "message_sent",
            user_id = %user_id,
            token = %token,
            encrypted,
            attachments = attachment_count,
        );
        if let Some(warning) = &warning {
            tracing::warn!(target: "secure_chat", event = "sent_unencrypted", token = %token, warning = %warning);
        }

        Ok(SendOutcome {
            client_message_id: token.to_string(),
            encrypted,
            warning,
        })
    }

    async fn seal_message(
        &self,
        token: &str,
        meta: MessageMeta,
        draft: Draft,
        recipients: Vec<Recipient>,
    ) -> Result<ChatMessage, PipelineError> {
        self.timeline.lock().advance(token, OutgoingState::Encrypting);
        let Draft { text, files, .. } = draft;

        let Sealed { envelope: sealed_envelope, key } =
            blocking(move || envelope::seal(text.as_bytes(), &recipients)).await??;

        let mut attachments = Vec::with_capacity(files.len());
        if !files.is_empty() {
            self.timeline.lock().advance(token, OutgoingState::AttachmentSealing);
            // The message key is dropped (and zeroized) when this task ends.
            let sealed = blocking(move || seal_files(files, key)).await??;
            for (mut file_meta, sealed) in sealed {
                let encryption = sealed.encryption();
                file_meta.url = self.session.collaborators.blobs.put_blob(sealed.ciphertext).await?;
                attachments.push(EncryptedAttachment {
                    meta: file_meta,
                    encryption,
                });
            }
        }

        Ok(ChatMessage::Encrypted(EncryptedMessage {
            meta,
            envelope: sealed_envelope,
            attachments,
        }))
    }

    async fn plain_message(&self, meta: MessageMeta, draft: Draft) -> Result<ChatMessage, PipelineError> {
        let mut attachments = Vec::with_capacity(draft.files.len());
        for file in draft.files {
            let mut file_meta = file_meta(&file);
            file_meta.url = self.session.collaborators.blobs.put_blob(file.bytes).await?;
            attachments.push(file_meta);
        }
        Ok(ChatMessage::Plaintext(PlaintextMessage {
            meta,
            content: draft.text,
            attachments,
        }))
    }

    // ── Incoming ─────────────────────────────────────────────────────────────

    /// Wait for the next channel event, render it, and apply it to the
    /// timeline. `None` once the channel is closed.
    pub async fn recv(&self) -> Option<Inbound> {
        let event = self.inbox.lock().await.recv().await?;
        Some(self.handle_event(event).await)
    }

    /// Process every event already queued, without waiting.
    pub async fn drain(&self) -> Vec<Inbound> {
        let mut handled = Vec::new();
        loop {
            let next = self.inbox.lock().await.try_recv();
            match next {
                Ok(event) => handled.push(self.handle_event(event).await),
                Err(_) => return handled,
            }
        }
    }

    pub async fn handle_event(&self, event: ServerEvent) -> Inbound {
        match event {
            ServerEvent::ReceiveMessage(stored) => {
                let message = self.render(&stored).await;
                let applied = self.timeline.lock().apply_incoming(message.clone());
                tracing::debug!(
                    target: "secure_chat",
                    event = "message_received",
                    message_id = %stored.id,
                    room_id = %stored.message.room_id,
                    applied = ?applied,
                );
                Inbound::Message { applied, message }
            }
            ServerEvent::UserTyping { room_id, user_id, is_typing } => Inbound::Typing { room_id, user_id, is_typing },
            ServerEvent::UserOnline { user_id, status } => Inbound::Presence { user_id, status },
        }
    }

    /// Fetch and render a room's history and merge it into the timeline.
    /// Each message is decrypted independently.
    pub async fn load_history(&self, room_id: &str) -> Result<Vec<RenderedMessage>, PipelineError> {
        let stored = self.session.collaborators.history.messages(room_id).await?;
        let mut rendered = Vec::with_capacity(stored.len());
        for message in &stored {
            rendered.push(self.render(message).await);
        }

        let unavailable = rendered.iter().filter(|m| !m.body.is_available()).count();
        tracing::info!(
            target: "secure_chat",
            event = "history_loaded",
            room_id = %room_id,
            count = rendered.len(),
            unavailable,
        );
        self.timeline.lock().merge_history(room_id, rendered.clone());
        Ok(rendered)
    }

    pub fn timeline(&self, room_id: &str) -> Vec<TimelineEntry> {
        self.timeline.lock().entries(room_id)
    }

    /// Render one stored message for display. Never fails: anything that
    /// cannot be shown becomes `RenderedBody::Unavailable`.
    pub async fn render(&self, stored: &StoredMessage) -> RenderedMessage {
        let wire = &stored.message;
        let mut rendered = RenderedMessage {
            id: Some(stored.id.clone()),
            room_id: wire.room_id.clone(),
            sender: wire.sender.clone(),
            client_message_id: wire.client_message_id.clone(),
            created_at: Some(stored.created_at),
            encrypted: wire.encryption.is_some(),
            body: RenderedBody::Unavailable(Unavailable::Malformed),
            attachments: Vec::new(),
        };

        match ChatMessage::try_from(wire.clone()) {
            Err(err) => {
                tracing::warn!(target: "secure_chat", event = "malformed_message", message_id = %stored.id, error = %err);
            }
            Ok(ChatMessage::Plaintext(m)) => {
                rendered.encrypted = false;
                rendered.body = RenderedBody::Plaintext(m.content);
                rendered.attachments = m.attachments.into_iter().map(AttachmentHandle::plain).collect();
            }
            Ok(ChatMessage::Encrypted(m)) => {
                rendered.encrypted = true;
                let (body, key) = self.open_envelope(&stored.id, m.envelope).await;
                rendered.body = body;
                rendered.attachments = m
                    .attachments
                    .into_iter()
                    .map(|a| match &key {
                        Some(key) => AttachmentHandle::encrypted(a.meta, a.encryption, key.clone()),
                        None => AttachmentHandle::locked(a.meta),
                    })
                    .collect();
            }
        }
        rendered
    }

    async fn open_envelope(&self, message_id: &str, env: Envelope) -> (RenderedBody, Option<Arc<MessageKey>>) {
        let user_id = self.session.user_id.clone();
        if !env.is_addressed_to(&user_id) {
            tracing::debug!(target: "secure_chat", event = "not_a_recipient", message_id = %message_id);
            return (RenderedBody::Unavailable(Unavailable::NotARecipient), None);
        }
        if !self.crypto_available {
            return (RenderedBody::Unavailable(Unavailable::CryptoUnavailable), None);
        }
        let private = match self.session.custody.private_key().await {
            Ok(Some(private)) => private,
            Ok(None) => {
                tracing::warn!(target: "secure_chat", event = "no_local_key", message_id = %message_id);
                return (RenderedBody::Unavailable(Unavailable::NoLocalKey), None);
            }
            Err(err) => {
                tracing::warn!(target: "secure_chat", event = "no_local_key", message_id = %message_id, error = %err);
                return (RenderedBody::Unavailable(Unavailable::NoLocalKey), None);
            }
        };

        let opened = blocking(move || {
            let opened = envelope::open(&env, &user_id, &private)?;
            let text = opened.text()?;
            Ok::<_, CryptoError>((text, opened.key))
        })
        .await;

        match opened {
            Ok(Ok((text, key))) => (RenderedBody::Decrypted(text), Some(Arc::new(key))),
            Ok(Err(err)) => {
                tracing::warn!(target: "secure_chat", event = "decrypt_failed", message_id = %message_id, error = %err);
                (RenderedBody::Unavailable(Unavailable::from(&err)), None)
            }
            Err(err) => {
                tracing::warn!(target: "secure_chat", event = "decrypt_failed", message_id = %message_id, error = %err);
                (RenderedBody::Unavailable(Unavailable::DecryptionFailed), None)
            }
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Marks the local echo failed if a `send` future is dropped mid-flight.
struct CancelGuard<'a> {
    timeline: &'a Mutex<Timeline>,
    token: &'a str,
    armed: bool,
}

impl<'a> CancelGuard<'a> {
    fn new(timeline: &'a Mutex<Timeline>, token: &'a str) -> Self {
        Self {
            timeline,
            token,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.timeline.lock().fail(self.token, "cancelled");
            tracing::info!(target: "secure_chat", event = "send_cancelled", token = %self.token);
        }
    }
}

async fn blocking<F, R>(f: F) -> Result<R, PipelineError>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PipelineError::Task(e.to_string()))
}

fn file_meta(file: &DraftFile) -> AttachmentMeta {
    AttachmentMeta {
        url: String::new(),
        content_type: Some(file.content_type.clone()),
        original_name: Some(file.name.clone()),
        size: Some(file.bytes.len() as u64),
        original_type: Some(file.content_type.clone()),
        original_size: Some(file.bytes.len() as u64),
    }
}

fn seal_files(
    files: Vec<DraftFile>,
    key: MessageKey,
) -> Result<Vec<(AttachmentMeta, attachment::SealedAttachment)>, CryptoError> {
    files
        .into_iter()
        .map(|file| {
            let sealed = attachment::seal_attachment(&file.bytes, &key)?;
            let mut meta = file_meta(&file);
            meta.size = Some(sealed.ciphertext.len() as u64);
            Ok((meta, sealed))
        })
        .collect()
}
