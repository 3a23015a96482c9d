//! Conversation-scoped session facade.
//!
//! [`ChatSession`] presents a conversation/user-scoped surface over the
//! shared connection: validated sends, batched read-marking, best-effort
//! typing, and channel membership that survives reconnects. Inbound events
//! are filtered to the bound conversation before they touch the message
//! store.
//!
//! The facade owns the per-conversation [`MessageStore`]; binding a
//! different conversation discards the old store together with its load
//! generation, which cancels any in-flight page for it.

use std::{sync::Arc, time::Duration};

use driftline_core::{
    ClientFrame, Environment, LifecycleEvent, MessageStore, PageOutcome, PendingSend, ReadBatcher,
    SendError, ServerFrame, SyncEvent, TypingTracker, UserRef,
    DEFAULT_READ_BATCH_WINDOW, DEFAULT_TYPING_TTL,
};
use driftline_core::{ConversationId, MessageId, UserId};
use tokio::sync::Mutex;

use crate::{
    gateway::{GatewayError, MessageGateway},
    manager::ConnectionManager,
    transport::Transport,
};

/// Maximum message content length accepted by local validation.
pub const DEFAULT_MAX_CONTENT_LEN: usize = 4096;

/// Session tuning.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Typing indicator lifetime without refresh.
    pub typing_ttl: Duration,
    /// Read-receipt debounce window.
    pub read_batch_window: Duration,
    /// Local content length limit in bytes.
    pub max_content_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            typing_ttl: DEFAULT_TYPING_TTL,
            read_batch_window: DEFAULT_READ_BATCH_WINDOW,
            max_content_len: DEFAULT_MAX_CONTENT_LEN,
        }
    }
}

/// Consumer-visible changes produced by event handling and ticks.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    /// A new message entered the bound conversation.
    MessageAdded {
        /// Id of the appended message.
        message_id: MessageId,
    },

    /// An existing message changed (promotion, edit, receipts).
    MessageUpdated {
        /// Id of the updated message.
        message_id: MessageId,
    },

    /// An optimistic send failed; the content is preserved for re-offer.
    SendFailed {
        /// The failed send, content intact.
        pending: PendingSend,
    },

    /// The set of users typing in the bound conversation changed.
    TypingChanged {
        /// Conversation whose typing set changed.
        conversation_id: ConversationId,
    },

    /// Read receipts were absorbed for the bound conversation.
    ReadReceipts {
        /// Conversation the receipts apply to.
        conversation_id: ConversationId,
        /// Number of messages that gained a receipt.
        updated: usize,
    },
}

/// Conversation/user-scoped API over the shared connection.
pub struct ChatSession<T, E: Environment> {
    manager: Arc<Mutex<ConnectionManager<T, E>>>,
    env: E,
    user_id: UserId,
    config: SessionConfig,
    conversation_id: Option<ConversationId>,
    messages: Option<MessageStore>,
    batcher: ReadBatcher<E::Instant>,
    typing: TypingTracker<E::Instant>,
}

impl<T: Transport, E: Environment> ChatSession<T, E> {
    /// Create a session for one user over the shared connection manager.
    pub fn new(
        manager: Arc<Mutex<ConnectionManager<T, E>>>,
        env: E,
        user_id: impl Into<UserId>,
        config: SessionConfig,
    ) -> Self {
        let batcher = ReadBatcher::new(config.read_batch_window);
        let typing = TypingTracker::new(config.typing_ttl);
        Self {
            manager,
            env,
            user_id: user_id.into(),
            config,
            conversation_id: None,
            messages: None,
            batcher,
            typing,
        }
    }

    /// The local user.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The bound conversation, if any.
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// Message state for the bound conversation.
    pub fn messages(&self) -> Option<&MessageStore> {
        self.messages.as_ref()
    }

    /// Users currently typing in the bound conversation.
    pub fn typists(&self) -> Vec<&str> {
        self.conversation_id
            .as_deref()
            .map(|id| self.typing.typists(id))
            .unwrap_or_default()
    }

    /// Bind a conversation, replacing any previous binding.
    ///
    /// Discards the previous conversation's message store, pending read
    /// window, and typing indicators - along with the old store's load
    /// generation, so a page still in flight for it is dropped on arrival.
    /// Joins the channel immediately when connected; otherwise the join
    /// happens on the next `connected` event.
    pub async fn bind(&mut self, conversation_id: impl Into<ConversationId>) {
        let conversation_id = conversation_id.into();
        if self.conversation_id.as_ref() == Some(&conversation_id) {
            return;
        }

        if let Some(previous) = self.conversation_id.take() {
            self.publish(ClientFrame::Leave { conversation_id: previous }).await;
        }
        self.batcher.cancel_window();
        self.typing.clear();
        self.messages = Some(MessageStore::new(conversation_id.clone()));
        self.conversation_id = Some(conversation_id.clone());
        self.publish(ClientFrame::Join { conversation_id }).await;
    }

    /// Release the bound conversation (screen unmounted).
    pub async fn unbind(&mut self) {
        if let Some(previous) = self.conversation_id.take() {
            self.publish(ClientFrame::Leave { conversation_id: previous }).await;
        }
        self.messages = None;
        self.batcher.cancel_window();
        self.typing.clear();
    }

    /// Send a message over the real-time path.
    ///
    /// Validation faults are returned synchronously. `Ok(false)` means the
    /// transport was never contacted (no binding, or not connected); the
    /// caller owns the HTTP fallback. `Ok(true)` means the frame was
    /// emitted - delivery is confirmed later by the server's ack.
    pub async fn send_message(&mut self, content: &str) -> Result<bool, SendError> {
        SendError::check_content(content, self.config.max_content_len)?;

        let Some(conversation_id) = self.conversation_id.clone() else {
            return Ok(false);
        };

        let mut manager = self.manager.lock().await;
        if !manager.is_connected() {
            return Ok(false);
        }

        let pending = PendingSend {
            temp_id: format!("tmp-{:016x}", self.env.random_u64()),
            content: content.to_owned(),
            kind: driftline_core::MessageKind::Text,
            submitted_at_ms: self.env.unix_millis(),
        };
        if let Some(messages) = self.messages.as_mut() {
            messages.apply_optimistic_send(&pending, UserRef::Id(self.user_id.clone()));
        }

        let delivered = manager
            .publish(ClientFrame::SendMessage {
                conversation_id,
                temp_id: pending.temp_id.clone(),
                content: pending.content.clone(),
                kind: pending.kind,
            })
            .await;
        drop(manager);

        if !delivered {
            // The connection dropped under us; withdraw the optimistic entry
            // so the fallback path does not produce a duplicate.
            if let Some(messages) = self.messages.as_mut() {
                let _ = messages.fail_send(&pending.temp_id, "transport unavailable");
            }
            return Ok(false);
        }
        Ok(true)
    }

    /// Queue a message for batched read-marking. Fire-and-forget.
    ///
    /// Defaults to the bound conversation when `conversation_id` is omitted.
    /// The local read receipt is applied optimistically; the network call is
    /// deferred to the read-receipt batcher.
    pub fn mark_as_read(&mut self, message_id: &str, conversation_id: Option<&str>) {
        let Some(target) = conversation_id
            .map(str::to_owned)
            .or_else(|| self.conversation_id.clone())
        else {
            tracing::debug!("mark_as_read without a conversation; ignoring");
            return;
        };

        if self.conversation_id.as_deref() == Some(target.as_str())
            && let Some(messages) = self.messages.as_mut()
        {
            let _ = messages.mark_read(message_id, &self.user_id, self.env.unix_millis());
        }
        self.batcher.enqueue(target, message_id, self.env.now());
    }

    /// Best-effort typing start. No-op without a bound conversation.
    pub async fn start_typing(&mut self) {
        let Some(conversation_id) = self.conversation_id.clone() else {
            tracing::debug!("start_typing without a conversation; ignoring");
            return;
        };
        self.publish(ClientFrame::TypingStart { conversation_id }).await;
    }

    /// Best-effort typing stop. No-op without a bound conversation.
    pub async fn stop_typing(&mut self) {
        let Some(conversation_id) = self.conversation_id.clone() else {
            tracing::debug!("stop_typing without a conversation; ignoring");
            return;
        };
        self.publish(ClientFrame::TypingStop { conversation_id }).await;
    }

    /// Explicitly join a conversation channel.
    pub async fn join_conversation(&mut self, conversation_id: impl Into<ConversationId>) {
        self.publish(ClientFrame::Join { conversation_id: conversation_id.into() }).await;
    }

    /// Explicitly leave a conversation channel.
    pub async fn leave_conversation(&mut self, conversation_id: impl Into<ConversationId>) {
        self.publish(ClientFrame::Leave { conversation_id: conversation_id.into() }).await;
    }

    /// Load one history page for the bound conversation.
    ///
    /// A newer load or a conversation switch supersedes the issued ticket,
    /// so a stale response is dropped instead of clobbering fresh state.
    /// Failures attach to the store as a scoped, retryable fault.
    pub async fn load_page(
        &mut self,
        gateway: &dyn MessageGateway,
        page: u32,
        limit: u32,
    ) -> Result<PageOutcome, GatewayError> {
        let Some(messages) = self.messages.as_mut() else {
            return Ok(PageOutcome::Stale);
        };
        let conversation_id = messages.conversation_id().to_owned();
        let ticket = messages.begin_page_load(page, limit);

        match gateway.list_messages(&conversation_id, page, limit).await {
            Ok((items, info)) => {
                let outcome = self
                    .messages
                    .as_mut()
                    .map_or(PageOutcome::Stale, |m| m.apply_page(&ticket, items, info));
                Ok(outcome)
            },
            Err(error) => {
                if let Some(messages) = self.messages.as_mut() {
                    messages.fail_page_load(&ticket, error.to_string());
                }
                Err(error)
            },
        }
    }

    /// Consume one dispatched event.
    ///
    /// Inbound domain frames are filtered to the bound conversation; typing
    /// events additionally exclude the local user. A `connected` lifecycle
    /// event re-joins the bound channel, since join state does not survive
    /// reconnects.
    pub async fn handle_event(&mut self, event: &SyncEvent) -> Vec<SessionNotice> {
        match event {
            SyncEvent::Lifecycle(LifecycleEvent::Connected { .. }) => {
                if let Some(conversation_id) = self.conversation_id.clone() {
                    self.publish(ClientFrame::Join { conversation_id }).await;
                }
                Vec::new()
            },
            SyncEvent::Lifecycle(_) => Vec::new(),
            SyncEvent::Frame(frame) => self.handle_frame(frame),
        }
    }

    /// Sweep session deadlines: typing expiry and the read-batch window.
    ///
    /// Expired flushes are published as one batched mark-read frame per
    /// conversation; a failed publish rolls the batch back for retry.
    pub async fn tick(&mut self) -> Vec<SessionNotice> {
        let now = self.env.now();
        let mut notices = Vec::new();

        let mut changed: Vec<ConversationId> = self
            .typing
            .tick(now)
            .into_iter()
            .map(|(conversation_id, _)| conversation_id)
            .collect();
        changed.dedup();
        notices.extend(
            changed
                .into_iter()
                .map(|conversation_id| SessionNotice::TypingChanged { conversation_id }),
        );

        if let Some(batch) = self.batcher.tick(now) {
            let mut all_delivered = true;
            {
                let mut manager = self.manager.lock().await;
                for (conversation_id, message_ids) in &batch.entries {
                    let delivered = manager
                        .publish(ClientFrame::MarkRead {
                            conversation_id: conversation_id.clone(),
                            message_ids: message_ids.clone(),
                        })
                        .await;
                    all_delivered &= delivered;
                }
            }
            if all_delivered {
                self.batcher.on_flush_success();
            } else {
                tracing::debug!("read flush failed; rolling back for retry");
                self.batcher.on_flush_failure();
            }
        }

        notices
    }

    fn handle_frame(&mut self, frame: &ServerFrame) -> Vec<SessionNotice> {
        let bound = self.conversation_id.as_deref();
        match frame {
            ServerFrame::NewMessage { message } => {
                if bound != Some(message.conversation_id.as_str()) {
                    return Vec::new();
                }
                let Some(messages) = self.messages.as_mut() else { return Vec::new() };
                match messages.apply_inbound(message.clone()) {
                    driftline_core::InboundOutcome::Appended => {
                        vec![SessionNotice::MessageAdded { message_id: message.id.clone() }]
                    },
                    _ => Vec::new(),
                }
            },
            ServerFrame::SendAck { temp_id, message } => {
                let Some(messages) = self.messages.as_mut() else { return Vec::new() };
                if bound != Some(message.conversation_id.as_str()) {
                    return Vec::new();
                }
                messages.confirm_send(temp_id, message.clone());
                vec![SessionNotice::MessageUpdated { message_id: message.id.clone() }]
            },
            ServerFrame::SendRejected { temp_id, reason } => {
                let Some(messages) = self.messages.as_mut() else { return Vec::new() };
                messages
                    .fail_send(temp_id, reason.clone())
                    .map(|pending| vec![SessionNotice::SendFailed { pending }])
                    .unwrap_or_default()
            },
            ServerFrame::MessageRead { conversation_id, message_ids, reader, read_at_ms } => {
                if bound != Some(conversation_id.as_str()) {
                    return Vec::new();
                }
                let Some(messages) = self.messages.as_mut() else { return Vec::new() };
                let updated = messages.apply_read(message_ids, reader, *read_at_ms);
                if updated == 0 {
                    return Vec::new();
                }
                vec![SessionNotice::ReadReceipts {
                    conversation_id: conversation_id.clone(),
                    updated,
                }]
            },
            ServerFrame::UserTyping { conversation_id, user_id } => {
                if bound != Some(conversation_id.as_str()) || *user_id == self.user_id {
                    return Vec::new();
                }
                let fresh =
                    self.typing.observe_start(conversation_id.clone(), user_id.clone(), self.env.now());
                if fresh {
                    vec![SessionNotice::TypingChanged { conversation_id: conversation_id.clone() }]
                } else {
                    Vec::new()
                }
            },
            ServerFrame::UserStoppedTyping { conversation_id, user_id } => {
                if bound != Some(conversation_id.as_str()) || *user_id == self.user_id {
                    return Vec::new();
                }
                if self.typing.observe_stop(conversation_id, user_id) {
                    vec![SessionNotice::TypingChanged { conversation_id: conversation_id.clone() }]
                } else {
                    Vec::new()
                }
            },
            ServerFrame::UserStatusChanged { .. } => Vec::new(),
        }
    }

    /// Publish one frame if connected; typing and membership are
    /// best-effort.
    async fn publish(&self, frame: ClientFrame) {
        let mut manager = self.manager.lock().await;
        if !manager.publish(frame).await {
            tracing::debug!("frame dropped while disconnected");
        }
    }
}
