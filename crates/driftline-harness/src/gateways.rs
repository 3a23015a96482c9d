//! Scripted REST collaborators.
//!
//! Canned pages and queued failures for the gateway seams, plus a recording
//! notification sink. Everything is `Arc`-shared so tests keep a handle
//! after passing the gateway to the engine.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use driftline_client::{
    ConversationGateway, GatewayError, MessageGateway, NotificationSink, Severity,
};
use driftline_core::{Conversation, Message, MessageKind, PageInfo, UserRef};

type Page<T> = (Vec<T>, Option<PageInfo>);

#[derive(Debug, Default)]
struct MessageState {
    /// Pages keyed by (conversation, page number).
    pages: Vec<((String, u32), Page<Message>)>,
    fail_next: VecDeque<GatewayError>,
    calls: Vec<(String, u32, u32)>,
    #[allow(dead_code, reason = "scripted scaffolding field, not yet exercised")]
    marked_read: Vec<(String, Vec<String>)>,
}

/// Scriptable [`MessageGateway`].
#[derive(Clone, Default)]
pub struct ScriptedMessageGateway {
    state: Arc<Mutex<MessageState>>,
}

impl ScriptedMessageGateway {
    /// Create an empty gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script one page for a conversation.
    pub fn put_page(
        &self,
        conversation_id: &str,
        page: u32,
        items: Vec<Message>,
        info: Option<PageInfo>,
    ) {
        self.lock().pages.push(((conversation_id.to_owned(), page), (items, info)));
    }

    /// Queue a failure for the next listing call.
    pub fn fail_next(&self, error: GatewayError) {
        self.lock().fail_next.push_back(error);
    }

    /// Listing calls observed so far as (conversation, page, limit).
    pub fn calls(&self) -> Vec<(String, u32, u32)> {
        self.lock().calls.clone()
    }

    #[allow(clippy::unwrap_used, reason = "state lock is never poisoned")]
    fn lock(&self) -> std::sync::MutexGuard<'_, MessageState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl MessageGateway for ScriptedMessageGateway {
    async fn list_messages(
        &self,
        conversation_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<Page<Message>, GatewayError> {
        let mut state = self.lock();
        state.calls.push((conversation_id.to_owned(), page, limit));
        if let Some(error) = state.fail_next.pop_front() {
            return Err(error);
        }
        let key = (conversation_id.to_owned(), page);
        state
            .pages
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, page)| page.clone())
            .ok_or_else(|| GatewayError::Rejected(format!("no page {page} for {conversation_id}")))
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
        kind: MessageKind,
    ) -> Result<Message, GatewayError> {
        Ok(Message {
            id: format!("http-{}", self.lock().calls.len()),
            conversation_id: conversation_id.to_owned(),
            sender: UserRef::Id("local".into()),
            content: content.to_owned(),
            timestamp_ms: 0,
            read_by: Vec::new(),
            kind,
            edited: false,
            edited_at_ms: None,
        })
    }

    async fn update_message(
        &self,
        message_id: &str,
        content: &str,
    ) -> Result<Message, GatewayError> {
        Ok(Message {
            id: message_id.to_owned(),
            conversation_id: String::new(),
            sender: UserRef::Id("local".into()),
            content: content.to_owned(),
            timestamp_ms: 0,
            read_by: Vec::new(),
            kind: MessageKind::Text,
            edited: true,
            edited_at_ms: Some(0),
        })
    }

    async fn delete_message(&self, _message_id: &str) -> Result<(), GatewayError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ConversationState {
    pages: Vec<((String, u32), Page<Conversation>)>,
    fail_next: VecDeque<GatewayError>,
    calls: Vec<(String, u32, u32)>,
    deleted: Vec<String>,
}

/// Scriptable [`ConversationGateway`].
#[derive(Clone, Default)]
pub struct ScriptedConversationGateway {
    state: Arc<Mutex<ConversationState>>,
}

impl ScriptedConversationGateway {
    /// Create an empty gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script one page for a user's conversation listing.
    pub fn put_page(
        &self,
        user_id: &str,
        page: u32,
        items: Vec<Conversation>,
        info: Option<PageInfo>,
    ) {
        self.lock().pages.push(((user_id.to_owned(), page), (items, info)));
    }

    /// Queue a failure for the next listing call.
    pub fn fail_next(&self, error: GatewayError) {
        self.lock().fail_next.push_back(error);
    }

    /// Conversations deleted through this gateway.
    pub fn deleted(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }

    #[allow(clippy::unwrap_used, reason = "state lock is never poisoned")]
    fn lock(&self) -> std::sync::MutexGuard<'_, ConversationState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl ConversationGateway for ScriptedConversationGateway {
    async fn list_conversations(
        &self,
        user_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<Page<Conversation>, GatewayError> {
        let mut state = self.lock();
        state.calls.push((user_id.to_owned(), page, limit));
        if let Some(error) = state.fail_next.pop_front() {
            return Err(error);
        }
        let key = (user_id.to_owned(), page);
        state
            .pages
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, page)| page.clone())
            .ok_or_else(|| GatewayError::Rejected(format!("no page {page} for {user_id}")))
    }

    async fn create_conversation(
        &self,
        participants: Vec<UserRef>,
        is_group: bool,
        group_name: Option<String>,
    ) -> Result<Conversation, GatewayError> {
        Ok(Conversation {
            id: format!("conv-{}", self.lock().calls.len() + 1),
            participants,
            is_group,
            group_name,
            last_message: None,
            last_activity_ms: 0,
            unread_count: 0,
        })
    }

    async fn update_conversation(
        &self,
        conversation_id: &str,
        group_name: &str,
    ) -> Result<Conversation, GatewayError> {
        Ok(Conversation {
            id: conversation_id.to_owned(),
            participants: Vec::new(),
            is_group: true,
            group_name: Some(group_name.to_owned()),
            last_message: None,
            last_activity_ms: 0,
            unread_count: 0,
        })
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), GatewayError> {
        self.lock().deleted.push(conversation_id.to_owned());
        Ok(())
    }
}

/// Notification sink that records every call.
#[derive(Clone, Default)]
pub struct RecordingSink {
    notifications: Arc<Mutex<Vec<(String, Severity)>>>,
}

impl RecordingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications recorded so far.
    #[allow(clippy::unwrap_used, reason = "sink lock is never poisoned")]
    pub fn notifications(&self) -> Vec<(String, Severity)> {
        self.notifications.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingSink {
    #[allow(clippy::unwrap_used, reason = "sink lock is never poisoned")]
    fn notify(&self, message: &str, severity: Severity) {
        self.notifications.lock().unwrap().push((message.to_owned(), severity));
    }
}
