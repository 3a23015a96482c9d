//! REST collaborator seams.
//!
//! CRUD plumbing is outside the engine's scope; the reconcilers only need
//! narrow async listing/mutation surfaces plus pagination metadata. Real
//! HTTP implementations live with the application; the harness provides
//! scripted ones.

use async_trait::async_trait;
use driftline_core::{Conversation, Message, MessageKind, PageInfo, UserRef};
use thiserror::Error;

/// Gateway faults, as reported by the REST collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The collaborator could not be reached or timed out.
    #[error("gateway unavailable: {0}")]
    Unavailable(String),

    /// The collaborator rejected the request.
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Paginated message listing and message mutations.
#[async_trait]
pub trait MessageGateway: Send + Sync {
    /// List one page of a conversation's messages, oldest first within the
    /// page.
    async fn list_messages(
        &self,
        conversation_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<Message>, Option<PageInfo>), GatewayError>;

    /// Send a message over HTTP - the fallback path when real-time send is
    /// unavailable.
    async fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
        kind: MessageKind,
    ) -> Result<Message, GatewayError>;

    /// Edit a message's content.
    async fn update_message(&self, message_id: &str, content: &str)
    -> Result<Message, GatewayError>;

    /// Delete a message.
    async fn delete_message(&self, message_id: &str) -> Result<(), GatewayError>;
}

/// Paginated conversation listing and conversation mutations.
#[async_trait]
pub trait ConversationGateway: Send + Sync {
    /// List one page of the user's conversations.
    async fn list_conversations(
        &self,
        user_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<Conversation>, Option<PageInfo>), GatewayError>;

    /// Create a conversation.
    async fn create_conversation(
        &self,
        participants: Vec<UserRef>,
        is_group: bool,
        group_name: Option<String>,
    ) -> Result<Conversation, GatewayError>;

    /// Rename a group conversation.
    async fn update_conversation(
        &self,
        conversation_id: &str,
        group_name: &str,
    ) -> Result<Conversation, GatewayError>;

    /// Delete a conversation.
    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), GatewayError>;
}

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Informational.
    Info,
    /// Degraded but working.
    Warning,
    /// Action failed.
    Error,
}

/// One-way notification sink for lifecycle transitions.
///
/// Consumed by callers, never required by the core logic.
pub trait NotificationSink: Send + Sync {
    /// Show one notification to the user.
    fn notify(&self, message: &str, severity: Severity);
}
