//! Domain model for the synchronization engine.
//!
//! These structures are the consumer-visible view of conversations and
//! messages. Stores own the mutable instances; consumers receive read-only
//! snapshots and must never mutate them directly.

use serde::{Deserialize, Serialize};

/// Server-assigned user identifier.
pub type UserId = String;

/// Server-assigned conversation identifier.
pub type ConversationId = String;

/// Server-assigned message identifier (or a client temp id while pending).
pub type MessageId = String;

/// Milliseconds since the Unix epoch, as reported by the server.
pub type TimestampMs = i64;

/// A resolved user object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Server-assigned identifier.
    pub id: UserId,
    /// Display handle.
    pub username: String,
    /// Contact address, when the server exposes one.
    pub email: Option<String>,
}

/// Reference to a conversation participant.
///
/// Participants arrive either as bare ids (not yet fetched as objects) or as
/// resolved [`User`] records. Display derivation falls back to a fixed label
/// for bare ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserRef {
    /// Fully resolved user record.
    Resolved(User),
    /// Bare identifier, not yet resolved.
    Id(UserId),
}

impl UserRef {
    /// The user id this reference points at.
    pub fn id(&self) -> &str {
        match self {
            Self::Resolved(user) => &user.id,
            Self::Id(id) => id,
        }
    }

    /// Best available display label: username, else email, else `None`.
    pub fn display_label(&self) -> Option<&str> {
        match self {
            Self::Resolved(user) => {
                if user.username.is_empty() {
                    user.email.as_deref()
                } else {
                    Some(&user.username)
                }
            },
            Self::Id(_) => None,
        }
    }
}

/// Kind of message payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain text.
    Text,
    /// Image attachment reference.
    Image,
    /// File attachment reference.
    File,
    /// Server-generated notice (joins, renames).
    System,
}

/// A single read acknowledgement by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReceipt {
    /// User who read the message.
    pub user_id: UserId,
    /// When they read it.
    pub read_at_ms: TimestampMs,
}

/// A chat message.
///
/// # Invariants
///
/// - `id` is unique within a conversation
/// - `read_by` only grows until server deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique id within the conversation.
    pub id: MessageId,
    /// Owning conversation.
    pub conversation_id: ConversationId,
    /// Message author.
    pub sender: UserRef,
    /// Payload content (text, or an attachment reference).
    pub content: String,
    /// Server timestamp.
    pub timestamp_ms: TimestampMs,
    /// Users who have read this message.
    pub read_by: Vec<ReadReceipt>,
    /// Payload kind.
    pub kind: MessageKind,
    /// Whether the message has been edited.
    pub edited: bool,
    /// When the last edit happened. `None` if never edited.
    pub edited_at_ms: Option<TimestampMs>,
}

impl Message {
    /// Whether `user_id` appears in the read set.
    pub fn read_by_user(&self, user_id: &str) -> bool {
        self.read_by.iter().any(|r| r.user_id == user_id)
    }

    /// Whether any participant other than the sender has read this message.
    pub fn read_by_other(&self) -> bool {
        self.read_by.iter().any(|r| r.user_id != self.sender.id())
    }
}

/// Lightweight reference to a conversation's most recent message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    /// Message id.
    pub id: MessageId,
    /// Content preview for list rendering.
    pub preview: String,
    /// Server timestamp of the message.
    pub timestamp_ms: TimestampMs,
}

impl MessageRef {
    /// Build a reference from a full message.
    pub fn from_message(message: &Message) -> Self {
        Self {
            id: message.id.clone(),
            preview: message.content.clone(),
            timestamp_ms: message.timestamp_ms,
        }
    }
}

/// A conversation between two or more users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Server-assigned identifier.
    pub id: ConversationId,
    /// Participants in server order, deduplicated.
    pub participants: Vec<UserRef>,
    /// Whether this is a named group rather than a 1:1.
    pub is_group: bool,
    /// Group display name. `None` for 1:1 conversations.
    pub group_name: Option<String>,
    /// Most recent message, when any exists.
    pub last_message: Option<MessageRef>,
    /// Timestamp of the most recent activity.
    pub last_activity_ms: TimestampMs,
    /// Server-authoritative unread count for the owning user.
    pub unread_count: u32,
}

impl Conversation {
    /// The sole participant other than `user_id` in a 1:1 conversation.
    ///
    /// Returns `None` for groups or when no other participant exists.
    pub fn other_participant(&self, user_id: &str) -> Option<&UserRef> {
        if self.is_group {
            return None;
        }
        self.participants.iter().find(|p| p.id() != user_id)
    }
}

/// An optimistic send awaiting server confirmation.
///
/// Ephemeral: promoted to a real [`Message`] on confirmation, removed and
/// surfaced as an error on failure. The content survives failure so the
/// caller can re-offer it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    /// Client-generated correlation id.
    pub temp_id: String,
    /// Typed content.
    pub content: String,
    /// Payload kind.
    pub kind: MessageKind,
    /// Local submission time.
    pub submitted_at_ms: TimestampMs,
}

/// Derived delivery state of an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Optimistic, not yet confirmed by the server.
    Sent,
    /// Confirmed by the server, not yet read by anyone else.
    Delivered,
    /// Read by at least one participant other than the sender.
    Read,
}

/// Pagination metadata accompanying a gateway listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    /// Page number that was fetched (1-based).
    pub page: u32,
    /// Requested page size.
    pub limit: u32,
    /// Total items on the server, when known.
    pub total: u64,
    /// Whether further pages exist.
    pub has_more: bool,
}

/// Token tying an in-flight page load to the store generation that issued it.
///
/// Stores ignore pages applied with a superseded ticket; this is the
/// cancellation mechanism for stale loads after a conversation switch or a
/// newer load for the same scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    /// Scope the load belongs to (conversation id or user id).
    pub scope: String,
    /// Store generation at issue time.
    pub generation: u64,
    /// Requested page number (1-based).
    pub page: u32,
    /// Requested page size, used for the `has_more` heuristic.
    pub limit: u32,
}
