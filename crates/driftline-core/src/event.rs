//! Closed event taxonomy for transport and dispatch.
//!
//! One variant per domain event, replacing duck-typed payload fan-out with a
//! tagged union. [`ServerFrame`] and [`ClientFrame`] are the wire-level
//! vocabulary (serde-tagged for byte transports); [`LifecycleEvent`] is
//! produced by the connection machine; [`SyncEvent`] is the single payload
//! type the dispatcher delivers, keyed by [`EventKind`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{ConversationId, Message, MessageId, MessageKind, TimestampMs, UserId};

/// Inbound frames delivered by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// A new message in some conversation.
    NewMessage {
        /// The message as the server stored it.
        message: Message,
    },

    /// One or more messages were read by a user.
    MessageRead {
        /// Conversation the messages belong to.
        conversation_id: ConversationId,
        /// Messages that were read.
        message_ids: Vec<MessageId>,
        /// User who read them.
        reader: UserId,
        /// When they were read.
        read_at_ms: TimestampMs,
    },

    /// A user started typing.
    UserTyping {
        /// Conversation they are typing in.
        conversation_id: ConversationId,
        /// The typing user.
        user_id: UserId,
    },

    /// A user stopped typing.
    ///
    /// Delivery is not guaranteed; clients expire indicators locally.
    UserStoppedTyping {
        /// Conversation they were typing in.
        conversation_id: ConversationId,
        /// The user who stopped.
        user_id: UserId,
    },

    /// A user's presence changed.
    UserStatusChanged {
        /// The user whose status changed.
        user_id: UserId,
        /// Whether they are now online.
        online: bool,
    },

    /// Server confirmation of an optimistic send.
    SendAck {
        /// Client correlation id from the outbound frame.
        temp_id: String,
        /// The authoritative message record.
        message: Message,
    },

    /// Server rejection of an optimistic send.
    SendRejected {
        /// Client correlation id from the outbound frame.
        temp_id: String,
        /// Server-reported reason.
        reason: String,
    },
}

/// Outbound frames published to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Join a conversation channel.
    Join {
        /// Conversation to join.
        conversation_id: ConversationId,
    },

    /// Leave a conversation channel.
    Leave {
        /// Conversation to leave.
        conversation_id: ConversationId,
    },

    /// Send a message.
    SendMessage {
        /// Target conversation.
        conversation_id: ConversationId,
        /// Client correlation id for the ack.
        temp_id: String,
        /// Message content.
        content: String,
        /// Payload kind.
        kind: MessageKind,
    },

    /// Mark a batch of messages as read.
    MarkRead {
        /// Conversation the messages belong to.
        conversation_id: ConversationId,
        /// Distinct message ids, each at most once.
        message_ids: Vec<MessageId>,
    },

    /// Local user started typing.
    TypingStart {
        /// Conversation being typed in.
        conversation_id: ConversationId,
    },

    /// Local user stopped typing.
    TypingStop {
        /// Conversation being typed in.
        conversation_id: ConversationId,
    },
}

/// Connection lifecycle notifications.
///
/// These are the ONLY way transport faults surface to consumers; nothing in
/// the engine raises them synchronously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Transport established and identified.
    Connected {
        /// Server-assigned connection identifier.
        connection_id: String,
    },

    /// Transport dropped (intentionally or not).
    Disconnected {
        /// Close reason, as reported by the transport.
        reason: String,
    },

    /// A reconnection attempt has been scheduled.
    Reconnecting {
        /// Consecutive failures since the last success.
        attempt: u32,
        /// Delay before the scheduled attempt.
        delay: Duration,
    },

    /// A connection attempt failed.
    ConnectError {
        /// Transport-reported error.
        error: String,
    },

    /// Reconnection attempts are exhausted.
    ///
    /// Terminal until an explicit `connect` or `force_reconnect`. Emitted
    /// exactly once per exhaustion.
    MaxAttemptsReached {
        /// The configured attempt limit that was hit.
        attempts: u32,
    },
}

/// The single payload type delivered through the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Connection lifecycle transition.
    Lifecycle(LifecycleEvent),
    /// Domain frame from the server.
    Frame(ServerFrame),
}

/// Registration key for dispatcher subscriptions: one tag per event variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// [`LifecycleEvent::Connected`]
    Connected,
    /// [`LifecycleEvent::Disconnected`]
    Disconnected,
    /// [`LifecycleEvent::Reconnecting`]
    Reconnecting,
    /// [`LifecycleEvent::ConnectError`]
    ConnectError,
    /// [`LifecycleEvent::MaxAttemptsReached`]
    MaxAttemptsReached,
    /// [`ServerFrame::NewMessage`]
    NewMessage,
    /// [`ServerFrame::MessageRead`]
    MessageRead,
    /// [`ServerFrame::UserTyping`]
    UserTyping,
    /// [`ServerFrame::UserStoppedTyping`]
    UserStoppedTyping,
    /// [`ServerFrame::UserStatusChanged`]
    UserStatusChanged,
    /// [`ServerFrame::SendAck`]
    SendAck,
    /// [`ServerFrame::SendRejected`]
    SendRejected,
}

impl SyncEvent {
    /// The registration tag this event dispatches under.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Lifecycle(event) => match event {
                LifecycleEvent::Connected { .. } => EventKind::Connected,
                LifecycleEvent::Disconnected { .. } => EventKind::Disconnected,
                LifecycleEvent::Reconnecting { .. } => EventKind::Reconnecting,
                LifecycleEvent::ConnectError { .. } => EventKind::ConnectError,
                LifecycleEvent::MaxAttemptsReached { .. } => EventKind::MaxAttemptsReached,
            },
            Self::Frame(frame) => match frame {
                ServerFrame::NewMessage { .. } => EventKind::NewMessage,
                ServerFrame::MessageRead { .. } => EventKind::MessageRead,
                ServerFrame::UserTyping { .. } => EventKind::UserTyping,
                ServerFrame::UserStoppedTyping { .. } => EventKind::UserStoppedTyping,
                ServerFrame::UserStatusChanged { .. } => EventKind::UserStatusChanged,
                ServerFrame::SendAck { .. } => EventKind::SendAck,
                ServerFrame::SendRejected { .. } => EventKind::SendRejected,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let event = SyncEvent::Lifecycle(LifecycleEvent::Connected { connection_id: "c".into() });
        assert_eq!(event.kind(), EventKind::Connected);

        let event = SyncEvent::Frame(ServerFrame::UserTyping {
            conversation_id: "conv".into(),
            user_id: "u".into(),
        });
        assert_eq!(event.kind(), EventKind::UserTyping);
    }
}
