//! Core synchronization engine for Driftline.
//!
//! Pure state machines for client-side chat synchronization: connection
//! lifecycle with reconnection backoff, message and conversation
//! reconciliation, read-receipt batching, and typing-indicator expiry.
//!
//! # Architecture
//!
//! Every component here is Sans-IO: time enters as a method parameter
//! (`now`), timers are explicit deadline fields swept by `tick`, and methods
//! return data or action lists for the caller to execute. The composition
//! layer (`driftline-client`) wires these machines to a transport and an
//! async runtime; the harness drives them under virtual time.
//!
//! # Components
//!
//! - [`ConnectionMachine`]: connection lifecycle and reconnection backoff
//! - [`MessageStore`]: per-conversation message reconciliation
//! - [`ConversationStore`]: per-user conversation reconciliation
//! - [`ReadBatcher`]: debounced, deduplicated read-receipt batching
//! - [`TypingTracker`]: transient typing indicators with client-side expiry
//! - [`Environment`]: time and randomness abstraction for deterministic tests

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod connection;
mod conversations;
mod env;
mod error;
mod event;
mod messages;
mod read_batch;
mod types;
mod typing;

pub use connection::{
    ConnectionAction, ConnectionMachine, ConnectionSnapshot, LifecycleState, ReconnectPolicy,
    DEFAULT_BASE_DELAY, DEFAULT_BACKOFF_FACTOR, DEFAULT_FORCE_RECONNECT_DELAY, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_DELAY,
};
pub use conversations::{ConversationFilter, ConversationStore, FALLBACK_GROUP_NAME, FALLBACK_USER_NAME};
pub use env::Environment;
pub use error::{ReconcileError, SendError};
pub use event::{ClientFrame, EventKind, LifecycleEvent, ServerFrame, SyncEvent};
pub use messages::{InboundOutcome, MessageStore, PageOutcome};
pub use read_batch::{ReadBatch, ReadBatcher, DEFAULT_READ_BATCH_WINDOW};
pub use types::{
    Conversation, ConversationId, DeliveryStatus, LoadTicket, Message, MessageId, MessageKind,
    MessageRef, PageInfo, PendingSend, ReadReceipt, TimestampMs, User, UserId, UserRef,
};
pub use typing::{TypingTracker, DEFAULT_TYPING_TTL};
