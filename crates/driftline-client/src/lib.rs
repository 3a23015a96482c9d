//! Client composition layer for Driftline.
//!
//! Wires the pure machines from [`driftline_core`] to the outside world:
//! the typed [`EventDispatcher`], the [`Transport`] seam with its JSON line
//! codec, the REST gateway traits, the process-singleton
//! [`ConnectionManager`], the conversation-scoped [`ChatSession`] facade,
//! and the [`SessionRuntime`] loop that turns deadlines into timer sleeps.
//!
//! # Architecture
//!
//! The same layering as the core: protocol logic stays Sans-IO, and this
//! crate owns the seams. Consumers construct one [`ConnectionManager`]
//! (explicit dependency, never a hidden global), any number of sessions over
//! it, and drive each session with a [`SessionRuntime`] - or drive the
//! pieces directly, as the test harness does.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod dispatcher;
mod env;
mod gateway;
mod manager;
mod runtime;
mod session;
mod transport;

pub use dispatcher::{EventDispatcher, Handler, HandlerToken};
pub use env::SystemEnv;
pub use gateway::{ConversationGateway, GatewayError, MessageGateway, NotificationSink, Severity};
pub use manager::ConnectionManager;
pub use runtime::{SessionRuntime, TICK_INTERVAL};
pub use session::{ChatSession, SessionConfig, SessionNotice, DEFAULT_MAX_CONTENT_LEN};
pub use transport::{codec, Transport, TransportError, TransportEvent};
