//! Deterministic simulation harness for Driftline sync testing.
//!
//! Virtual-clock implementations of the [`driftline_core::Environment`] and
//! [`driftline_client::Transport`] seams, plus scripted REST gateways, so
//! the full engine runs reproducibly without sockets, servers, or wall-clock
//! sleeps.
//!
//! # Pieces
//!
//! - [`SimEnv`]: virtual clock with manual [`SimEnv::advance`], seeded RNG
//! - [`SimTransport`] / [`SimHandle`]: scriptable in-memory transport -
//!   queue connect outcomes, inject frames, drop the connection, inspect
//!   published frames
//! - [`ScriptedMessageGateway`] / [`ScriptedConversationGateway`]: canned
//!   pages and failures for the REST seams
//! - [`RecordingSink`]: captures notifications for assertions

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod gateways;
mod sim_env;
mod sim_transport;

pub use gateways::{RecordingSink, ScriptedConversationGateway, ScriptedMessageGateway};
pub use sim_env::{SimEnv, SimInstant};
pub use sim_transport::{SimHandle, SimTransport};
