//! Transport seam and wire envelope codec.
//!
//! The engine owns exactly one transport connection per process and talks to
//! it through the [`Transport`] trait: open/close/publish plus a pulled
//! stream of [`TransportEvent`]s. Protocol logic never touches sockets;
//! production implementations (WebSocket, TCP) live outside this crate and
//! only need the line codec below, while the harness substitutes an
//! in-memory implementation.

use async_trait::async_trait;
use driftline_core::{ClientFrame, ServerFrame};
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The connection dropped or was closed underneath an operation.
    #[error("transport closed: {0}")]
    Closed(String),

    /// A frame failed to encode or decode.
    #[error("codec error: {0}")]
    Codec(String),
}

/// Events a transport delivers to the connection manager.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Connection established and identified by the server.
    Opened {
        /// Server-assigned connection id.
        connection_id: String,
    },

    /// Connection dropped.
    Closed {
        /// Transport-reported reason.
        reason: String,
    },

    /// A connection attempt failed.
    ConnectFailed {
        /// Transport-reported error.
        error: String,
    },

    /// A decoded inbound frame.
    Frame(ServerFrame),
}

/// One bidirectional connection to the messaging backend.
///
/// Implementations are expected to be cheap to re-open: the connection
/// manager calls [`Transport::close`] before every [`Transport::open`] to
/// tear down stale handles. All outcomes are reported through the event
/// stream, never thrown at the caller.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Begin a connection attempt.
    ///
    /// `auth` is the opaque token the backend expects at connect time. The
    /// outcome arrives as [`TransportEvent::Opened`] or
    /// [`TransportEvent::ConnectFailed`].
    async fn open(&mut self, auth: Option<&str>);

    /// Tear down the connection, if any. Idempotent.
    async fn close(&mut self);

    /// Publish one outbound frame.
    ///
    /// # Errors
    ///
    /// [`TransportError::Closed`] when no connection is established.
    async fn publish(&mut self, frame: ClientFrame) -> Result<(), TransportError>;

    /// Pull the next transport event. `None` once the transport is torn
    /// down for good.
    async fn next_event(&mut self) -> Option<TransportEvent>;
}

/// Newline-delimited JSON envelope codec for byte transports.
///
/// Frames are serde-tagged enums, one JSON object per line.
pub mod codec {
    use super::{ClientFrame, ServerFrame, TransportError};

    /// Encode one outbound frame as a JSON line (no trailing newline).
    pub fn encode_client_frame(frame: &ClientFrame) -> Result<String, TransportError> {
        serde_json::to_string(frame).map_err(|e| TransportError::Codec(e.to_string()))
    }

    /// Decode one inbound JSON line into a server frame.
    pub fn decode_server_frame(line: &str) -> Result<ServerFrame, TransportError> {
        serde_json::from_str(line.trim()).map_err(|e| TransportError::Codec(e.to_string()))
    }
}
