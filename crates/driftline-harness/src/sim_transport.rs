//! Scriptable in-memory transport.
//!
//! [`SimTransport`] implements the client's [`Transport`] trait over an
//! unbounded channel; the paired [`SimHandle`] is the test's remote control:
//! script connect outcomes, inject inbound frames, drop the connection, and
//! inspect everything the engine published.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use driftline_client::{Transport, TransportError, TransportEvent};
use driftline_core::{ClientFrame, ServerFrame};
use tokio::sync::mpsc;

#[derive(Debug)]
struct Shared {
    /// Scripted outcomes for upcoming `open` calls; empty means succeed.
    fail_next: VecDeque<String>,
    connected: bool,
    opens: u32,
    next_connection: u32,
    published: Vec<ClientFrame>,
    auth_tokens: Vec<Option<String>>,
}

/// Test-side remote control for a [`SimTransport`].
#[derive(Clone)]
pub struct SimHandle {
    shared: Arc<Mutex<Shared>>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl SimHandle {
    /// Queue `count` connect attempts to fail with `reason`.
    pub fn fail_next_connects(&self, count: usize, reason: &str) {
        let mut shared = self.lock();
        for _ in 0..count {
            shared.fail_next.push_back(reason.to_owned());
        }
    }

    /// Deliver one inbound frame as the server would.
    pub fn deliver(&self, frame: ServerFrame) {
        let _ = self.events.send(TransportEvent::Frame(frame));
    }

    /// Drop the connection out from under the engine.
    pub fn drop_connection(&self, reason: &str) {
        tracing::debug!(%reason, "sim transport dropping connection");
        self.lock().connected = false;
        let _ = self.events.send(TransportEvent::Closed { reason: reason.to_owned() });
    }

    /// Frames the engine has published so far.
    pub fn published(&self) -> Vec<ClientFrame> {
        self.lock().published.clone()
    }

    /// Drop recorded frames, keeping the connection as-is.
    pub fn clear_published(&self) {
        self.lock().published.clear();
    }

    /// Number of `open` calls observed.
    pub fn opens(&self) -> u32 {
        self.lock().opens
    }

    /// Whether the simulated socket is currently up.
    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    /// Auth tokens passed to each `open` call, in order.
    pub fn auth_tokens(&self) -> Vec<Option<String>> {
        self.lock().auth_tokens.clone()
    }

    #[allow(clippy::unwrap_used, reason = "state lock is never poisoned")]
    fn lock(&self) -> std::sync::MutexGuard<'_, Shared> {
        self.shared.lock().unwrap()
    }
}

/// In-memory [`Transport`] implementation.
pub struct SimTransport {
    shared: Arc<Mutex<Shared>>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl SimTransport {
    /// Create a transport plus its test handle.
    pub fn new() -> (Self, SimHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Mutex::new(Shared {
            fail_next: VecDeque::new(),
            connected: false,
            opens: 0,
            next_connection: 0,
            published: Vec::new(),
            auth_tokens: Vec::new(),
        }));
        let handle = SimHandle { shared: Arc::clone(&shared), events: events_tx.clone() };
        (Self { shared, events_tx, events_rx }, handle)
    }

    #[allow(clippy::unwrap_used, reason = "state lock is never poisoned")]
    fn lock(&self) -> std::sync::MutexGuard<'_, Shared> {
        self.shared.lock().unwrap()
    }
}

#[async_trait]
impl Transport for SimTransport {
    async fn open(&mut self, auth: Option<&str>) {
        let event = {
            let mut shared = self.lock();
            shared.opens += 1;
            shared.auth_tokens.push(auth.map(str::to_owned));

            match shared.fail_next.pop_front() {
                Some(reason) => {
                    tracing::debug!(%reason, "sim transport failing scripted connect");
                    TransportEvent::ConnectFailed { error: reason }
                },
                None => {
                    shared.connected = true;
                    shared.next_connection += 1;
                    TransportEvent::Opened {
                        connection_id: format!("sim-conn-{}", shared.next_connection),
                    }
                },
            }
        };
        let _ = self.events_tx.send(event);
    }

    async fn close(&mut self) {
        self.lock().connected = false;
    }

    async fn publish(&mut self, frame: ClientFrame) -> Result<(), TransportError> {
        let mut shared = self.lock();
        if !shared.connected {
            return Err(TransportError::Closed("not connected".into()));
        }
        shared.published.push(frame);
        Ok(())
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events_rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_failures_then_success() {
        let (mut transport, handle) = SimTransport::new();
        handle.fail_next_connects(1, "refused");

        transport.open(None).await;
        assert!(matches!(
            transport.next_event().await,
            Some(TransportEvent::ConnectFailed { .. })
        ));
        assert!(!handle.is_connected());

        transport.open(Some("token-1")).await;
        assert!(matches!(transport.next_event().await, Some(TransportEvent::Opened { .. })));
        assert!(handle.is_connected());
        assert_eq!(handle.auth_tokens(), vec![None, Some("token-1".to_owned())]);
    }

    #[tokio::test]
    async fn publish_requires_connection() {
        let (mut transport, handle) = SimTransport::new();
        let frame = ClientFrame::Join { conversation_id: "conv-1".into() };

        assert!(transport.publish(frame.clone()).await.is_err());
        transport.open(None).await;
        let _ = transport.next_event().await;
        assert!(transport.publish(frame).await.is_ok());
        assert_eq!(handle.published().len(), 1);
    }
}
