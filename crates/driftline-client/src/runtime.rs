//! Async driver for the session and connection machinery.
//!
//! The pure machines model every timer as a deadline; this loop is the only
//! place those deadlines meet real (or virtual) time. One cycle pulls a
//! transport event, drains dispatched events into the session, and sweeps
//! the machines' deadlines. No other background tasks exist.

use std::{sync::Arc, time::Duration};

use driftline_core::{Environment, EventKind, SyncEvent};
use tokio::sync::{Mutex, mpsc};

use crate::{
    dispatcher::EventDispatcher, manager::ConnectionManager, session::ChatSession,
    session::SessionNotice, transport::Transport,
};

/// Interval between deadline sweeps.
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Every kind the session consumes.
const SESSION_KINDS: [EventKind; 8] = [
    EventKind::Connected,
    EventKind::NewMessage,
    EventKind::MessageRead,
    EventKind::UserTyping,
    EventKind::UserStoppedTyping,
    EventKind::SendAck,
    EventKind::SendRejected,
    EventKind::Disconnected,
];

/// Orchestration loop binding one session to the shared connection.
pub struct SessionRuntime<T, E: Environment> {
    manager: Arc<Mutex<ConnectionManager<T, E>>>,
    session: ChatSession<T, E>,
    env: E,
    events: mpsc::UnboundedReceiver<SyncEvent>,
    notices: mpsc::UnboundedSender<SessionNotice>,
}

impl<T: Transport, E: Environment> SessionRuntime<T, E> {
    /// Wire a session to the dispatcher and return the runtime plus the
    /// consumer's notice stream.
    pub fn new(
        manager: Arc<Mutex<ConnectionManager<T, E>>>,
        dispatcher: &EventDispatcher,
        session: ChatSession<T, E>,
        env: E,
    ) -> (Self, mpsc::UnboundedReceiver<SessionNotice>) {
        let (_tokens, events) = dispatcher.subscribe_channel(&SESSION_KINDS);
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        let runtime = Self { manager, session, env, events, notices: notices_tx };
        (runtime, notices_rx)
    }

    /// The session being driven.
    pub fn session(&self) -> &ChatSession<T, E> {
        &self.session
    }

    /// Mutable access for caller-initiated operations between cycles.
    pub fn session_mut(&mut self) -> &mut ChatSession<T, E> {
        &mut self.session
    }

    /// Run until the transport stream ends.
    pub async fn run(mut self) {
        loop {
            if !self.cycle().await {
                break;
            }
        }
    }

    /// Process one cycle; returns `false` once the transport is gone.
    ///
    /// A cycle waits for the next transport event, a dispatched event, or
    /// the tick interval - whichever comes first - then drains whatever is
    /// ready and sweeps all deadlines.
    pub async fn cycle(&mut self) -> bool {
        tokio::select! {
            biased;

            event = async {
                let mut manager = self.manager.lock().await;
                manager.next_transport_event().await
            } => {
                let Some(event) = event else { return false };
                self.manager.lock().await.handle_transport_event(event).await;
            },
            event = self.events.recv() => {
                if let Some(event) = event {
                    for notice in self.session.handle_event(&event).await {
                        let _ = self.notices.send(notice);
                    }
                }
            },
            () = self.env.sleep(TICK_INTERVAL) => {},
        }

        // Drain dispatched events produced by the transport event above
        // before sweeping deadlines.
        while let Ok(event) = self.events.try_recv() {
            for notice in self.session.handle_event(&event).await {
                let _ = self.notices.send(notice);
            }
        }

        self.manager.lock().await.tick().await;
        for notice in self.session.tick().await {
            let _ = self.notices.send(notice);
        }
        true
    }
}
