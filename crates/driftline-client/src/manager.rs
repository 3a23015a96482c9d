//! Connection lifecycle manager.
//!
//! Wraps the pure [`ConnectionMachine`] with the process's single
//! [`Transport`] and the shared [`EventDispatcher`]: machine actions become
//! transport calls, machine events become dispatched [`SyncEvent`]s.
//!
//! Exactly one manager exists per process. It is injected explicitly into
//! every facade (constructor parameter, never a hidden global) so tests can
//! substitute a fake transport.

use std::sync::Arc;

use driftline_core::{
    ClientFrame, ConnectionAction, ConnectionMachine, ConnectionSnapshot, Environment,
    LifecycleState, ReconnectPolicy, SyncEvent,
};

use crate::{
    dispatcher::EventDispatcher,
    transport::{Transport, TransportEvent},
};

/// The single owner of the transport connection.
pub struct ConnectionManager<T, E: Environment> {
    env: E,
    transport: T,
    machine: ConnectionMachine<E::Instant>,
    dispatcher: Arc<EventDispatcher>,
    auth_token: Option<String>,
}

impl<T: Transport, E: Environment> ConnectionManager<T, E> {
    /// Create a manager around one transport.
    pub fn new(
        env: E,
        transport: T,
        dispatcher: Arc<EventDispatcher>,
        policy: ReconnectPolicy,
    ) -> Self {
        Self { env, transport, machine: ConnectionMachine::new(policy), dispatcher, auth_token: None }
    }

    /// Attach the opaque auth token handed to the transport at connect time.
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// The dispatcher lifecycle and domain events are published through.
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    /// Synchronous state snapshot.
    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.machine.snapshot()
    }

    /// Whether the transport is currently established.
    pub fn is_connected(&self) -> bool {
        self.machine.state() == LifecycleState::Connected
    }

    /// Deadline of the scheduled reconnection attempt, if any.
    pub fn retry_at(&self) -> Option<E::Instant> {
        self.machine.retry_at()
    }

    /// Begin connecting. No-op when already connected.
    pub async fn connect(&mut self) {
        let actions = self.machine.connect();
        self.run_actions(actions).await;
    }

    /// Disconnect intentionally; auto-reconnect stays off until the next
    /// explicit `connect`/`force_reconnect`.
    pub async fn disconnect(&mut self) {
        let actions = self.machine.disconnect();
        self.run_actions(actions).await;
    }

    /// Reset the backoff and reconnect after a short fixed delay.
    pub async fn force_reconnect(&mut self) {
        let now = self.env.now();
        let actions = self.machine.force_reconnect(now);
        self.run_actions(actions).await;
    }

    /// Replace the reconnection tuning; effective from the next scheduled
    /// attempt.
    pub fn update_config(&mut self, policy: ReconnectPolicy) {
        self.machine.update_policy(policy);
    }

    /// Publish one outbound frame.
    ///
    /// Returns `false` without touching the transport when not connected -
    /// the caller owns the fallback path. Publish failures are logged, not
    /// raised; the resulting drop surfaces through lifecycle events.
    pub async fn publish(&mut self, frame: ClientFrame) -> bool {
        if !self.is_connected() {
            return false;
        }
        match self.transport.publish(frame).await {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(%error, "publish failed; awaiting transport close");
                false
            },
        }
    }

    /// Pull the next transport event for [`Self::handle_transport_event`].
    pub async fn next_transport_event(&mut self) -> Option<TransportEvent> {
        self.transport.next_event().await
    }

    /// Feed one transport event through the state machine.
    ///
    /// Domain frames are republished as-is; lifecycle notifications drive
    /// the machine and may schedule reconnection.
    pub async fn handle_transport_event(&mut self, event: TransportEvent) {
        let now = self.env.now();
        let actions = match event {
            TransportEvent::Opened { connection_id } => self.machine.handle_opened(connection_id),
            TransportEvent::Closed { reason } => self.machine.handle_closed(now, reason),
            TransportEvent::ConnectFailed { error } => {
                self.machine.handle_connect_error(now, error)
            },
            TransportEvent::Frame(frame) => {
                self.dispatcher.emit(&SyncEvent::Frame(frame));
                Vec::new()
            },
        };
        self.run_actions(actions).await;
    }

    /// Sweep the reconnect deadline against the environment clock.
    pub async fn tick(&mut self) {
        let now = self.env.now();
        let actions = self.machine.tick(now);
        self.run_actions(actions).await;
    }

    async fn run_actions(&mut self, actions: Vec<ConnectionAction>) {
        for action in actions {
            match action {
                ConnectionAction::CloseTransport => self.transport.close().await,
                ConnectionAction::OpenTransport => {
                    self.transport.open(self.auth_token.as_deref()).await;
                },
                ConnectionAction::Emit(event) => {
                    self.dispatcher.emit(&SyncEvent::Lifecycle(event));
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex},
        time::Duration,
    };

    use async_trait::async_trait;
    use driftline_core::{EventKind, LifecycleEvent};

    use super::*;
    use crate::{env::SystemEnv, transport::TransportError};

    /// Minimal scripted transport for manager unit tests; the harness crate
    /// carries the full-featured one.
    #[derive(Default)]
    struct ScriptedTransport {
        opens: Arc<Mutex<u32>>,
        published: Arc<Mutex<Vec<ClientFrame>>>,
        events: Arc<Mutex<VecDeque<TransportEvent>>>,
        connected: bool,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn open(&mut self, _auth: Option<&str>) {
            *self.opens.lock().unwrap() += 1;
            self.connected = true;
            self.events
                .lock()
                .unwrap()
                .push_back(TransportEvent::Opened { connection_id: "conn-1".into() });
        }

        async fn close(&mut self) {
            self.connected = false;
        }

        async fn publish(&mut self, frame: ClientFrame) -> Result<(), TransportError> {
            if !self.connected {
                return Err(TransportError::Closed("not connected".into()));
            }
            self.published.lock().unwrap().push(frame);
            Ok(())
        }

        async fn next_event(&mut self) -> Option<TransportEvent> {
            self.events.lock().unwrap().pop_front()
        }
    }

    fn manager() -> (
        ConnectionManager<ScriptedTransport, SystemEnv>,
        Arc<Mutex<u32>>,
        Arc<EventDispatcher>,
    ) {
        let transport = ScriptedTransport::default();
        let opens = Arc::clone(&transport.opens);
        let dispatcher = Arc::new(EventDispatcher::new());
        let manager = ConnectionManager::new(
            SystemEnv,
            transport,
            Arc::clone(&dispatcher),
            ReconnectPolicy::default(),
        );
        (manager, opens, dispatcher)
    }

    #[tokio::test]
    async fn connect_opens_transport_and_emits_connected() {
        let (mut manager, opens, dispatcher) = manager();
        let connected = Arc::new(Mutex::new(Vec::new()));
        {
            let connected = Arc::clone(&connected);
            dispatcher.on(EventKind::Connected, move |event| {
                connected.lock().unwrap().push(event.clone());
            });
        }

        manager.connect().await;
        assert_eq!(*opens.lock().unwrap(), 1);

        let event = manager.next_transport_event().await.unwrap();
        manager.handle_transport_event(event).await;

        assert!(manager.is_connected());
        assert_eq!(manager.snapshot().connection_id.as_deref(), Some("conn-1"));
        assert_eq!(connected.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn publish_returns_false_when_disconnected() {
        let (mut manager, _, _) = manager();
        let delivered = manager
            .publish(ClientFrame::Join { conversation_id: "conv-1".into() })
            .await;
        assert!(!delivered);
    }

    #[tokio::test]
    async fn unintentional_close_schedules_reconnect() {
        let (mut manager, _, dispatcher) = manager();
        let reconnecting = Arc::new(Mutex::new(Vec::new()));
        {
            let reconnecting = Arc::clone(&reconnecting);
            dispatcher.on(EventKind::Reconnecting, move |event| {
                if let SyncEvent::Lifecycle(LifecycleEvent::Reconnecting { attempt, delay }) = event
                {
                    reconnecting.lock().unwrap().push((*attempt, *delay));
                }
            });
        }

        manager.connect().await;
        let event = manager.next_transport_event().await.unwrap();
        manager.handle_transport_event(event).await;

        manager
            .handle_transport_event(TransportEvent::Closed { reason: "reset".into() })
            .await;

        assert!(!manager.is_connected());
        assert!(manager.retry_at().is_some());
        assert_eq!(
            *reconnecting.lock().unwrap(),
            vec![(1, Duration::from_millis(1000))]
        );
    }

    #[tokio::test]
    async fn intentional_disconnect_does_not_reconnect() {
        let (mut manager, _, _) = manager();
        manager.connect().await;
        let event = manager.next_transport_event().await.unwrap();
        manager.handle_transport_event(event).await;

        manager.disconnect().await;
        assert!(manager.retry_at().is_none());

        // The transport's own close notification arrives afterwards.
        manager
            .handle_transport_event(TransportEvent::Closed { reason: "socket closed".into() })
            .await;
        assert!(manager.retry_at().is_none());
        assert_eq!(manager.snapshot().attempt, 0);
    }
}
