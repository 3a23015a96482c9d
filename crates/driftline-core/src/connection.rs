//! Connection lifecycle state machine.
//!
//! Manages the single transport connection: connect/disconnect intent,
//! automatic reconnection with exponential backoff, and attempt exhaustion.
//! Uses the action pattern: methods take time as input and return actions for
//! the driver to execute. This keeps the state machine pure (no I/O) and
//! makes testing straightforward.
//!
//! # State Machine
//!
//! ```text
//! ┌──────────────┐ connect  ┌────────────┐  opened   ┌───────────┐
//! │ Disconnected │─────────>│ Connecting │──────────>│ Connected │
//! └──────────────┘          └────────────┘           └───────────┘
//!        ↑                     │ error                    │ drop
//!        │ disconnect          ↓                          ↓
//!        │               ┌──────────────┐ deadline ┌────────────┐
//!        └───────────────│ Reconnecting │<─────────│ (schedule) │
//!                        └──────────────┘          └────────────┘
//!                              │ attempts exhausted
//!                              ↓
//!                        ┌────────┐
//!                        │ Failed │  terminal until connect/force_reconnect
//!                        └────────┘
//! ```
//!
//! Transport faults are never returned to callers synchronously; they only
//! manifest as emitted [`LifecycleEvent`]s, so consumers must be
//! event-driven, not exception-driven, for connectivity.

use std::time::Duration;

use crate::event::LifecycleEvent;

/// Default cap on consecutive reconnection attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay before the first reconnection attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Default upper bound on any reconnection delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Default multiplier applied per consecutive failure.
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Fixed delay before the attempt scheduled by `force_reconnect`.
pub const DEFAULT_FORCE_RECONNECT_DELAY: Duration = Duration::from_millis(250);

/// Reconnection tuning.
///
/// Replaced atomically by `update_policy`; takes effect on the next
/// scheduled attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    /// Consecutive failures tolerated before giving up.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any retry delay.
    pub max_delay: Duration,
    /// Multiplier applied per consecutive failure (clamped to >= 1.0).
    pub backoff_factor: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before attempt number `attempt` (1-based consecutive failure
    /// count): `min(base_delay × factor^(attempt-1), max_delay)`.
    ///
    /// The exponent is clamped so the computation cannot overflow; the
    /// result is always in `base_delay..=max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30);
        let factor = self.backoff_factor.max(1.0).powi(exponent as i32);
        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        Duration::from_millis((base_ms * factor).min(max_ms) as u64)
    }
}

/// Coarse lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No transport, no pending attempt. The initial state.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Transport established.
    Connected,
    /// A reconnection attempt is scheduled.
    Reconnecting,
    /// Attempts exhausted; terminal until explicit restart.
    Failed,
}

/// Actions returned by the connection state machine.
///
/// The driver executes these in order:
/// - `CloseTransport`: tear down the transport handle (idempotent)
/// - `OpenTransport`: open a fresh connection attempt
/// - `Emit`: republish a lifecycle event to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Tear down any existing transport handle.
    CloseTransport,

    /// Open a new transport connection.
    OpenTransport,

    /// Publish this lifecycle event to subscribers.
    Emit(LifecycleEvent),
}

/// Synchronous snapshot of connection state.
///
/// # Invariants
///
/// - `connected` and `reconnecting` are never both true
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    /// Whether the transport is established.
    pub connected: bool,
    /// Whether a reconnection attempt is scheduled or in flight.
    pub reconnecting: bool,
    /// Consecutive failures since the last success.
    pub attempt: u32,
    /// Configured attempt limit.
    pub max_attempts: u32,
    /// Server-assigned connection id. `None` unless connected.
    pub connection_id: Option<String>,
}

/// Connection lifecycle state machine.
///
/// Pure: no I/O, no timers. The reconnect timer is an explicit deadline
/// swept by [`ConnectionMachine::tick`]; cancellation clears the field.
///
/// Generic over `I` to support both real and virtual time.
#[derive(Debug, Clone)]
pub struct ConnectionMachine<I> {
    state: LifecycleState,
    policy: ReconnectPolicy,
    /// Consecutive failures since the last successful connection.
    attempt: u32,
    connection_id: Option<String>,
    /// When the next reconnection attempt fires. `None` when no attempt is
    /// scheduled; clearing this field is the cancellation handle.
    retry_at: Option<I>,
}

impl<I> ConnectionMachine<I>
where
    I: Copy + Ord + std::ops::Add<Duration, Output = I>,
{
    /// Create a machine in [`LifecycleState::Disconnected`].
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: LifecycleState::Disconnected,
            policy,
            attempt: 0,
            connection_id: None,
            retry_at: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Active reconnection policy.
    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Deadline of the scheduled reconnection attempt, if any.
    ///
    /// Drivers sleep until this instant and then call [`Self::tick`].
    pub fn retry_at(&self) -> Option<I> {
        self.retry_at
    }

    /// Replace the reconnection tuning atomically.
    ///
    /// Takes effect on the next scheduled attempt; an already-scheduled
    /// deadline is left untouched.
    pub fn update_policy(&mut self, policy: ReconnectPolicy) {
        self.policy = policy;
    }

    /// Synchronous snapshot read.
    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            connected: self.state == LifecycleState::Connected,
            reconnecting: self.state == LifecycleState::Reconnecting
                || (self.state == LifecycleState::Connecting && self.attempt > 0),
            attempt: self.attempt,
            max_attempts: self.policy.max_attempts,
            connection_id: self.connection_id.clone(),
        }
    }

    /// Begin connecting.
    ///
    /// No-op when already connected. Otherwise cancels any scheduled
    /// attempt, tears down a stale transport handle, and opens a new
    /// connection.
    pub fn connect(&mut self) -> Vec<ConnectionAction> {
        if self.state == LifecycleState::Connected {
            return Vec::new();
        }

        self.retry_at = None;
        self.state = LifecycleState::Connecting;
        vec![ConnectionAction::CloseTransport, ConnectionAction::OpenTransport]
    }

    /// Disconnect intentionally.
    ///
    /// Cancels any scheduled attempt, resets the failure counter, and does
    /// NOT trigger auto-reconnect: a transport-close notification arriving
    /// afterwards is ignored.
    pub fn disconnect(&mut self) -> Vec<ConnectionAction> {
        let was_idle =
            self.state == LifecycleState::Disconnected || self.state == LifecycleState::Failed;

        self.retry_at = None;
        self.attempt = 0;
        self.connection_id = None;
        self.state = LifecycleState::Disconnected;

        if was_idle {
            return vec![ConnectionAction::CloseTransport];
        }

        vec![
            ConnectionAction::CloseTransport,
            ConnectionAction::Emit(LifecycleEvent::Disconnected {
                reason: "disconnect requested".to_owned(),
            }),
        ]
    }

    /// Reset and reconnect after a short fixed delay.
    ///
    /// The only caller-driven way out of [`LifecycleState::Failed`] besides
    /// [`Self::connect`]. Resets the failure counter so backoff starts over.
    pub fn force_reconnect(&mut self, now: I) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();
        if self.state == LifecycleState::Connected {
            actions.push(ConnectionAction::CloseTransport);
        }

        self.attempt = 0;
        self.connection_id = None;
        self.state = LifecycleState::Reconnecting;
        self.retry_at = Some(now + DEFAULT_FORCE_RECONNECT_DELAY);

        actions.push(ConnectionAction::Emit(LifecycleEvent::Reconnecting {
            attempt: 0,
            delay: DEFAULT_FORCE_RECONNECT_DELAY,
        }));
        actions
    }

    /// Transport reported a successful connection.
    ///
    /// Resets the failure counter and clears any scheduled attempt - the
    /// only way out of `Reconnecting`/`Failed` besides explicit restart.
    pub fn handle_opened(&mut self, connection_id: String) -> Vec<ConnectionAction> {
        self.state = LifecycleState::Connected;
        self.attempt = 0;
        self.retry_at = None;
        self.connection_id = Some(connection_id.clone());

        tracing::debug!(%connection_id, "transport connected");
        vec![ConnectionAction::Emit(LifecycleEvent::Connected { connection_id })]
    }

    /// Transport reported a failed connection attempt.
    pub fn handle_connect_error(&mut self, now: I, error: String) -> Vec<ConnectionAction> {
        if self.state == LifecycleState::Disconnected || self.state == LifecycleState::Failed {
            // Stale notification from a torn-down attempt.
            return Vec::new();
        }

        let mut actions =
            vec![ConnectionAction::Emit(LifecycleEvent::ConnectError { error })];
        actions.extend(self.schedule_retry(now));
        actions
    }

    /// Transport reported a closed connection.
    ///
    /// Intentional disconnects were already transitioned by
    /// [`Self::disconnect`], so a close arriving in `Disconnected` is
    /// ignored rather than re-entering the reconnect path.
    pub fn handle_closed(&mut self, now: I, reason: String) -> Vec<ConnectionAction> {
        if self.state == LifecycleState::Disconnected || self.state == LifecycleState::Failed {
            return Vec::new();
        }

        self.connection_id = None;
        let mut actions =
            vec![ConnectionAction::Emit(LifecycleEvent::Disconnected { reason })];
        actions.extend(self.schedule_retry(now));
        actions
    }

    /// Sweep the reconnect deadline.
    ///
    /// When the scheduled instant has passed, transitions to `Connecting`
    /// and instructs the driver to open a fresh transport.
    pub fn tick(&mut self, now: I) -> Vec<ConnectionAction> {
        match self.retry_at {
            Some(deadline) if deadline <= now => {
                self.retry_at = None;
                self.state = LifecycleState::Connecting;
                vec![ConnectionAction::CloseTransport, ConnectionAction::OpenTransport]
            },
            _ => Vec::new(),
        }
    }

    fn schedule_retry(&mut self, now: I) -> Vec<ConnectionAction> {
        self.attempt += 1;

        if self.attempt > self.policy.max_attempts {
            // Should not happen: exhaustion is terminal and earlier failures
            // already stopped scheduling. Keep the state consistent anyway.
            self.state = LifecycleState::Failed;
            self.retry_at = None;
            return Vec::new();
        }

        if self.attempt == self.policy.max_attempts {
            self.state = LifecycleState::Failed;
            self.retry_at = None;
            tracing::warn!(attempts = self.attempt, "reconnection attempts exhausted");
            return vec![ConnectionAction::Emit(LifecycleEvent::MaxAttemptsReached {
                attempts: self.policy.max_attempts,
            })];
        }

        let delay = self.policy.delay_for(self.attempt);
        self.retry_at = Some(now + delay);
        self.state = LifecycleState::Reconnecting;
        tracing::debug!(attempt = self.attempt, ?delay, "reconnection scheduled");

        vec![ConnectionAction::Emit(LifecycleEvent::Reconnecting {
            attempt: self.attempt,
            delay,
        })]
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    // Time is a plain parameter, so tests pass a base instant plus offsets
    // instead of sleeping.
    fn machine(policy: ReconnectPolicy) -> ConnectionMachine<Instant> {
        ConnectionMachine::new(policy)
    }

    fn at(t0: Instant, offset_ms: u64) -> Instant {
        t0 + Duration::from_millis(offset_ms)
    }

    fn emitted(actions: &[ConnectionAction]) -> Vec<&LifecycleEvent> {
        actions
            .iter()
            .filter_map(|a| match a {
                ConnectionAction::Emit(event) => Some(event),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn connect_is_noop_when_connected() {
        let mut sm = machine(ReconnectPolicy::default());
        sm.connect();
        sm.handle_opened("conn-1".into());
        assert!(sm.connect().is_empty());
        assert_eq!(sm.state(), LifecycleState::Connected);
    }

    #[test]
    fn connect_opens_after_teardown() {
        let mut sm = machine(ReconnectPolicy::default());
        let actions = sm.connect();
        assert_eq!(
            actions,
            vec![ConnectionAction::CloseTransport, ConnectionAction::OpenTransport]
        );
        assert_eq!(sm.state(), LifecycleState::Connecting);
    }

    #[test]
    fn successful_open_resets_attempt_counter() {
        let t0 = Instant::now();
        let mut sm = machine(ReconnectPolicy::default());
        sm.connect();
        sm.handle_connect_error(t0, "refused".into());
        sm.handle_connect_error(t0, "refused".into());
        assert_eq!(sm.snapshot().attempt, 2);

        sm.handle_opened("conn-1".into());
        let snapshot = sm.snapshot();
        assert!(snapshot.connected);
        assert!(!snapshot.reconnecting);
        assert_eq!(snapshot.attempt, 0);
        assert_eq!(snapshot.connection_id.as_deref(), Some("conn-1"));
        assert!(sm.retry_at().is_none());
    }

    #[test]
    fn delays_grow_and_are_bounded() {
        let policy = ReconnectPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1500),
            backoff_factor: 2.0,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(4), Duration::from_millis(800));
        assert_eq!(policy.delay_for(5), Duration::from_millis(1500));
        assert_eq!(policy.delay_for(9), Duration::from_millis(1500));
    }

    #[test]
    fn disconnect_is_intentional_and_cancels_retry() {
        let t0 = Instant::now();
        let mut sm = machine(ReconnectPolicy::default());
        sm.connect();
        sm.handle_connect_error(t0, "refused".into());
        assert!(sm.retry_at().is_some());

        let actions = sm.disconnect();
        assert!(sm.retry_at().is_none());
        assert_eq!(sm.snapshot().attempt, 0);
        assert_eq!(sm.state(), LifecycleState::Disconnected);
        assert!(
            emitted(&actions)
                .iter()
                .any(|e| matches!(e, LifecycleEvent::Disconnected { .. }))
        );

        // A close notification arriving after intentional disconnect must not
        // restart the reconnect path.
        assert!(sm.handle_closed(at(t0, 10), "socket closed".into()).is_empty());
        assert_eq!(sm.state(), LifecycleState::Disconnected);
    }

    #[test]
    fn exhaustion_emits_exactly_once_and_is_terminal() {
        let policy = ReconnectPolicy { max_attempts: 3, ..ReconnectPolicy::default() };
        let mut sm = machine(policy);
        sm.connect();

        let t0 = Instant::now();
        let mut exhausted = 0;
        let mut offset = 0;
        for _ in 0..3 {
            let actions = sm.handle_connect_error(at(t0, offset), "refused".into());
            exhausted += emitted(&actions)
                .iter()
                .filter(|e| matches!(e, LifecycleEvent::MaxAttemptsReached { .. }))
                .count();
            // Drive any scheduled attempt to its deadline.
            offset += 60_000;
            sm.tick(at(t0, offset));
        }

        assert_eq!(exhausted, 1);
        assert_eq!(sm.state(), LifecycleState::Failed);

        // No further attempts fire without an explicit restart.
        assert!(sm.tick(at(t0, offset + 120_000)).is_empty());
        assert!(sm.handle_connect_error(at(t0, offset), "refused".into()).is_empty());
    }

    #[test]
    fn force_reconnect_leaves_failed_state() {
        let policy = ReconnectPolicy { max_attempts: 1, ..ReconnectPolicy::default() };
        let t0 = Instant::now();
        let mut sm = machine(policy);
        sm.connect();
        sm.handle_connect_error(t0, "refused".into());
        assert_eq!(sm.state(), LifecycleState::Failed);

        let actions = sm.force_reconnect(at(t0, 1_000));
        assert_eq!(sm.snapshot().attempt, 0);
        assert!(
            emitted(&actions)
                .iter()
                .any(|e| matches!(e, LifecycleEvent::Reconnecting { attempt: 0, .. }))
        );

        let actions = sm.tick(at(t0, 1_000) + DEFAULT_FORCE_RECONNECT_DELAY);
        assert!(actions.contains(&ConnectionAction::OpenTransport));
        assert_eq!(sm.state(), LifecycleState::Connecting);
    }

    #[test]
    fn unintentional_drop_schedules_reconnect() {
        let mut sm = machine(ReconnectPolicy::default());
        sm.connect();
        sm.handle_opened("conn-1".into());

        let t0 = Instant::now();
        let actions = sm.handle_closed(t0, "transport reset".into());
        let events = emitted(&actions);
        assert!(events.iter().any(|e| matches!(e, LifecycleEvent::Disconnected { .. })));
        assert!(
            events
                .iter()
                .any(|e| matches!(e, LifecycleEvent::Reconnecting { attempt: 1, .. }))
        );
        assert_eq!(sm.state(), LifecycleState::Reconnecting);

        // Before the deadline nothing fires.
        assert!(sm.tick(t0).is_empty());
    }

    #[test]
    fn updated_policy_applies_to_next_attempt() {
        let mut sm = machine(ReconnectPolicy::default());
        sm.connect();
        sm.update_policy(ReconnectPolicy {
            base_delay: Duration::from_millis(50),
            ..ReconnectPolicy::default()
        });

        let actions = sm.handle_connect_error(Instant::now(), "refused".into());
        assert!(emitted(&actions).iter().any(|e| matches!(
            e,
            LifecycleEvent::Reconnecting { delay, .. } if *delay == Duration::from_millis(50)
        )));
    }

    #[test]
    fn snapshot_never_reports_connected_and_reconnecting() {
        let mut sm = machine(ReconnectPolicy::default());
        sm.connect();
        let s = sm.snapshot();
        assert!(!(s.connected && s.reconnecting));

        sm.handle_connect_error(Instant::now(), "refused".into());
        let s = sm.snapshot();
        assert!(s.reconnecting && !s.connected);

        sm.handle_opened("conn-1".into());
        let s = sm.snapshot();
        assert!(s.connected && !s.reconnecting);
    }
}
