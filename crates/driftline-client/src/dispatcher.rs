//! Typed event fan-out.
//!
//! [`EventDispatcher`] is the registry that decouples the transport from
//! business logic: components register handlers per [`EventKind`] and the
//! connection manager emits every [`SyncEvent`] through it.
//!
//! # Registration policy
//!
//! Duplicate registrations are NOT deduplicated. Every [`EventDispatcher::on`]
//! call returns a fresh [`HandlerToken`]; registering the same closure twice
//! delivers twice, and the caller owns the symmetric
//! [`EventDispatcher::off`].
//!
//! # Failure isolation
//!
//! A panicking handler is caught, logged, and never prevents delivery to
//! subsequent handlers or corrupts registry state.

use std::{
    collections::HashMap,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Arc, Mutex},
};

use driftline_core::{EventKind, SyncEvent};
use tokio::sync::mpsc;

/// Boxed event handler.
pub type Handler = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

/// Proof of one registration; pass to [`EventDispatcher::off`] to remove it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerToken {
    kind: EventKind,
    id: u64,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<EventKind, Vec<(u64, Handler)>>,
}

/// Typed pub/sub registry keyed by event kind.
///
/// Cheap to share: interior mutability behind a short-lived lock, never held
/// while a handler runs.
#[derive(Default)]
pub struct EventDispatcher {
    registry: Mutex<Registry>,
}

impl EventDispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event kind.
    ///
    /// Handlers for the same kind run in registration order. Duplicate
    /// registrations deliver duplicate calls; each gets its own token.
    pub fn on(&self, kind: EventKind, handler: impl Fn(&SyncEvent) + Send + Sync + 'static) -> HandlerToken {
        self.on_arc(kind, Arc::new(handler))
    }

    /// Register an already-shared handler for one event kind.
    pub fn on_arc(&self, kind: EventKind, handler: Handler) -> HandlerToken {
        let mut registry = self.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.handlers.entry(kind).or_default().push((id, handler));
        HandlerToken { kind, id }
    }

    /// Remove one registration. Returns `false` for an already-removed
    /// token.
    pub fn off(&self, token: HandlerToken) -> bool {
        let mut registry = self.lock();
        let Some(handlers) = registry.handlers.get_mut(&token.kind) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(id, _)| *id != token.id);
        before != handlers.len()
    }

    /// Deliver an event to every handler registered for its kind.
    ///
    /// Handlers registered mid-delivery see the NEXT event, not this one.
    pub fn emit(&self, event: &SyncEvent) {
        let handlers: Vec<Handler> = {
            let registry = self.lock();
            registry
                .handlers
                .get(&event.kind())
                .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                tracing::warn!(kind = ?event.kind(), "event handler panicked; continuing dispatch");
            }
        }
    }

    /// Register a forwarding handler for several kinds, returning the
    /// receiving end of the channel.
    ///
    /// The session runtime uses this to consume events on its own task.
    pub fn subscribe_channel(
        &self,
        kinds: &[EventKind],
    ) -> (Vec<HandlerToken>, mpsc::UnboundedReceiver<SyncEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let tokens = kinds
            .iter()
            .map(|kind| {
                let tx = tx.clone();
                self.on(*kind, move |event| {
                    let _ = tx.send(event.clone());
                })
            })
            .collect();
        (tokens, rx)
    }

    #[allow(clippy::unwrap_used, reason = "registry lock is never poisoned: handlers run outside it")]
    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use driftline_core::LifecycleEvent;

    use super::*;

    fn connected() -> SyncEvent {
        SyncEvent::Lifecycle(LifecycleEvent::Connected { connection_id: "c1".into() })
    }

    #[test]
    fn delivers_in_registration_order() {
        let dispatcher = EventDispatcher::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            dispatcher.on(EventKind::Connected, move |_| {
                order.lock().unwrap().push(label);
            });
        }

        dispatcher.emit(&connected());
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn duplicate_registration_delivers_twice() {
        let dispatcher = EventDispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));
        let handler = {
            let count = Arc::clone(&count);
            Arc::new(move |_: &SyncEvent| {
                count.fetch_add(1, Ordering::SeqCst);
            }) as Handler
        };

        let first = dispatcher.on_arc(EventKind::Connected, Arc::clone(&handler));
        let second = dispatcher.on_arc(EventKind::Connected, handler);
        dispatcher.emit(&connected());
        assert_eq!(count.load(Ordering::SeqCst), 2);

        assert!(dispatcher.off(first));
        dispatcher.emit(&connected());
        assert_eq!(count.load(Ordering::SeqCst), 3);

        assert!(dispatcher.off(second));
        assert!(!dispatcher.off(second), "second removal is a no-op");
    }

    #[test]
    fn panicking_handler_does_not_stop_delivery() {
        let dispatcher = EventDispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));

        dispatcher.on(EventKind::Connected, |_| panic!("boom"));
        {
            let count = Arc::clone(&count);
            dispatcher.on(EventKind::Connected, move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        dispatcher.emit(&connected());
        dispatcher.emit(&connected());
        assert_eq!(count.load(Ordering::SeqCst), 2, "later handler still runs");
    }

    #[test]
    fn events_only_reach_matching_kind() {
        let dispatcher = EventDispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));
        {
            let count = Arc::clone(&count);
            dispatcher.on(EventKind::Disconnected, move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        dispatcher.emit(&connected());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn subscribe_channel_forwards_selected_kinds() {
        let dispatcher = EventDispatcher::new();
        let (tokens, mut rx) =
            dispatcher.subscribe_channel(&[EventKind::Connected, EventKind::Disconnected]);
        assert_eq!(tokens.len(), 2);

        dispatcher.emit(&connected());
        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind(), EventKind::Connected);
        assert!(rx.try_recv().is_err());
    }
}
