//! In-process typed notification bus.

use crate::connection::ConnectionState;
use notesync_protocol::{Note, SyncConflict};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::error;

/// Kinds of events a handler can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A note was updated remotely.
    NoteUpdated,
    /// A note was deleted remotely.
    NoteDeleted,
    /// The remote asked for a sync pass.
    SyncRequired,
    /// The connection state changed.
    ConnectionStateChanged,
    /// A non-fatal failure worth surfacing.
    Error,
    /// A sync pass finished.
    SyncCompleted,
    /// A conflict was stored for manual resolution.
    ConflictDetected,
    /// A stored conflict was resolved.
    ConflictResolved,
}

/// An event published on the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A note was updated remotely.
    NoteUpdated(Note),
    /// A note was deleted remotely.
    NoteDeleted {
        /// Note ID.
        note_id: String,
    },
    /// The remote asked for a sync pass.
    SyncRequired {
        /// Reason given by the remote.
        reason: String,
    },
    /// The connection state changed.
    ConnectionStateChanged {
        /// Previous state.
        from: ConnectionState,
        /// New state.
        to: ConnectionState,
    },
    /// A non-fatal failure worth surfacing.
    Error {
        /// Error message.
        message: String,
    },
    /// A sync pass finished.
    SyncCompleted {
        /// Notes synced.
        synced: usize,
        /// Conflicts left for manual resolution.
        conflicts: usize,
        /// Notes that failed.
        errors: usize,
    },
    /// A conflict was stored for manual resolution.
    ConflictDetected(SyncConflict),
    /// A stored conflict was resolved.
    ConflictResolved {
        /// Note ID.
        note_id: String,
    },
}

impl SyncEvent {
    /// Returns the kind used for subscription matching.
    pub fn kind(&self) -> EventKind {
        match self {
            SyncEvent::NoteUpdated(_) => EventKind::NoteUpdated,
            SyncEvent::NoteDeleted { .. } => EventKind::NoteDeleted,
            SyncEvent::SyncRequired { .. } => EventKind::SyncRequired,
            SyncEvent::ConnectionStateChanged { .. } => EventKind::ConnectionStateChanged,
            SyncEvent::Error { .. } => EventKind::Error,
            SyncEvent::SyncCompleted { .. } => EventKind::SyncCompleted,
            SyncEvent::ConflictDetected(_) => EventKind::ConflictDetected,
            SyncEvent::ConflictResolved { .. } => EventKind::ConflictResolved,
        }
    }
}

/// Handle returned by [`NotificationBus::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    kind: EventKind,
    handler: Handler,
}

/// Synchronous publish/subscribe registry for [`SyncEvent`]s.
///
/// Handlers run on the emitting task in registration order. A handler that
/// panics is logged and skipped; the remaining handlers still run.
#[derive(Default)]
pub struct NotificationBus {
    subscriptions: Mutex<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl NotificationBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for one event kind.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.lock().push(Subscription {
            id,
            kind,
            handler: Arc::new(handler),
        });
        id
    }

    /// Removes a handler. Returns false if it was not registered.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.lock();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        subscriptions.len() != before
    }

    /// Returns the number of handlers registered for `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.subscriptions
            .lock()
            .iter()
            .filter(|s| s.kind == kind)
            .count()
    }

    /// Delivers `event` to every handler subscribed to its kind.
    pub fn emit(&self, event: &SyncEvent) {
        let kind = event.kind();
        // Handlers may subscribe or unsubscribe while running.
        let handlers: Vec<(SubscriptionId, Handler)> = self
            .subscriptions
            .lock()
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| (s.id, Arc::clone(&s.handler)))
            .collect();

        for (id, handler) in handlers {
            let result = catch_unwind(AssertUnwindSafe(|| handler(event)));
            if result.is_err() {
                error!(?kind, subscription = id.0, "event handler panicked");
            }
        }
    }
}

impl std::fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationBus")
            .field("subscriptions", &self.subscriptions.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sync_required() -> SyncEvent {
        SyncEvent::SyncRequired {
            reason: "test".into(),
        }
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let bus = NotificationBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = Arc::clone(&order);
            bus.on(EventKind::SyncRequired, move |_| order.lock().push(i));
        }
        bus.emit(&sync_required());

        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn only_matching_kind_is_delivered() {
        let bus = NotificationBus::new();
        let hits = Arc::new(AtomicU64::new(0));
        let h = Arc::clone(&hits);
        bus.on(EventKind::NoteDeleted, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&sync_required());
        bus.emit(&SyncEvent::NoteDeleted {
            note_id: "a".into(),
        });

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_handler_does_not_stop_others() {
        let bus = NotificationBus::new();
        let hits = Arc::new(AtomicU64::new(0));

        bus.on(EventKind::SyncRequired, |_| panic!("handler bug"));
        let h = Arc::clone(&hits);
        bus.on(EventKind::SyncRequired, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&sync_required());
        bus.emit(&sync_required());

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn off_unsubscribes() {
        let bus = NotificationBus::new();
        let id = bus.on(EventKind::Error, |_| {});
        assert_eq!(bus.handler_count(EventKind::Error), 1);
        assert!(bus.off(id));
        assert!(!bus.off(id));
        assert_eq!(bus.handler_count(EventKind::Error), 0);
    }

    #[test]
    fn handler_may_unsubscribe_itself() {
        let bus = Arc::new(NotificationBus::new());
        let slot = Arc::new(Mutex::new(None));
        let bus_ref = Arc::clone(&bus);
        let slot_ref = Arc::clone(&slot);
        let id = bus.on(EventKind::SyncRequired, move |_| {
            if let Some(id) = *slot_ref.lock() {
                bus_ref.off(id);
            }
        });
        *slot.lock() = Some(id);

        bus.emit(&sync_required());
        assert_eq!(bus.handler_count(EventKind::SyncRequired), 0);
    }
}
