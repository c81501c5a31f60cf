//! Central event dispatcher for a session.
//!
//! The bus is an explicit, constructible instance handed to each component;
//! there is no process-global emitter. Delivery is in-process, in-order and
//! fully synchronous: by the time `emit` returns, every registered listener
//! has observed the event. Consumers that need asynchronous batching (a UI,
//! an SSE stream) buffer on their own side.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::Mutex;

use super::events::{Event, EventKind, EventPayload};

type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

struct Registered {
    id: u64,
    listener: Listener,
}

#[derive(Default)]
struct ListenerTable {
    by_kind: HashMap<EventKind, Vec<Registered>>,
    all: Vec<Registered>,
}

/// Typed publish/subscribe channel carrying all session notifications.
pub struct EventBus {
    session_id: String,
    /// Monotonic counter mixed into event identifiers so that events
    /// sharing a millisecond timestamp still get unique ids.
    seq: AtomicU64,
    listener_seq: AtomicU64,
    listeners: Mutex<ListenerTable>,
}

impl EventBus {
    pub fn new(session_id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            session_id: session_id.into(),
            seq: AtomicU64::new(0),
            listener_seq: AtomicU64::new(0),
            listeners: Mutex::new(ListenerTable::default()),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Assign identity to a payload. Producers never stamp their own events.
    fn stamp(&self, payload: EventPayload) -> Event {
        let now = Utc::now();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        Event {
            id: format!("evt-{}-{}", now.timestamp_millis(), seq),
            timestamp: now,
            session_id: self.session_id.clone(),
            payload,
            sub_events: Vec::new(),
        }
    }

    /// Emit an event: stamp it, deliver it synchronously to kind listeners
    /// then all-event listeners (in registration order), and return the
    /// stamped event to the producer.
    pub fn emit(&self, payload: EventPayload) -> Event {
        let event = self.stamp(payload);

        // Listener Arcs are cloned out of the lock so a listener may
        // subscribe, unsubscribe, or emit re-entrantly during delivery.
        let targets: Vec<Listener> = {
            let table = self.listeners.lock();
            let mut targets = Vec::new();
            if let Some(list) = table.by_kind.get(&event.kind()) {
                targets.extend(list.iter().map(|r| r.listener.clone()));
            }
            targets.extend(table.all.iter().map(|r| r.listener.clone()));
            targets
        };

        for listener in targets {
            listener(&event);
        }

        event
    }

    /// Attach a child event to an already-emitted parent. The child is
    /// stamped by the bus; the parent is not re-delivered.
    pub fn attach_sub_event(&self, parent: &mut Event, payload: EventPayload) {
        let child = self.stamp(payload);
        parent.sub_events.push(child);
    }

    /// Register a listener for one event kind. The returned handle must be
    /// kept to unsubscribe; dropping it does not remove the listener.
    pub fn subscribe<F>(self: &Arc<Self>, kind: EventKind, listener: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = self.listener_seq.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .by_kind
            .entry(kind)
            .or_default()
            .push(Registered {
                id,
                listener: Arc::new(listener),
            });
        Subscription {
            bus: Arc::downgrade(self),
            kind: Some(kind),
            id,
        }
    }

    /// Register a listener for every event kind.
    pub fn subscribe_all<F>(self: &Arc<Self>, listener: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = self.listener_seq.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().all.push(Registered {
            id,
            listener: Arc::new(listener),
        });
        Subscription {
            bus: Arc::downgrade(self),
            kind: None,
            id,
        }
    }

    fn remove_listener(&self, kind: Option<EventKind>, id: u64) {
        let mut table = self.listeners.lock();
        match kind {
            Some(kind) => {
                if let Some(list) = table.by_kind.get_mut(&kind) {
                    list.retain(|r| r.id != id);
                }
            }
            None => table.all.retain(|r| r.id != id),
        }
    }
}

/// Handle to a registered listener.
pub struct Subscription {
    bus: Weak<EventBus>,
    kind: Option<EventKind>,
    id: u64,
}

impl Subscription {
    /// Remove exactly this listener. Calling twice is a no-op.
    pub fn unsubscribe(&self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove_listener(self.kind, self.id);
        }
    }
}
