//! Listener registry and dispatch

use super::types::{Event, EventKind};
use crate::telemetry::{increment, CounterMetric};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Callback invoked with every event of the kind it was registered for
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Event kind to ordered callbacks
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: HashMap<EventKind, Vec<Listener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a callback; duplicates are kept and invoked separately
    pub fn add(&mut self, kind: EventKind, listener: Listener) {
        self.listeners.entry(kind).or_default().push(listener);
    }

    /// Remove the first registration of `listener`; returns whether one was found
    pub fn remove(&mut self, kind: EventKind, listener: &Listener) -> bool {
        let Some(callbacks) = self.listeners.get_mut(&kind) else {
            return false;
        };

        match callbacks.iter().position(|cb| Arc::ptr_eq(cb, listener)) {
            Some(index) => {
                callbacks.remove(index);
                true
            }
            None => false,
        }
    }

    /// Number of registrations for a kind
    pub fn len(&self, kind: EventKind) -> usize {
        self.listeners.get(&kind).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.values().all(Vec::is_empty)
    }

    /// Clone the callbacks for a kind so they can run without the registry lock
    pub fn snapshot(&self, kind: EventKind) -> Vec<Listener> {
        self.listeners.get(&kind).cloned().unwrap_or_default()
    }
}

/// Invoke each callback in order, isolating panics
pub fn dispatch(listeners: &[Listener], event: &Event) {
    for listener in listeners {
        if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
            increment(CounterMetric::ListenerPanics);
            tracing::error!(event = %event.kind(), "Error executing WebSocket listener callback");
        }
    }
}
