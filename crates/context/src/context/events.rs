//! Synchronous registry events and error listeners

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::binding::Binding;
use crate::context::Context;
use crate::errors::ContextError;

/// Kind of registry change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextEventType {
    Bind,
    Unbind,
}

impl ContextEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextEventType::Bind => "bind",
            ContextEventType::Unbind => "unbind",
        }
    }
}

impl fmt::Display for ContextEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A binding was added to or removed from `context`
#[derive(Debug, Clone)]
pub struct ContextEvent {
    pub event_type: ContextEventType,
    pub binding: Binding,
    /// Context whose registry changed (an ancestor for forwarded events)
    pub context: Context,
}

pub type ListenerId = u64;
pub type ContextEventListener = Arc<dyn Fn(&ContextEvent) + Send + Sync>;
pub type ErrorListener = Arc<dyn Fn(&ContextError) + Send + Sync>;

/// Listener lists of a context
///
/// Listeners are cloned out of the lock before being called, so a listener
/// may add or remove listeners.
#[derive(Default)]
pub(crate) struct ContextEmitter {
    listeners: Mutex<Vec<(ListenerId, ContextEventListener)>>,
    error_listeners: Mutex<Vec<(ListenerId, ErrorListener)>>,
    next_id: AtomicU64,
}

impl ContextEmitter {
    fn next_id(&self) -> ListenerId {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn add_listener(&self, listener: ContextEventListener) -> ListenerId {
        let id = self.next_id();
        self.listeners.lock().push((id, listener));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        before != listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn emit(&self, event: &ContextEvent) {
        let listeners: Vec<ContextEventListener> =
            self.listeners.lock().iter().map(|(_, listener)| listener.clone()).collect();
        for listener in listeners {
            listener(event);
        }
    }

    pub fn add_error_listener(&self, listener: ErrorListener) -> ListenerId {
        let id = self.next_id();
        self.error_listeners.lock().push((id, listener));
        id
    }

    pub fn remove_error_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.error_listeners.lock();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        before != listeners.len()
    }

    /// Deliver an error; returns false when nobody listens
    pub fn emit_error(&self, error: &ContextError) -> bool {
        let listeners: Vec<ErrorListener> = self
            .error_listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        if listeners.is_empty() {
            return false;
        }
        for listener in listeners {
            listener(error);
        }
        true
    }

    pub fn clear(&self) {
        self.listeners.lock().clear();
        self.error_listeners.lock().clear();
    }
}
