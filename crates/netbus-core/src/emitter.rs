//! Local publish/subscribe registry.
//!
//! [`Emitter`] maps event names to ordered listener lists and dispatches
//! positional JSON arguments to them. It knows nothing about the network;
//! the netbus client composes it with the subscription protocol.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

/// Listener limit per event before a leak warning is logged.
pub const DEFAULT_MAX_LISTENERS: usize = 10;

/// Callback invoked with the positional arguments of an event.
pub type Listener = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Wraps a closure as a [`Listener`].
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&[Value]) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Identity of a registered listener, used to remove it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

struct Entry {
    id: ListenerId,
    listener: Listener,
    once: bool,
}

/// Event name to listener table.
///
/// Duplicate registrations of the same callable are separate entries. Events
/// are reported by [`event_names`](Self::event_names) in the order they last
/// went from zero listeners to one.
pub struct Emitter {
    listeners: HashMap<String, Vec<Entry>>,
    order: Vec<String>,
    next_id: u64,
    max_listeners: usize,
    warned: HashSet<String>,
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: Vec<(&str, usize)> = self
            .order
            .iter()
            .map(|event| (event.as_str(), self.listener_count(event)))
            .collect();
        f.debug_struct("Emitter")
            .field("listeners", &counts)
            .field("max_listeners", &self.max_listeners)
            .finish()
    }
}

impl Emitter {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            listeners: HashMap::new(),
            order: Vec::new(),
            next_id: 0,
            max_listeners: DEFAULT_MAX_LISTENERS,
            warned: HashSet::new(),
        }
    }

    /// Sets the per-event listener count above which a warning is logged.
    ///
    /// Zero disables the warning.
    pub fn set_max_listeners(&mut self, max: usize) {
        self.max_listeners = max;
    }

    /// Returns the leak warning threshold.
    pub fn max_listeners(&self) -> usize {
        self.max_listeners
    }

    /// Appends a listener for `event`.
    pub fn add_listener(&mut self, event: &str, listener: Listener) -> ListenerId {
        self.insert(event, listener, false, false)
    }

    /// Inserts a listener for `event` ahead of the existing ones.
    pub fn prepend_listener(&mut self, event: &str, listener: Listener) -> ListenerId {
        self.insert(event, listener, false, true)
    }

    /// Appends a listener that is removed the first time it fires.
    pub fn once(&mut self, event: &str, listener: Listener) -> ListenerId {
        self.insert(event, listener, true, false)
    }

    /// Prepends a listener that is removed the first time it fires.
    pub fn prepend_once_listener(&mut self, event: &str, listener: Listener) -> ListenerId {
        self.insert(event, listener, true, true)
    }

    /// Removes the listener `id` from `event`.
    ///
    /// Returns false if it was not registered there.
    pub fn remove_listener(&mut self, event: &str, id: ListenerId) -> bool {
        let Some(entries) = self.listeners.get_mut(event) else {
            return false;
        };
        let Some(index) = entries.iter().position(|entry| entry.id == id) else {
            return false;
        };
        entries.remove(index);
        if entries.is_empty() {
            self.forget(event);
        }
        true
    }

    /// Removes every listener of `event`, or of all events when `None`.
    ///
    /// Returns the events that lost their last listener, in registration order.
    pub fn remove_all_listeners(&mut self, event: Option<&str>) -> Vec<String> {
        match event {
            Some(event) => {
                if self.listeners.contains_key(event) {
                    self.forget(event);
                    vec![event.to_string()]
                } else {
                    Vec::new()
                }
            }
            None => {
                self.listeners.clear();
                self.warned.clear();
                std::mem::take(&mut self.order)
            }
        }
    }

    /// Number of listeners registered for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.get(event).map_or(0, Vec::len)
    }

    /// Listeners of `event` in invocation order.
    pub fn listeners(&self, event: &str) -> Vec<Listener> {
        self.listeners
            .get(event)
            .map(|entries| entries.iter().map(|e| Arc::clone(&e.listener)).collect())
            .unwrap_or_default()
    }

    /// Events that currently have at least one listener.
    pub fn event_names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Snapshots the listeners of `event` for invocation and drops its
    /// once-listeners from the table.
    ///
    /// Callers holding the emitter behind a lock can release it before
    /// invoking the returned listeners.
    pub fn take_for_emit(&mut self, event: &str) -> Vec<Listener> {
        let Some(entries) = self.listeners.get_mut(event) else {
            return Vec::new();
        };
        let snapshot = entries.iter().map(|e| Arc::clone(&e.listener)).collect();
        entries.retain(|entry| !entry.once);
        if entries.is_empty() {
            self.forget(event);
        }
        snapshot
    }

    /// Invokes the listeners of `event` with `args`.
    ///
    /// Returns true if the event had listeners.
    pub fn emit(&mut self, event: &str, args: &[Value]) -> bool {
        let listeners = self.take_for_emit(event);
        for listener in &listeners {
            listener(args);
        }
        !listeners.is_empty()
    }

    fn insert(
        &mut self,
        event: &str,
        listener: Listener,
        once: bool,
        prepend: bool,
    ) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;

        if !self.listeners.contains_key(event) {
            self.order.push(event.to_string());
        }
        let entries = self.listeners.entry(event.to_string()).or_default();

        let entry = Entry { id, listener, once };
        if prepend {
            entries.insert(0, entry);
        } else {
            entries.push(entry);
        }

        let count = entries.len();
        if self.max_listeners > 0
            && count > self.max_listeners
            && self.warned.insert(event.to_string())
        {
            warn!(
                event,
                count,
                max = self.max_listeners,
                "possible listener leak: more listeners than max_listeners"
            );
        }

        id
    }

    fn forget(&mut self, event: &str) {
        self.listeners.remove(event);
        self.order.retain(|name| name != event);
        self.warned.remove(event);
    }
}
