//! Turns listener-count transitions into subscription intents.
//!
//! Subscription state is never stored. An event is subscribed exactly when it
//! has at least one local listener, and every decision here derives from
//! [`is_subscribed`].

use netbus_core::Emitter;
use netbus_protocol::SubscriptionKind;

/// A subscription change that has not been written yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Intent {
    pub(crate) kind: SubscriptionKind,
    pub(crate) event: String,
}

impl Intent {
    fn new(kind: SubscriptionKind, event: &str) -> Self {
        Self {
            kind,
            event: event.to_string(),
        }
    }
}

/// Whether the server should be sending us broadcasts for `event`.
pub(crate) fn is_subscribed(emitter: &Emitter, event: &str) -> bool {
    emitter.listener_count(event) > 0
}

/// Run after a listener was added to `event`.
pub(crate) fn after_add(emitter: &Emitter, event: &str) -> Option<Intent> {
    (emitter.listener_count(event) == 1).then(|| Intent::new(SubscriptionKind::Subscribe, event))
}

/// Run after at least one listener was removed from `event`.
pub(crate) fn after_remove(emitter: &Emitter, event: &str) -> Option<Intent> {
    (!is_subscribed(emitter, event)).then(|| Intent::new(SubscriptionKind::Unsubscribe, event))
}

/// Events to re-subscribe on a new connection, in registration order.
pub(crate) fn replay_set(emitter: &Emitter) -> Vec<String> {
    emitter
        .event_names()
        .into_iter()
        .filter(|event| is_subscribed(emitter, event))
        .collect()
}
