//! Delivery of broadcasts received from the server.
//!
//! Inbound frames only ever reach local listeners; nothing here writes to
//! the transport.

use serde_json::Value;
use tracing::debug;

use netbus_core::Listener;
use netbus_protocol::{InboundBroadcast, parse_payload};

/// Extracts a broadcast from a raw frame payload, or drops it.
pub(crate) fn resolve(payload: &[u8]) -> Option<InboundBroadcast> {
    let broadcast = InboundBroadcast::from_value(parse_payload(payload));
    if broadcast.is_none() {
        debug!(bytes = payload.len(), "dropping frame without a string event");
    }
    broadcast
}

/// Invokes `listeners` in order with the broadcast arguments.
///
/// Must be called without the client lock held: listeners may call back
/// into the client.
pub(crate) fn deliver(listeners: &[Listener], args: &[Value]) {
    for listener in listeners {
        listener(args);
    }
}
