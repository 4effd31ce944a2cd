//! Writes subscription changes and broadcasts to the transport.
//!
//! Every send is gated on the connection state: while not connected the
//! client is a purely local event bus and sends are silently skipped.

use serde_json::Value;
use tracing::{debug, warn};

use netbus_protocol::{Delimiter, OutboundFrame, SubscriptionKind, encode_frame, encode_subscriptions};

use crate::hook::Intent;
use crate::lifecycle::Lifecycle;
use crate::transport::Transport;

pub(crate) struct Outbound<'a> {
    transport: Option<&'a dyn Transport>,
    delimiter: &'a Delimiter,
}

impl<'a> Outbound<'a> {
    pub(crate) fn new(lifecycle: &'a Lifecycle, delimiter: &'a Delimiter) -> Self {
        Self {
            transport: lifecycle.writer(),
            delimiter,
        }
    }

    /// Writes one frame per event as a single payload. Nothing is written
    /// for an empty list.
    pub(crate) fn send_intents<S: AsRef<str>>(&self, kind: SubscriptionKind, events: &[S]) -> bool {
        let Some(transport) = self.transport else {
            return false;
        };
        if events.is_empty() {
            return false;
        }

        match encode_subscriptions(kind, events.iter().map(AsRef::as_ref), self.delimiter) {
            Ok(payload) => {
                debug!(?kind, count = events.len(), "sending subscription frames");
                transport.write(payload);
                true
            }
            Err(e) => {
                warn!(?kind, error = %e, "failed to encode subscription frames");
                false
            }
        }
    }

    /// Writes the frame for a single intent, if any.
    pub(crate) fn send_intent(&self, intent: Option<Intent>) -> bool {
        match intent {
            Some(intent) => self.send_intents(intent.kind, &[intent.event]),
            None => false,
        }
    }

    pub(crate) fn send_broadcast(&self, event: &str, args: &[Value]) -> bool {
        let Some(transport) = self.transport else {
            return false;
        };

        match encode_frame(&OutboundFrame::Broadcast { event, args }, self.delimiter) {
            Ok(payload) => {
                debug!(event, args = args.len(), "sending broadcast");
                transport.write(payload);
                true
            }
            Err(e) => {
                warn!(event, error = %e, "failed to encode broadcast");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::transport::testing::RecordingTransport;
    use serde_json::json;

    fn connected(transport: &Arc<RecordingTransport>) -> Lifecycle {
        let mut lifecycle = Lifecycle::default();
        lifecycle.begin(transport.clone());
        lifecycle.establish();
        lifecycle
    }

    #[test]
    fn disconnected_sends_nothing() {
        let lifecycle = Lifecycle::default();
        let delimiter = Delimiter::default();
        let outbound = Outbound::new(&lifecycle, &delimiter);

        assert!(!outbound.send_intents(SubscriptionKind::Subscribe, &["a"]));
        assert!(!outbound.send_broadcast("a", &[]));
    }

    #[test]
    fn connecting_sends_nothing() {
        let transport = Arc::new(RecordingTransport::default());
        let mut lifecycle = Lifecycle::default();
        lifecycle.begin(transport.clone());
        let delimiter = Delimiter::default();

        let outbound = Outbound::new(&lifecycle, &delimiter);
        assert!(!outbound.send_intents(SubscriptionKind::Subscribe, &["a"]));
        assert_eq!(transport.write_count(), 0);
    }

    #[test]
    fn intents_are_one_write() {
        let transport = Arc::new(RecordingTransport::default());
        let lifecycle = connected(&transport);
        let delimiter = Delimiter::default();

        let outbound = Outbound::new(&lifecycle, &delimiter);
        assert!(outbound.send_intents(SubscriptionKind::Subscribe, &["a", "b"]));
        assert_eq!(
            transport.writes(),
            vec![r#"{"type":"subscribe","event":"a"}@@@{"type":"subscribe","event":"b"}@@@"#]
        );
    }

    #[test]
    fn empty_intents_write_nothing() {
        let transport = Arc::new(RecordingTransport::default());
        let lifecycle = connected(&transport);
        let delimiter = Delimiter::default();

        let none: [&str; 0] = [];
        assert!(!Outbound::new(&lifecycle, &delimiter).send_intents(SubscriptionKind::Unsubscribe, &none));
        assert_eq!(transport.write_count(), 0);
    }

    #[test]
    fn broadcast_frame() {
        let transport = Arc::new(RecordingTransport::default());
        let lifecycle = connected(&transport);
        let delimiter = Delimiter::new("\n").unwrap();

        Outbound::new(&lifecycle, &delimiter).send_broadcast("e", &[json!("x")]);
        assert_eq!(
            transport.writes(),
            vec!["{\"type\":\"broadcast\",\"event\":\"e\",\"args\":[\"x\"]}\n"]
        );
    }
}
