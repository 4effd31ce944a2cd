//! Envelope types for the netbus protocol.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The `type` field of a client frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    Subscribe,
    Unsubscribe,
    Broadcast,
}

impl FrameKind {
    /// Wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::Broadcast => "broadcast",
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a subscription change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionKind {
    Subscribe,
    Unsubscribe,
}

impl SubscriptionKind {
    /// Builds the frame announcing this change for `event`.
    pub fn frame(self, event: &str) -> OutboundFrame<'_> {
        match self {
            Self::Subscribe => OutboundFrame::Subscribe { event },
            Self::Unsubscribe => OutboundFrame::Unsubscribe { event },
        }
    }
}

impl From<SubscriptionKind> for FrameKind {
    fn from(kind: SubscriptionKind) -> Self {
        match kind {
            SubscriptionKind::Subscribe => Self::Subscribe,
            SubscriptionKind::Unsubscribe => Self::Unsubscribe,
        }
    }
}

/// A frame written by a client.
///
/// Serializes with the `type` tag first, then `event`, then `args`, which is
/// the exact field order peers expect.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundFrame<'a> {
    Subscribe { event: &'a str },
    Unsubscribe { event: &'a str },
    Broadcast { event: &'a str, args: &'a [Value] },
}

impl OutboundFrame<'_> {
    /// Returns the kind of this frame.
    pub fn kind(&self) -> FrameKind {
        match self {
            Self::Subscribe { .. } => FrameKind::Subscribe,
            Self::Unsubscribe { .. } => FrameKind::Unsubscribe,
            Self::Broadcast { .. } => FrameKind::Broadcast,
        }
    }

    /// Returns the event name carried by this frame.
    pub fn event(&self) -> &str {
        match self {
            Self::Subscribe { event } | Self::Unsubscribe { event } | Self::Broadcast { event, .. } => {
                event
            }
        }
    }
}

/// A client frame as read by the relay server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    Subscribe {
        event: String,
    },
    Unsubscribe {
        event: String,
    },
    Broadcast {
        event: String,
        #[serde(default)]
        args: Vec<Value>,
    },
}

/// A broadcast delivered by the server to a subscribed client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InboundBroadcast {
    /// Event name.
    pub event: String,
    /// Positional listener arguments.
    pub args: Vec<Value>,
}

impl InboundBroadcast {
    /// Creates a broadcast envelope.
    pub fn new(event: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            event: event.into(),
            args,
        }
    }

    /// Extracts a broadcast from a parsed payload.
    ///
    /// Only a string `event` field is required. A missing or `null` `args`
    /// yields no arguments, an array is spread as positional arguments, and
    /// any other value becomes the single argument. A `type` field is ignored.
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut object) = value else {
            return None;
        };

        let event = match object.remove("event") {
            Some(Value::String(event)) => event,
            _ => return None,
        };

        let args = match object.remove("args") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(args)) => args,
            Some(other) => vec![other],
        };

        Some(Self { event, args })
    }
}

/// Parses a frame payload, mapping malformed JSON to an empty object.
pub fn parse_payload(payload: &[u8]) -> Value {
    serde_json::from_slice(payload).unwrap_or_else(|_| Value::Object(Map::new()))
}
