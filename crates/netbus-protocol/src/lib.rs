//! Delimited JSON framing for the netbus wire protocol.
//!
//! Clients and the relay server exchange JSON envelopes over a plain byte
//! stream. Every envelope is terminated by a configurable delimiter
//! (`@@@` unless both sides agree on something else):
//!
//! ```text
//! {"type":"subscribe","event":"chat"}@@@
//! {"type":"unsubscribe","event":"chat"}@@@
//! {"type":"broadcast","event":"chat","args":["hi"]}@@@
//! ```
//!
//! Broadcasts relayed by the server drop the `type` field:
//!
//! ```text
//! {"event":"chat","args":["hi"]}@@@
//! ```
//!
//! Stream transports do not preserve write boundaries, so decoding goes
//! through a [`FrameDecoder`] that keeps the trailing partial frame between
//! reads.
//!
//! # Example
//!
//! ```rust
//! use netbus_protocol::{Delimiter, FrameDecoder, OutboundFrame, encode_frame};
//!
//! let delimiter = Delimiter::default();
//! let wire = encode_frame(&OutboundFrame::Subscribe { event: "chat" }, &delimiter).unwrap();
//! assert_eq!(wire, r#"{"type":"subscribe","event":"chat"}@@@"#);
//!
//! let mut decoder = FrameDecoder::new(delimiter);
//! let (head, tail) = wire.as_bytes().split_at(10);
//! assert_eq!(decoder.decode(head).count(), 0);
//! let frames: Vec<_> = decoder.decode(tail).collect::<Result<_, _>>().unwrap();
//! assert_eq!(frames.len(), 1);
//! ```

mod delimiter;
mod error;
mod framing;
mod types;

pub use delimiter::Delimiter;
pub use error::{ProtocolError, ProtocolResult};
pub use framing::{
    DecodedFrames, FrameDecoder, encode_frame, encode_message, encode_subscriptions,
};
pub use types::{ClientFrame, FrameKind, InboundBroadcast, OutboundFrame, SubscriptionKind, parse_payload};

/// Delimiter used when none is configured.
pub const DEFAULT_DELIMITER: &str = "@@@";

/// Maximum number of bytes a partial frame may occupy in a decoder (1 MB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;
