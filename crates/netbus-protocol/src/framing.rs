//! Delimiter-terminated message framing.
//!
//! Each frame is a compact JSON document followed by the delimiter:
//!
//! ```text
//! +------------------+-------------+
//! |  JSON payload    |  delimiter  |
//! +------------------+-------------+
//! ```
//!
//! Encoding is stateless. Decoding is not: a stream read may end in the middle
//! of a payload or of the delimiter itself, so [`FrameDecoder`] keeps the
//! unterminated tail until the next read completes it.

use serde::Serialize;
use tracing::{trace, warn};

use crate::MAX_FRAME_SIZE;
use crate::delimiter::Delimiter;
use crate::error::{ProtocolError, ProtocolResult};
use crate::types::{OutboundFrame, SubscriptionKind};

/// Encodes any serializable message followed by the delimiter.
///
/// # Example
///
/// ```rust
/// use netbus_protocol::{Delimiter, InboundBroadcast, encode_message};
///
/// let relay = InboundBroadcast::new("chat", vec![]);
/// let wire = encode_message(&relay, &Delimiter::default()).unwrap();
/// assert_eq!(wire, r#"{"event":"chat","args":[]}@@@"#);
/// ```
pub fn encode_message<T: Serialize>(message: &T, delimiter: &Delimiter) -> ProtocolResult<String> {
    let mut wire = serde_json::to_string(message)?;
    wire.push_str(delimiter.as_str());
    Ok(wire)
}

/// Encodes a single client frame.
pub fn encode_frame(frame: &OutboundFrame<'_>, delimiter: &Delimiter) -> ProtocolResult<String> {
    encode_message(frame, delimiter)
}

/// Encodes one subscription frame per event, concatenated in order.
///
/// Returns an empty string when `events` is empty.
pub fn encode_subscriptions<'a, I>(
    kind: SubscriptionKind,
    events: I,
    delimiter: &Delimiter,
) -> ProtocolResult<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut wire = String::new();
    for event in events {
        wire.push_str(&encode_frame(&kind.frame(event), delimiter)?);
    }
    Ok(wire)
}

/// Splits a byte stream into frame payloads.
///
/// The decoder owns the bytes received but not yet terminated by a delimiter.
/// After every [`decode`](Self::decode) call has been fully consumed, the
/// buffer holds at most one partial frame. A partial frame larger than the
/// configured maximum is a protocol error and is discarded.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    delimiter: Delimiter,
    buffer: Vec<u8>,
    /// Offset before which the buffer is known not to start a delimiter.
    scan_from: usize,
    max_frame_size: usize,
}

impl FrameDecoder {
    /// Creates a decoder with the default size limit.
    pub fn new(delimiter: Delimiter) -> Self {
        Self::with_max_frame_size(delimiter, MAX_FRAME_SIZE)
    }

    /// Creates a decoder that rejects partial frames above `max_frame_size` bytes.
    pub fn with_max_frame_size(delimiter: Delimiter, max_frame_size: usize) -> Self {
        Self {
            delimiter,
            buffer: Vec::new(),
            scan_from: 0,
            max_frame_size,
        }
    }

    /// Appends `chunk` and returns the frames it completes.
    ///
    /// The returned iterator is lazy. Frames not pulled from it stay buffered
    /// and are yielded by the next call.
    pub fn decode(&mut self, chunk: &[u8]) -> DecodedFrames<'_> {
        self.buffer.extend_from_slice(chunk);
        trace!(
            chunk = chunk.len(),
            buffered = self.buffer.len(),
            "decoder received bytes"
        );
        DecodedFrames {
            decoder: self,
            cursor: 0,
            finished: false,
        }
    }

    /// Number of bytes held for an unterminated frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Discards any partial frame.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.scan_from = 0;
    }

    /// Returns the delimiter this decoder splits on.
    pub fn delimiter(&self) -> &Delimiter {
        &self.delimiter
    }

    /// Returns the partial frame size limit.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Drops the bytes before `cursor` and remembers how far the rest was scanned.
    fn compact(&mut self, cursor: usize, scanned_to_end: bool) {
        self.buffer.drain(..cursor);
        self.scan_from = if scanned_to_end {
            self.buffer
                .len()
                .saturating_sub(self.delimiter.len().saturating_sub(1))
        } else {
            0
        };
    }
}

/// Frames completed by one [`FrameDecoder::decode`] call.
#[derive(Debug)]
pub struct DecodedFrames<'a> {
    decoder: &'a mut FrameDecoder,
    cursor: usize,
    finished: bool,
}

impl Iterator for DecodedFrames<'_> {
    type Item = ProtocolResult<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let delimiter = self.decoder.delimiter.as_bytes();
        let start = self.cursor.max(self.decoder.scan_from);

        if let Some(at) = find(&self.decoder.buffer[start..], delimiter) {
            let end = start + at;
            let frame = self.decoder.buffer[self.cursor..end].to_vec();
            self.cursor = end + delimiter.len();
            // Everything up to the new cursor has been scanned.
            self.decoder.scan_from = 0;
            return Some(Ok(frame));
        }

        self.finished = true;
        self.decoder.compact(self.cursor, true);
        self.cursor = 0;

        let residual = self.decoder.buffer.len();
        if residual > self.decoder.max_frame_size {
            warn!(
                size = residual,
                max = self.decoder.max_frame_size,
                "partial frame exceeds limit, discarding buffer"
            );
            self.decoder.reset();
            return Some(Err(ProtocolError::FrameTooLarge {
                size: residual,
                max: self.decoder.max_frame_size,
            }));
        }

        None
    }
}

impl Drop for DecodedFrames<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.decoder.compact(self.cursor, false);
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InboundBroadcast, parse_payload};
    use serde_json::{Value, json};

    fn collect(decoder: &mut FrameDecoder, chunk: &[u8]) -> Vec<String> {
        decoder
            .decode(chunk)
            .map(|frame| String::from_utf8(frame.unwrap()).unwrap())
            .collect()
    }

    #[test]
    fn encode_subscribe() {
        let wire = encode_frame(&OutboundFrame::Subscribe { event: "E" }, &Delimiter::default())
            .unwrap();
        assert_eq!(wire, r#"{"type":"subscribe","event":"E"}@@@"#);
    }

    #[test]
    fn encode_broadcast() {
        let args = vec![json!(1), json!("2"), json!(true), json!({"name": "luca"})];
        let wire = encode_frame(
            &OutboundFrame::Broadcast {
                event: "E",
                args: &args,
            },
            &Delimiter::default(),
        )
        .unwrap();
        assert_eq!(
            wire,
            r#"{"type":"broadcast","event":"E","args":[1,"2",true,{"name":"luca"}]}@@@"#
        );
    }

    #[test]
    fn encode_subscriptions_concatenates() {
        let wire =
            encode_subscriptions(SubscriptionKind::Subscribe, ["a", "b"], &Delimiter::default())
                .unwrap();
        assert_eq!(
            wire,
            r#"{"type":"subscribe","event":"a"}@@@{"type":"subscribe","event":"b"}@@@"#
        );
    }

    #[test]
    fn encode_subscriptions_empty() {
        let none: [&str; 0] = [];
        let wire =
            encode_subscriptions(SubscriptionKind::Unsubscribe, none, &Delimiter::default())
                .unwrap();
        assert!(wire.is_empty());
    }

    #[test]
    fn decode_single_frame() {
        let mut decoder = FrameDecoder::new(Delimiter::default());
        let frames = collect(&mut decoder, br#"{"event":"x"}@@@"#);
        assert_eq!(frames, vec![r#"{"event":"x"}"#]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn decode_several_frames_in_one_read() {
        let mut decoder = FrameDecoder::new(Delimiter::default());
        let frames = collect(&mut decoder, b"one@@@two@@@three@@@");
        assert_eq!(frames, vec!["one", "two", "three"]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn decode_keeps_partial_frame() {
        let mut decoder = FrameDecoder::new(Delimiter::default());
        assert_eq!(collect(&mut decoder, b"one@@@tw"), vec!["one"]);
        assert_eq!(decoder.buffered(), 2);
        assert_eq!(collect(&mut decoder, b"o@@@"), vec!["two"]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn decode_delimiter_split_across_reads() {
        let mut decoder = FrameDecoder::new(Delimiter::default());
        assert!(collect(&mut decoder, b"abc@").is_empty());
        assert!(collect(&mut decoder, b"@").is_empty());
        assert_eq!(collect(&mut decoder, b"@def"), vec!["abc"]);
        assert_eq!(decoder.buffered(), 3);
    }

    #[test]
    fn decode_empty_payload() {
        let mut decoder = FrameDecoder::new(Delimiter::default());
        assert_eq!(collect(&mut decoder, b"@@@@@@"), vec!["", ""]);
    }

    #[test]
    fn decode_overlapping_delimiter_prefix() {
        // "@@@@" holds the delimiter once followed by a lone '@'.
        let mut decoder = FrameDecoder::new(Delimiter::default());
        assert_eq!(collect(&mut decoder, b"a@@@@"), vec!["a"]);
        assert_eq!(decoder.buffered(), 1);
        assert_eq!(collect(&mut decoder, b"@@"), vec![""]);
    }

    #[test]
    fn decode_every_split_point() {
        let delimiter = Delimiter::new("<->").unwrap();
        let payloads = [
            r#"{"event":"a","args":[]}"#,
            r#"{"event":"b","args":[1,"2",true,{"name":"luca"}]}"#,
            r#"{"event":"ünïcödé","args":["😀"]}"#,
        ];
        let wire: String = payloads
            .iter()
            .map(|p| format!("{p}{delimiter}"))
            .collect();
        let bytes = wire.as_bytes();

        for chunk_size in 1..=bytes.len() {
            let mut decoder = FrameDecoder::new(delimiter.clone());
            let mut frames = Vec::new();
            for chunk in bytes.chunks(chunk_size) {
                frames.extend(decoder.decode(chunk).map(|f| f.unwrap()));
            }
            let frames: Vec<String> = frames
                .into_iter()
                .map(|f| String::from_utf8(f).unwrap())
                .collect();
            assert_eq!(frames, payloads, "chunk size {chunk_size}");
            assert_eq!(decoder.buffered(), 0, "chunk size {chunk_size}");
        }
    }

    #[test]
    fn dropped_iterator_keeps_unread_frames() {
        let mut decoder = FrameDecoder::new(Delimiter::default());
        {
            let mut frames = decoder.decode(b"one@@@two@@@thr");
            assert_eq!(frames.next().unwrap().unwrap(), b"one");
        }
        assert_eq!(collect(&mut decoder, b"ee@@@"), vec!["two", "three"]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn oversized_partial_frame_is_rejected() {
        let mut decoder = FrameDecoder::with_max_frame_size(Delimiter::default(), 8);
        let results: Vec<_> = decoder.decode(b"ok@@@0123456789").collect();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap(), b"ok");
        assert!(matches!(
            results[1],
            Err(ProtocolError::FrameTooLarge { size: 10, max: 8 })
        ));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn partial_frame_at_limit_is_kept() {
        let mut decoder = FrameDecoder::with_max_frame_size(Delimiter::default(), 8);
        assert_eq!(decoder.decode(b"01234567").count(), 0);
        assert_eq!(decoder.buffered(), 8);
    }

    #[test]
    fn reset_discards_partial_frame() {
        let mut decoder = FrameDecoder::new(Delimiter::default());
        assert!(collect(&mut decoder, b"{\"event\":").is_empty());
        decoder.reset();
        assert_eq!(decoder.buffered(), 0);
        assert_eq!(collect(&mut decoder, b"x@@@"), vec!["x"]);
    }

    #[test]
    fn decoded_payloads_parse_into_broadcasts() {
        let mut decoder = FrameDecoder::new(Delimiter::default());
        let wire = br#"{"event":"x","args":[1]}@@@{"invalid":"x"}@@@garbage@@@"#;
        let broadcasts: Vec<InboundBroadcast> = decoder
            .decode(wire)
            .filter_map(|frame| InboundBroadcast::from_value(parse_payload(&frame.unwrap())))
            .collect();
        assert_eq!(broadcasts, vec![InboundBroadcast::new("x", vec![Value::from(1)])]);
    }
}
