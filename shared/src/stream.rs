//! Server-sent event decoding for store subscriptions
//!
//! The store pushes changes as a text event stream:
//! ```text
//! event: put
//! data: {"path":"/","data":true}
//!
//! ```
//! Events are separated by a blank line. Bytes arrive in arbitrary chunks,
//! so [`EventDecoder`] buffers until a complete event is available.

use bytes::{Buf, BytesMut};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Maximum buffered event size (1 MB) to prevent memory exhaustion
pub const MAX_EVENT_SIZE: usize = 1024 * 1024;

/// Errors that can occur while decoding the event stream
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Event too large: {0} bytes buffered (max: {MAX_EVENT_SIZE})")]
    EventTooLarge(usize),

    #[error("Event is not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("Event payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Kind of a stream event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Value at `path` replaced
    Put,
    /// Children at `path` merged
    Patch,
    /// Connection liveness ping
    KeepAlive,
    /// Server cancelled the subscription (e.g. permission change)
    Cancel,
    /// Credential expired
    AuthRevoked,
    Other(String),
}

impl EventKind {
    fn from_name(name: &str) -> Self {
        match name {
            "put" => EventKind::Put,
            "patch" => EventKind::Patch,
            "keep-alive" => EventKind::KeepAlive,
            "cancel" => EventKind::Cancel,
            "auth_revoked" => EventKind::AuthRevoked,
            other => EventKind::Other(other.to_string()),
        }
    }

    /// Whether the server will close the stream after this event
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventKind::Cancel | EventKind::AuthRevoked)
    }
}

/// Payload of a `put` or `patch` event
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChangePayload {
    /// Path relative to the subscribed location, `/` for the location itself
    pub path: String,
    pub data: Value,
}

impl ChangePayload {
    /// Whether the change replaces the subscribed location itself
    pub fn is_root(&self) -> bool {
        self.path.trim_matches('/').is_empty()
    }
}

/// A decoded stream event
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub kind: EventKind,
    /// Parsed payload for `put` and `patch`
    pub change: Option<ChangePayload>,
    /// Raw data field
    pub raw: String,
}

/// Try to decode one complete event from the buffer
///
/// Returns:
/// - `Ok(Some(event))` if a complete event was decoded
/// - `Ok(None)` if more data is needed
/// - `Err(...)` if the data is invalid (the offending event is consumed)
pub fn decode(buf: &mut BytesMut) -> Result<Option<StreamEvent>, StreamError> {
    let end = match buf.windows(2).position(|w| w == b"\n\n") {
        Some(pos) => pos,
        None => {
            if buf.len() > MAX_EVENT_SIZE {
                return Err(StreamError::EventTooLarge(buf.len()));
            }
            return Ok(None);
        }
    };

    let block = buf.split_to(end);
    buf.advance(2);

    let text = std::str::from_utf8(&block)?;
    let mut name = String::new();
    let mut data_lines: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "event" => name = value.to_string(),
            "data" => data_lines.push(value),
            _ => {}
        }
    }

    let raw = data_lines.join("\n");
    let kind = EventKind::from_name(if name.is_empty() { "message" } else { &name });

    let change = match kind {
        EventKind::Put | EventKind::Patch => Some(serde_json::from_str::<ChangePayload>(&raw)?),
        _ => None,
    };

    Ok(Some(StreamEvent { kind, change, raw }))
}

/// Decoder state for streaming decoding
#[derive(Debug, Default)]
pub struct EventDecoder {
    /// Partial event data being accumulated
    buffer: BytesMut,
}

impl EventDecoder {
    /// Create a new event decoder
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Add data to the decoder buffer, normalising CRLF line endings
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.reserve(data.len());
        self.buffer
            .extend(data.iter().copied().filter(|&b| b != b'\r'));
    }

    /// Try to decode the next event from the buffer
    ///
    /// Call this repeatedly until it returns `Ok(None)` to drain all complete events
    pub fn decode_next(&mut self) -> Result<Option<StreamEvent>, StreamError> {
        let result = decode(&mut self.buffer);
        if matches!(result, Err(StreamError::EventTooLarge(_))) {
            self.buffer.clear();
        }
        result
    }

    /// Get the current buffer length (for debugging)
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_put_event() {
        let mut decoder = EventDecoder::new();
        decoder.extend(b"event: put\ndata: {\"path\":\"/\",\"data\":true}\n\n");

        let event = decoder.decode_next().expect("decode error").expect("event");
        assert_eq!(event.kind, EventKind::Put);
        let change = event.change.expect("change payload");
        assert!(change.is_root());
        assert_eq!(change.data, json!(true));
        assert_eq!(decoder.buffer_len(), 0);
    }

    #[test]
    fn test_partial_event_waits_for_more_data() {
        let mut decoder = EventDecoder::new();
        decoder.extend(b"event: patch\ndata: {\"path\":\"/a\",");
        assert!(decoder.decode_next().expect("decode error").is_none());

        decoder.extend(b"\"data\":{\"x\":1}}\n\n");
        let event = decoder.decode_next().expect("decode error").expect("event");
        assert_eq!(event.kind, EventKind::Patch);
        let change = event.change.expect("change payload");
        assert_eq!(change.path, "/a");
        assert!(!change.is_root());
    }

    #[test]
    fn test_crlf_and_keep_alive() {
        let mut decoder = EventDecoder::new();
        decoder.extend(b"event: keep-alive\r\ndata: null\r\n\r\n");

        let event = decoder.decode_next().expect("decode error").expect("event");
        assert_eq!(event.kind, EventKind::KeepAlive);
        assert!(event.change.is_none());
        assert_eq!(event.raw, "null");
    }

    #[test]
    fn test_multiple_events_in_one_chunk() {
        let mut decoder = EventDecoder::new();
        decoder.extend(
            b"event: put\ndata: {\"path\":\"/\",\"data\":false}\n\n: comment\nevent: cancel\ndata: null\n\n",
        );

        assert_eq!(
            decoder.decode_next().expect("decode error").map(|e| e.kind),
            Some(EventKind::Put)
        );
        let cancel = decoder.decode_next().expect("decode error").expect("event");
        assert!(cancel.kind.is_terminal());
        assert!(decoder.decode_next().expect("decode error").is_none());
    }

    #[test]
    fn test_bad_json_is_reported_and_consumed() {
        let mut decoder = EventDecoder::new();
        decoder.extend(b"event: put\ndata: {not json\n\nevent: keep-alive\ndata: null\n\n");

        assert!(matches!(decoder.decode_next(), Err(StreamError::InvalidJson(_))));
        assert_eq!(
            decoder.decode_next().expect("decode error").map(|e| e.kind),
            Some(EventKind::KeepAlive)
        );
    }

    #[test]
    fn test_oversized_event_is_dropped() {
        let mut decoder = EventDecoder::new();
        decoder.extend(&vec![b'a'; MAX_EVENT_SIZE + 1]);
        assert!(matches!(decoder.decode_next(), Err(StreamError::EventTooLarge(_))));
        assert_eq!(decoder.buffer_len(), 0);
    }
}
