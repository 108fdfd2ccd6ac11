//! Frame decoder for the chat event stream.
//!
//! The server writes Server-Sent-Events style frames separated by a blank
//! line, each carrying one JSON payload on a `data:` line:
//!
//! ```text
//! data: {"type":"chunk","content":"Hel"}
//!
//! data: {"type":"end"}
//!
//! ```
//!
//! Decoding works on the cumulative response text plus a watermark: the
//! byte offset up to which frames have already been turned into events.
//! Only boundary-terminated frames are consumed, so a frame split across
//! deliveries is picked up once its boundary arrives.

use fc_protocol::ProtocolEvent;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

const DATA_FIELD: &str = "data:";

/// Result of one decode pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedFrames {
    /// New events, in buffer order.
    pub events: Vec<ProtocolEvent>,
    /// Watermark to pass to the next call.
    pub consumed_length: usize,
}

/// Payload as written by the server.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireFrame {
    Chunk {
        #[serde(default)]
        content: Option<String>,
    },
    ToolCall,
    SessionId {
        #[serde(default)]
        session_id: Option<String>,
    },
    End,
    Error {
        #[serde(default)]
        error: Option<String>,
    },
}

impl From<WireFrame> for ProtocolEvent {
    fn from(frame: WireFrame) -> Self {
        match frame {
            WireFrame::Chunk { content } => ProtocolEvent::Chunk(content.unwrap_or_default()),
            WireFrame::ToolCall => ProtocolEvent::ToolCall,
            WireFrame::SessionId { session_id } => {
                ProtocolEvent::SessionId(session_id.unwrap_or_default())
            }
            WireFrame::End => ProtocolEvent::End,
            WireFrame::Error { error } => ProtocolEvent::Error(error.unwrap_or_default()),
        }
    }
}

/// Decode the complete frames in `buffer[consumed_length..]`.
///
/// Calling again with the same buffer and the returned `consumed_length`
/// yields no events. Frames that fail to parse are skipped; they never stop
/// later frames from decoding.
pub fn decode_frames(buffer: &str, consumed_length: usize) -> DecodedFrames {
    let mut decoded = DecodedFrames {
        events: Vec::new(),
        consumed_length,
    };

    let Some(mut rest) = buffer.get(consumed_length..) else {
        warn!(
            consumed_length,
            buffer_len = buffer.len(),
            "watermark outside buffer, nothing decoded"
        );
        return decoded;
    };

    while let Some((at, boundary_len)) = next_boundary(rest) {
        if let Some(event) = decode_frame(&rest[..at]) {
            decoded.events.push(event);
        }
        decoded.consumed_length += at + boundary_len;
        rest = &rest[at + boundary_len..];
    }

    if !decoded.events.is_empty() {
        debug!(
            events = decoded.events.len(),
            consumed_length = decoded.consumed_length,
            pending = rest.len(),
            "decoded frames"
        );
    }

    decoded
}

/// Wire form of an event, boundary included.
pub fn encode_frame(event: &ProtocolEvent) -> String {
    let payload = match event {
        ProtocolEvent::Chunk(content) => {
            serde_json::json!({ "type": "chunk", "content": content })
        }
        ProtocolEvent::ToolCall => serde_json::json!({ "type": "tool_call" }),
        ProtocolEvent::SessionId(id) => {
            serde_json::json!({ "type": "session_id", "session_id": id })
        }
        ProtocolEvent::End => serde_json::json!({ "type": "end" }),
        ProtocolEvent::Error(error) => serde_json::json!({ "type": "error", "error": error }),
    };
    format!("{DATA_FIELD} {payload}\n\n")
}

/// Find the earliest blank-line boundary. Returns its offset and length.
///
/// Walks line endings forward and stops at the first blank line.
fn next_boundary(text: &str) -> Option<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut from = 0;

    while let Some(offset) = text[from..].find('\n') {
        let at = from + offset;
        let after = &bytes[at + 1..];
        if after.starts_with(b"\n") {
            return Some((at, 2));
        }
        if after.starts_with(b"\r\n") && at > 0 && bytes[at - 1] == b'\r' {
            return Some((at - 1, 4));
        }
        from = at + 1;
    }
    None
}

fn decode_frame(frame: &str) -> Option<ProtocolEvent> {
    let Some(payload) = frame_payload(frame) else {
        if !frame.trim().is_empty() {
            debug!(frame, "discarding frame without data field");
        }
        return None;
    };

    let value: Value = match serde_json::from_str(&payload) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, payload = %payload, "skipping frame with malformed payload");
            return None;
        }
    };

    match serde_json::from_value::<WireFrame>(value) {
        Ok(frame) => Some(frame.into()),
        Err(e) => {
            warn!(error = %e, payload = %payload, "skipping unrecognized frame");
            None
        }
    }
}

/// Joined `data:` lines of a frame, or `None` if it has none.
fn frame_payload(frame: &str) -> Option<String> {
    let mut data_lines = Vec::new();

    for raw_line in frame.split('\n') {
        let line = raw_line.trim_end_matches('\r').trim_start();
        // Comment line
        if line.starts_with(':') {
            continue;
        }
        if let Some(value) = line.strip_prefix(DATA_FIELD) {
            data_lines.push(value.strip_prefix(' ').unwrap_or(value));
        }
    }

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}
