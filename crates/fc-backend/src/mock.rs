//! Mock transport for testing.
//!
//! Writes the same wire frames the chat server does, so every layer above
//! the transport can be exercised without HTTP. Deliveries can be chopped
//! into small byte slices to mimic a network splitting frames apart.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_stream::stream;
use bytes::Bytes;
use fc_protocol::{ChatRequest, ProtocolEvent};
use tokio::time::sleep;

use crate::frame::encode_frame;
use crate::transport::{ByteStream, Transport, TransportError};

/// One scripted step of a mock response body.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Deliver the wire form of an event.
    Event(ProtocolEvent),
    /// Deliver arbitrary body text as-is.
    Raw(String),
    /// Fail the transport with a connection error. Nothing after it is sent.
    Fail { message: String },
    /// Delay before the next step (for timing tests).
    Delay { ms: u64 },
}

/// Configuration for a mock response body.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Steps to play, in order.
    pub responses: Vec<MockResponse>,
    /// Optional delay before each delivery (ms).
    pub chunk_delay_ms: Option<u64>,
    /// Split each delivery into slices of at most this many bytes.
    pub split_bytes: Option<usize>,
}

impl MockConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(mut self, responses: Vec<MockResponse>) -> Self {
        self.responses = responses;
        self
    }

    pub fn with_chunk_delay(mut self, ms: u64) -> Self {
        self.chunk_delay_ms = Some(ms);
        self
    }

    pub fn with_split(mut self, bytes: usize) -> Self {
        self.split_bytes = Some(bytes.max(1));
        self
    }
}

/// Play a mock config as a response body.
pub fn mock_stream(config: MockConfig) -> ByteStream {
    Box::pin(stream! {
        for response in config.responses {
            let text = match response {
                MockResponse::Event(event) => encode_frame(&event),
                MockResponse::Raw(text) => text,
                MockResponse::Fail { message } => {
                    yield Err(TransportError::Connection(message));
                    return;
                }
                MockResponse::Delay { ms } => {
                    sleep(Duration::from_millis(ms)).await;
                    continue;
                }
            };

            let bytes = Bytes::from(text);
            let slice_len = config.split_bytes.unwrap_or(bytes.len()).max(1);
            let mut offset = 0;
            while offset < bytes.len() {
                if let Some(delay_ms) = config.chunk_delay_ms {
                    sleep(Duration::from_millis(delay_ms)).await;
                }
                let end = (offset + slice_len).min(bytes.len());
                yield Ok(bytes.slice(offset..end));
                offset = end;
            }
        }
    })
}

/// Transport that plays the same mock body for every exchange and records
/// the requests it was given.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    config: MockConfig,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl MockTransport {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            requests: Arc::default(),
        }
    }

    /// Requests opened so far, oldest first.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

impl Transport for MockTransport {
    fn open(&self, request: &ChatRequest) -> ByteStream {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        mock_stream(self.config.clone())
    }
}

/// Built-in scripts for common scenarios.
pub mod fixtures {
    use super::*;

    fn chunks(texts: &[&str]) -> Vec<MockResponse> {
        texts
            .iter()
            .map(|text| MockResponse::Event(ProtocolEvent::Chunk((*text).to_string())))
            .collect()
    }

    /// Text chunks followed by `End`.
    pub fn streaming_reply(texts: &[&str]) -> MockConfig {
        let mut responses = chunks(texts);
        responses.push(MockResponse::Event(ProtocolEvent::End));
        MockConfig::new().with_responses(responses)
    }

    /// Session id, text chunks, then `End`.
    pub fn reply_with_session(session_id: &str, texts: &[&str]) -> MockConfig {
        let mut responses = vec![MockResponse::Event(ProtocolEvent::SessionId(
            session_id.to_string(),
        ))];
        responses.extend(chunks(texts));
        responses.push(MockResponse::Event(ProtocolEvent::End));
        MockConfig::new().with_responses(responses)
    }

    /// Tool call marker, text chunks, then `End`.
    pub fn tool_call_reply(texts: &[&str]) -> MockConfig {
        let mut responses = vec![MockResponse::Event(ProtocolEvent::ToolCall)];
        responses.extend(chunks(texts));
        responses.push(MockResponse::Event(ProtocolEvent::End));
        MockConfig::new().with_responses(responses)
    }

    /// A chunk, a server-reported error, then `End`.
    pub fn error_mid_stream(text_before: &str, error: &str) -> MockConfig {
        MockConfig::new().with_responses(vec![
            MockResponse::Event(ProtocolEvent::Chunk(text_before.to_string())),
            MockResponse::Event(ProtocolEvent::Error(error.to_string())),
            MockResponse::Event(ProtocolEvent::End),
        ])
    }

    /// Text chunks, then the connection drops.
    pub fn dropped_connection(texts: &[&str], message: &str) -> MockConfig {
        let mut responses = chunks(texts);
        responses.push(MockResponse::Fail {
            message: message.to_string(),
        });
        MockConfig::new().with_responses(responses)
    }

    /// The request never gets a response.
    pub fn connection_refused() -> MockConfig {
        MockConfig::new().with_responses(vec![MockResponse::Fail {
            message: "connection refused".to_string(),
        }])
    }

    /// Text chunks and a clean close, with no `End` frame.
    pub fn closed_without_end(texts: &[&str]) -> MockConfig {
        MockConfig::new().with_responses(chunks(texts))
    }
}
