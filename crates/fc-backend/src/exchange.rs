//! Stream session controller.
//!
//! A `StreamSession` owns one request/stream exchange at a time. It feeds
//! every delivery from the transport into a `RawBuffer`, re-decodes the
//! undecoded suffix with the frame decoder, and turns each new event into
//! exactly one sink call, in order. An exchange resolves once: on the `End`
//! frame, when the transport finishes, or when the transport fails. No sink
//! call happens after that.

use std::time::Duration;

use fc_protocol::{ChatRequest, ProtocolEvent, ReplyUpdate};
use futures::future::{AbortHandle, AbortRegistration, Abortable};
use futures::StreamExt;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::buffer::RawBuffer;
use crate::frame::decode_frames;
use crate::transport::{ByteStream, Transport, TransportError};

const ERROR_PREFIX: &str = "error: ";

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("{0}")]
    Transport(#[from] TransportError),
    #[error("exchange cancelled")]
    Cancelled,
    #[error("no complete reply within {0:?}")]
    TimedOut(Duration),
}

/// How a resolved exchange ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Success,
    Failure,
}

/// Lifecycle of the exchange a session is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangePhase {
    Idle,
    /// Request issued, nothing received yet.
    Sending,
    /// At least one delivery received.
    Streaming,
    Resolved(Resolution),
}

/// Successful resolution of an exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeOutcome {
    /// Latest session id seen, or the one the request carried. May be empty.
    pub session_id: String,
    pub assembled_text: String,
    pub saw_tool_call: bool,
    /// Whether the server sent an explicit `End` frame.
    pub ended: bool,
}

/// Per-exchange decoding and reply state.
#[derive(Debug, Clone, Default)]
pub struct ExchangeState {
    consumed_length: usize,
    session_id: String,
    saw_tool_call: bool,
    assembled_text: String,
    terminal: bool,
}

impl ExchangeState {
    pub fn new(prior_session_id: Option<&str>) -> Self {
        Self {
            session_id: prior_session_id.unwrap_or_default().to_string(),
            ..Self::default()
        }
    }

    pub fn consumed_length(&self) -> usize {
        self.consumed_length
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn saw_tool_call(&self) -> bool {
        self.saw_tool_call
    }

    pub fn assembled_text(&self) -> &str {
        &self.assembled_text
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Decode whatever new frames `buffer` holds past the watermark.
    pub fn decode(&mut self, buffer: &RawBuffer) -> Vec<ProtocolEvent> {
        let decoded = decode_frames(buffer.as_str(), self.consumed_length);
        self.consumed_length = decoded.consumed_length;
        decoded.events
    }

    /// Apply one event and return the sink update it produces, if any.
    pub fn apply(&mut self, event: ProtocolEvent) -> Option<ReplyUpdate> {
        if event.is_terminal() {
            self.terminal = true;
        }
        match event {
            ProtocolEvent::Chunk(text) => {
                self.assembled_text.push_str(&text);
                Some(ReplyUpdate::text(text, self.saw_tool_call))
            }
            ProtocolEvent::ToolCall => {
                self.saw_tool_call = true;
                Some(ReplyUpdate::tool_call())
            }
            ProtocolEvent::SessionId(id) => {
                debug!(session_id = %id, "session id assigned");
                self.session_id = id;
                None
            }
            ProtocolEvent::End => Some(ReplyUpdate::complete(self.saw_tool_call)),
            ProtocolEvent::Error(message) => {
                warn!(error = %message, "server reported an error mid-stream");
                Some(ReplyUpdate::text(
                    format!("{ERROR_PREFIX}{message}"),
                    self.saw_tool_call,
                ))
            }
        }
    }

    /// Final outcome. A reply made only of whitespace assembles to nothing.
    pub fn into_outcome(mut self) -> ExchangeOutcome {
        if self.assembled_text.trim().is_empty() {
            self.assembled_text.clear();
        }
        ExchangeOutcome {
            session_id: self.session_id,
            assembled_text: self.assembled_text,
            saw_tool_call: self.saw_tool_call,
            ended: self.terminal,
        }
    }
}

/// Cancels the next (or currently running) exchange of a session.
#[derive(Debug, Clone)]
pub struct ExchangeCanceller(AbortHandle);

impl ExchangeCanceller {
    pub fn cancel(&self) {
        self.0.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_aborted()
    }
}

/// Runs streaming exchanges over a transport, one at a time.
///
/// Callers holding several conversations use one session per conversation.
pub struct StreamSession<T> {
    transport: T,
    phase: ExchangePhase,
    abort: Option<(AbortHandle, AbortRegistration)>,
    timeout: Option<Duration>,
}

impl<T: Transport> StreamSession<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            phase: ExchangePhase::Idle,
            abort: None,
            timeout: None,
        }
    }

    /// Fail any exchange that has not resolved within `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn phase(&self) -> ExchangePhase {
        self.phase
    }

    /// Handle that cancels the next exchange run on this session.
    ///
    /// Calling this again before running replaces the previous handle, which
    /// then has no effect.
    pub fn canceller(&mut self) -> ExchangeCanceller {
        let (handle, registration) = AbortHandle::new_pair();
        self.abort = Some((handle.clone(), registration));
        ExchangeCanceller(handle)
    }

    /// Run one exchange, calling `on_event` for every renderable update.
    ///
    /// Resolves with the session id on `End` or on a clean close, and with
    /// an error on transport failure, cancellation, or timeout.
    pub async fn run_streaming_exchange<F>(
        &mut self,
        request: &ChatRequest,
        mut on_event: F,
    ) -> Result<ExchangeOutcome, ExchangeError>
    where
        F: FnMut(ReplyUpdate),
    {
        let (handle, registration) = match self.abort.take() {
            Some(pair) => pair,
            None => AbortHandle::new_pair(),
        };

        let timeout = self.timeout;
        self.phase = ExchangePhase::Sending;
        let body = self.transport.open(request);
        let exchange = Abortable::new(
            drive(body, request, &mut self.phase, &handle, &mut on_event),
            registration,
        );

        let finished = match timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .unwrap_or(Ok(Err(ExchangeError::TimedOut(limit)))),
            None => exchange.await,
        };
        let result = match finished {
            Ok(result) => result,
            Err(_aborted) => Err(ExchangeError::Cancelled),
        };

        self.phase = ExchangePhase::Resolved(match result {
            Ok(_) => Resolution::Success,
            Err(_) => Resolution::Failure,
        });

        match &result {
            Ok(outcome) => info!(
                session_id = %outcome.session_id,
                reply_len = outcome.assembled_text.len(),
                ended = outcome.ended,
                "exchange resolved"
            ),
            Err(e) => warn!(error = %e, "exchange failed"),
        }

        result
    }
}

async fn drive<F>(
    mut body: ByteStream,
    request: &ChatRequest,
    phase: &mut ExchangePhase,
    abort: &AbortHandle,
    on_event: &mut F,
) -> Result<ExchangeOutcome, ExchangeError>
where
    F: FnMut(ReplyUpdate),
{
    let mut buffer = RawBuffer::new();
    let mut state = ExchangeState::new(request.session_id.as_deref());

    while let Some(delivery) = body.next().await {
        let bytes = delivery?;
        if bytes.is_empty() {
            continue;
        }

        *phase = ExchangePhase::Streaming;
        buffer.append(&bytes);

        for event in state.decode(&buffer) {
            // The sink itself may cancel.
            if abort.is_aborted() {
                return Err(ExchangeError::Cancelled);
            }
            if let Some(update) = state.apply(event) {
                on_event(update);
            }
            if state.is_terminal() {
                return Ok(state.into_outcome());
            }
        }
    }

    if abort.is_aborted() {
        return Err(ExchangeError::Cancelled);
    }

    warn!(
        session_id = %state.session_id(),
        buffered = buffer.len() - state.consumed_length(),
        "stream closed without an end frame"
    );
    Ok(state.into_outcome())
}
