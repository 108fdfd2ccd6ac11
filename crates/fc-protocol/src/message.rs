//! Events decoded from the chat stream and the updates handed to sinks.

/// One decoded frame of the chat stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// An incremental slice of assistant output.
    Chunk(String),

    /// The assistant invoked an external tool.
    ToolCall,

    /// Server-assigned identifier for this conversation thread.
    SessionId(String),

    /// Terminal marker. No further events follow.
    End,

    /// A server-reported failure. May appear mid-stream.
    Error(String),
}

impl ProtocolEvent {
    /// Whether this event ends the exchange.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProtocolEvent::End)
    }
}

/// What a sink receives for every renderable change of the in-flight reply.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReplyUpdate {
    /// New text to append. Empty for pure state changes.
    pub text: String,
    /// Set exactly once, on the update produced by the `End` frame.
    pub is_complete: bool,
    /// Whether a tool call has been seen so far in this exchange.
    pub has_tool_call: bool,
}

impl ReplyUpdate {
    pub fn text(text: impl Into<String>, has_tool_call: bool) -> Self {
        Self {
            text: text.into(),
            is_complete: false,
            has_tool_call,
        }
    }

    pub fn tool_call() -> Self {
        Self {
            text: String::new(),
            is_complete: false,
            has_tool_call: true,
        }
    }

    pub fn complete(has_tool_call: bool) -> Self {
        Self {
            text: String::new(),
            is_complete: true,
            has_tool_call,
        }
    }
}
