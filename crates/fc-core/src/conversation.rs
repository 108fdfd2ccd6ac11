//! Conversation state driven by streaming exchanges.
//!
//! A `Conversation` keeps the rendered turns, the loading/error indicators,
//! and one session id per tool service. Each `send_message` runs exactly one
//! exchange through its `StreamSession`, filling a placeholder assistant turn
//! as reply updates arrive.

use std::collections::HashMap;
use std::time::Duration;

use fc_backend::{
    ExchangeCanceller, ExchangeError, ExchangeOutcome, ExchangePhase, StreamSession, Transport,
};
use fc_protocol::{ChatRequest, ConversationTurn, ExchangeOptions, ReplyUpdate};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::config::Config;
use crate::redraw::RedrawHandle;

pub const WELCOME_NOTICE: &str = "Welcome! Ask anything about your feeds.";
pub const CLEARED_NOTICE: &str = "Conversation cleared.";
pub const RESET_NOTICE: &str = "Session reset.";

/// Conversation behaviour taken from the configuration.
#[derive(Debug, Clone, Default)]
pub struct ConversationSettings {
    /// Options sent with every exchange. The tool service URL is filled in
    /// from the selected service.
    pub options: ExchangeOptions,
    /// Chunk text containing any of these flags the reply as using a tool.
    pub tool_markers: Vec<String>,
    /// Limit on one whole exchange.
    pub exchange_timeout: Option<Duration>,
}

impl From<&Config> for ConversationSettings {
    fn from(config: &Config) -> Self {
        Self {
            options: config.chat.exchange_options(None),
            tool_markers: config.ui.tool_markers.clone(),
            exchange_timeout: config.chat.exchange_timeout(),
        }
    }
}

/// Session ids by tool service. The default service uses the empty key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRegistry {
    ids: HashMap<String, String>,
}

impl SessionRegistry {
    pub fn get(&self, service: &str) -> Option<&str> {
        self.ids.get(service).map(String::as_str)
    }

    pub fn set(&mut self, service: &str, session_id: String) {
        self.ids.insert(service.to_string(), session_id);
    }

    pub fn forget(&mut self, service: &str) {
        self.ids.remove(service);
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Snapshot of the reply currently streaming, for renderers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveReply {
    /// Increments with every exchange.
    pub exchange: u64,
    pub text: String,
    pub has_tool_call: bool,
    pub streaming: bool,
}

/// What a call to `send_message` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendStatus {
    /// Blank input, or a reply is still streaming.
    Skipped,
    Replied(ExchangeOutcome),
    /// The exchange failed; see `Conversation::error`.
    Failed,
}

pub struct Conversation<T> {
    session: StreamSession<T>,
    settings: ConversationSettings,
    turns: Vec<ConversationTurn>,
    is_loading: bool,
    error: Option<String>,
    sessions: SessionRegistry,
    selected_service: String,
    redraw: Option<RedrawHandle>,
    live: watch::Sender<LiveReply>,
}

impl<T: Transport> Conversation<T> {
    pub fn new(transport: T, settings: ConversationSettings) -> Self {
        let (live, _) = watch::channel(LiveReply::default());
        Self {
            session: StreamSession::new(transport).with_timeout(settings.exchange_timeout),
            settings,
            turns: vec![ConversationTurn::assistant(WELCOME_NOTICE)],
            is_loading: false,
            error: None,
            sessions: SessionRegistry::default(),
            selected_service: String::new(),
            redraw: None,
            live,
        }
    }

    /// Request redraws through `redraw` while replies stream.
    pub fn with_redraw(mut self, redraw: RedrawHandle) -> Self {
        self.redraw = Some(redraw);
        self
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Selected tool service, or None for the server default.
    pub fn selected_service(&self) -> Option<&str> {
        (!self.selected_service.is_empty()).then_some(self.selected_service.as_str())
    }

    /// Session id for the selected service, if one was assigned.
    pub fn current_session_id(&self) -> Option<&str> {
        self.sessions.get(&self.selected_service)
    }

    /// Receiver for the in-flight reply. Every exchange resets it.
    pub fn live_reply(&self) -> watch::Receiver<LiveReply> {
        self.live.subscribe()
    }

    /// Handle that cancels the next `send_message` exchange.
    pub fn canceller(&mut self) -> ExchangeCanceller {
        self.session.canceller()
    }

    /// Phase of the most recent exchange.
    pub fn exchange_phase(&self) -> ExchangePhase {
        self.session.phase()
    }

    pub fn add_message(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    pub fn clear_messages(&mut self) {
        self.turns = vec![ConversationTurn::assistant(CLEARED_NOTICE)];
    }

    /// Forget the session of the selected service, or of every service when
    /// the default one is selected.
    pub fn reset_session(&mut self) {
        if self.selected_service.is_empty() {
            self.sessions.clear();
        } else {
            self.sessions.forget(&self.selected_service);
        }
        self.turns = vec![ConversationTurn::assistant(RESET_NOTICE)];
        self.error = None;
    }

    /// Route later messages through `service`. Its session id is kept.
    pub fn switch_service(&mut self, service: Option<&str>) {
        self.selected_service = service.map(str::trim).unwrap_or_default().to_string();
        let name = self.selected_service().unwrap_or("default");
        self.turns = vec![ConversationTurn::assistant(format!(
            "Switched to {name} service."
        ))];
    }

    /// Send one user message and stream the reply into the conversation.
    pub async fn send_message(&mut self, input: &str) -> SendStatus {
        if input.trim().is_empty() || self.is_loading {
            return SendStatus::Skipped;
        }

        self.error = None;
        self.turns.push(ConversationTurn::user(input));
        self.is_loading = true;

        let options = ExchangeOptions {
            mcp_url: self.selected_service().map(str::to_string),
            ..self.settings.options.clone()
        };
        let request = ChatRequest::new(input)
            .with_session_id(self.current_session_id().map(str::to_string))
            .with_options(options);

        self.turns.push(ConversationTurn::placeholder());
        let placeholder = self.turns.len() - 1;
        self.live.send_modify(|live| {
            live.exchange += 1;
            live.text.clear();
            live.has_tool_call = false;
            live.streaming = true;
        });

        let result = {
            let reply = &mut self.turns[placeholder];
            let live = &self.live;
            let redraw = self.redraw.as_ref();
            let markers = &self.settings.tool_markers;

            self.session
                .run_streaming_exchange(&request, |update| {
                    apply_update(reply, &update, markers);
                    live.send_modify(|live| {
                        live.text.push_str(&update.text);
                        live.has_tool_call = reply.has_tool_call;
                    });
                    if !update.text.trim().is_empty() {
                        if let Some(redraw) = redraw {
                            redraw.request();
                        }
                    }
                    if update.is_complete {
                        debug!(reply_len = reply.content.len(), "reply complete");
                    }
                })
                .await
        };

        self.finish_reply(placeholder).await;

        match result {
            Ok(outcome) => {
                if !outcome.session_id.is_empty() {
                    self.sessions
                        .set(&self.selected_service, outcome.session_id.clone());
                }
                SendStatus::Replied(outcome)
            }
            Err(e) => {
                warn!(error = %e, "message not delivered");
                self.error = Some(describe_failure(&e));
                SendStatus::Failed
            }
        }
    }

    /// Drop an empty placeholder and clear the loading state.
    async fn finish_reply(&mut self, placeholder: usize) {
        if self.turns.get(placeholder).is_some_and(ConversationTurn::is_blank) {
            self.turns.remove(placeholder);
        }
        self.is_loading = false;
        self.live.send_modify(|live| live.streaming = false);

        if let Some(redraw) = &self.redraw {
            redraw.flush().await;
        }
    }
}

fn apply_update(turn: &mut ConversationTurn, update: &ReplyUpdate, tool_markers: &[String]) {
    if update.has_tool_call
        || tool_markers
            .iter()
            .any(|marker| update.text.contains(marker.as_str()))
    {
        turn.has_tool_call = true;
    }
    turn.content.push_str(&update.text);
}

fn describe_failure(error: &ExchangeError) -> String {
    match error {
        ExchangeError::Cancelled => "Request cancelled.".to_string(),
        other => format!("Failed to send message: {other}"),
    }
}
