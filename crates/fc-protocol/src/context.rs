//! Request and conversation types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-exchange options forwarded to the chat server.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// URL of the tool service the server should route through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_url: Option<String>,
}

/// Body of the request that starts one streaming exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    /// Session id returned by an earlier exchange on the same thread.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(flatten)]
    pub options: ExchangeOptions,
    pub create_stream: bool,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            session_id: None,
            options: ExchangeOptions::default(),
            create_stream: true,
        }
    }

    pub fn with_session_id(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id.filter(|id| !id.is_empty());
        self
    }

    pub fn with_options(mut self, options: ExchangeOptions) -> Self {
        self.options = options;
        self
    }
}

/// Role in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A rendered message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub has_tool_call: bool,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            has_tool_call: false,
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            has_tool_call: false,
            timestamp: Utc::now(),
        }
    }

    /// Empty assistant turn that is filled in while a reply streams.
    pub fn placeholder() -> Self {
        Self::assistant(String::new())
    }

    /// Whether the turn has nothing worth rendering.
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_camel_case() {
        let request = ChatRequest::new("hello")
            .with_session_id(Some("abc".to_string()))
            .with_options(ExchangeOptions {
                model_type: Some("deepseek".to_string()),
                system_prompt: Some("be brief".to_string()),
                mcp_url: Some("http://tools.local/sse".to_string()),
            });

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["message"], "hello");
        assert_eq!(json["sessionId"], "abc");
        assert_eq!(json["modelType"], "deepseek");
        assert_eq!(json["systemPrompt"], "be brief");
        assert_eq!(json["mcpUrl"], "http://tools.local/sse");
        assert_eq!(json["createStream"], true);
    }

    #[test]
    fn request_omits_absent_fields() {
        let json = serde_json::to_value(ChatRequest::new("hi")).unwrap();
        assert!(json.get("sessionId").is_none());
        assert!(json.get("modelType").is_none());
        assert!(json.get("mcpUrl").is_none());
    }

    #[test]
    fn empty_session_id_is_dropped() {
        let request = ChatRequest::new("hi").with_session_id(Some(String::new()));
        assert_eq!(request.session_id, None);
    }

    #[test]
    fn placeholder_is_blank_assistant_turn() {
        let turn = ConversationTurn::placeholder();
        assert_eq!(turn.role, Role::Assistant);
        assert!(turn.is_blank());
        assert!(!turn.has_tool_call);
    }

    #[test]
    fn whitespace_turn_is_blank() {
        assert!(ConversationTurn::assistant("  \n\t").is_blank());
        assert!(!ConversationTurn::assistant(" hi ").is_blank());
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_value(Role::Assistant).unwrap();
        assert_eq!(json, serde_json::json!("assistant"));
    }
}
