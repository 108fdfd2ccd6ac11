//! fc-protocol: Shared types for the feedchat streaming client.
//!
//! This crate defines the events decoded from the chat stream, the request
//! sent to start an exchange, and the conversation turns a front end renders.

pub mod context;
pub mod message;

pub use context::{ChatRequest, ConversationTurn, ExchangeOptions, Role};
pub use message::{ProtocolEvent, ReplyUpdate};
