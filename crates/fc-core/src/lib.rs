//! fc-core: Conversation model and terminal front end for feedchat.
//!
//! This crate holds configuration, logging setup, redraw coalescing, the
//! conversation state machine, and the REPL. Exposed as a library for
//! integration testing.

pub mod config;
pub mod conversation;
pub mod logging;
pub mod redraw;
pub mod render;
pub mod repl;
