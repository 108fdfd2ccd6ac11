//! One-shot and interactive front ends over a `Conversation`.
//!
//! Reply text reaches the terminal through the redraw path (see
//! `render::ReplyPrinter`); this module prints everything else: notices,
//! errors, prompts.

use std::io::{self, Write};

use fc_backend::Transport;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::conversation::{Conversation, SendStatus};

const PROMPT: &str = "> ";

pub const HELP_TEXT: &str = "\
Commands:
  /reset           Start a new session for the current service
  /clear           Clear the conversation
  /service [url]   Use a tool service (no url: server default)
  /help            Show this help
  /quit            Exit

Ctrl-C cancels a reply while it streams; at the prompt it exits.";

/// A line of interactive input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    Reset,
    Clear,
    Service(Option<String>),
    Help,
    Quit,
    Unknown(String),
    Empty,
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Send(line.to_string());
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    match name {
        "reset" => Command::Reset,
        "clear" => Command::Clear,
        "service" => Command::Service((!arg.is_empty()).then(|| arg.to_string())),
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        _ => Command::Unknown(name.to_string()),
    }
}

/// Deliver every Ctrl-C to the returned receiver.
///
/// The listener lives as long as the receiver, so interrupts keep arriving
/// between exchanges.
pub fn spawn_interrupt_listener() -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(()).is_err() {
                break;
            }
        }
    });
    rx
}

/// Send a single message and report the result. Returns the exit code.
pub async fn run_one_shot<T: Transport, W: Write>(
    conversation: &mut Conversation<T>,
    message: &str,
    out: &mut W,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
) -> i32 {
    match send_interruptible(conversation, message, interrupts).await {
        SendStatus::Replied(_) => {
            let _ = writeln!(out);
            0
        }
        SendStatus::Failed => {
            eprintln!("error: {}", conversation.error().unwrap_or("request failed"));
            1
        }
        SendStatus::Skipped => {
            eprintln!("error: empty message");
            2
        }
    }
}

/// Read lines from `input` until EOF, `/quit`, or an interrupt at the
/// prompt.
pub async fn run_interactive<T, R, W>(
    conversation: &mut Conversation<T>,
    input: R,
    out: &mut W,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
) -> io::Result<()>
where
    T: Transport,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    print_notice(conversation, out)?;
    let mut lines = input.lines();

    loop {
        write!(out, "{PROMPT}")?;
        out.flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            Some(()) = interrupts.recv() => None,
        };
        let Some(line) = line else {
            writeln!(out)?;
            break;
        };

        match parse_command(&line) {
            Command::Empty => {}
            Command::Quit => break,
            Command::Help => writeln!(out, "{HELP_TEXT}")?,
            Command::Unknown(name) => {
                writeln!(out, "unknown command: /{name} (try /help)")?;
            }
            Command::Reset => {
                conversation.reset_session();
                print_notice(conversation, out)?;
            }
            Command::Clear => {
                conversation.clear_messages();
                print_notice(conversation, out)?;
            }
            Command::Service(url) => {
                conversation.switch_service(url.as_deref());
                print_notice(conversation, out)?;
            }
            Command::Send(message) => {
                match send_interruptible(conversation, &message, interrupts).await {
                    SendStatus::Replied(_) => writeln!(out)?,
                    SendStatus::Failed => writeln!(
                        out,
                        "error: {}",
                        conversation.error().unwrap_or("request failed")
                    )?,
                    SendStatus::Skipped => {}
                }
            }
        }
    }

    Ok(())
}

/// Send a message; an interrupt while it streams cancels the exchange.
async fn send_interruptible<T: Transport>(
    conversation: &mut Conversation<T>,
    message: &str,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
) -> SendStatus {
    let canceller = conversation.canceller();
    let send = conversation.send_message(message);
    tokio::pin!(send);

    loop {
        tokio::select! {
            status = &mut send => return status,
            Some(()) = interrupts.recv() => {
                debug!("interrupt received, cancelling exchange");
                canceller.cancel();
            }
        }
    }
}

fn print_notice<T: Transport, W: Write>(
    conversation: &Conversation<T>,
    out: &mut W,
) -> io::Result<()> {
    if let Some(turn) = conversation.turns().last() {
        writeln!(out, "{}", turn.content)?;
    }
    Ok(())
}
