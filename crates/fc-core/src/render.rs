//! Incremental printing of the streaming reply.

use std::io::Write;

use tokio::sync::watch;

use crate::conversation::LiveReply;

/// Prints the part of the live reply that has not been printed yet.
///
/// Reply text only ever grows within one exchange, so each redraw writes the
/// new suffix. A new exchange id starts over from the beginning.
pub struct ReplyPrinter<W: Write> {
    writer: W,
    live: watch::Receiver<LiveReply>,
    exchange: u64,
    printed: usize,
}

impl<W: Write> ReplyPrinter<W> {
    pub fn new(writer: W, live: watch::Receiver<LiveReply>) -> Self {
        let exchange = live.borrow().exchange;
        Self {
            writer,
            live,
            exchange,
            printed: 0,
        }
    }

    /// Write any new reply text and flush.
    pub fn redraw(&mut self) {
        let (exchange, suffix) = {
            let live = self.live.borrow_and_update();
            let start = if live.exchange == self.exchange {
                self.printed
            } else {
                0
            };
            (
                live.exchange,
                live.text.get(start..).unwrap_or_default().to_string(),
            )
        };

        if exchange != self.exchange {
            self.exchange = exchange;
            self.printed = 0;
        }
        if suffix.is_empty() {
            return;
        }

        let _ = self.writer.write_all(suffix.as_bytes());
        let _ = self.writer.flush();
        self.printed += suffix.len();
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn printed(printer: &ReplyPrinter<Vec<u8>>) -> String {
        String::from_utf8_lossy(printer.writer()).into_owned()
    }

    #[test]
    fn prints_only_new_text() {
        let (tx, rx) = watch::channel(LiveReply::default());
        let mut printer = ReplyPrinter::new(Vec::new(), rx);

        tx.send_modify(|live| {
            live.exchange = 1;
            live.text.push_str("Hel");
        });
        printer.redraw();
        tx.send_modify(|live| live.text.push_str("lo"));
        printer.redraw();
        printer.redraw();

        assert_eq!(printed(&printer), "Hello");
    }

    #[test]
    fn new_exchange_starts_over() {
        let (tx, rx) = watch::channel(LiveReply::default());
        let mut printer = ReplyPrinter::new(Vec::new(), rx);

        tx.send_modify(|live| {
            live.exchange = 1;
            live.text = "first reply".to_string();
        });
        printer.redraw();
        tx.send_modify(|live| {
            live.exchange = 2;
            live.text = "2nd".to_string();
        });
        printer.redraw();

        assert_eq!(printed(&printer), "first reply2nd");
    }

    #[test]
    fn multibyte_text_is_not_split() {
        let (tx, rx) = watch::channel(LiveReply::default());
        let mut printer = ReplyPrinter::new(Vec::new(), rx);

        tx.send_modify(|live| {
            live.exchange = 1;
            live.text = "✅ 工".to_string();
        });
        printer.redraw();
        tx.send_modify(|live| live.text.push_str("具 done"));
        printer.redraw();

        assert_eq!(printed(&printer), "✅ 工具 done");
    }

    #[test]
    fn nothing_to_print_writes_nothing() {
        let (_tx, rx) = watch::channel(LiveReply::default());
        let mut printer = ReplyPrinter::new(Vec::new(), rx);
        printer.redraw();
        assert!(printer.writer().is_empty());
    }
}
