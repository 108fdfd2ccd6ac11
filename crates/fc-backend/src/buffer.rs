//! Append-only text view over the bytes received for one exchange.

/// Cumulative response text for one exchange.
///
/// Transports hand over byte deltas whose boundaries may fall inside a
/// multi-byte character. The incomplete tail is held back until the rest of
/// the character arrives, so `as_str()` only ever grows by appending.
#[derive(Debug, Default)]
pub struct RawBuffer {
    text: String,
    pending: Vec<u8>,
}

impl RawBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delta. Invalid sequences become U+FFFD.
    pub fn append(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    self.text.push_str(valid);
                    self.pending.clear();
                    return;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    self.text
                        .push_str(&String::from_utf8_lossy(&self.pending[..valid_up_to]));
                    match e.error_len() {
                        // Truncated character: wait for more bytes.
                        None => {
                            self.pending.drain(..valid_up_to);
                            return;
                        }
                        Some(invalid_len) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid_up_to + invalid_len);
                        }
                    }
                }
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}
