//! Minimal Server-Sent Events framing
//!
//! Only `data:` fields are kept. Events end at a blank line; multi-line data
//! is joined with `\n`.

#[derive(Debug, Default)]
pub struct SseBuffer {
    buffer: String,
    /// Trailing bytes of a UTF-8 sequence split across chunks
    pending: Vec<u8>,
}

impl SseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) {
        // CRLF may straddle two chunks, so normalize the whole buffer
        self.buffer.push_str(chunk);
        if self.buffer.contains("\r\n") {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }
    }

    /// Append raw body bytes, holding back an incomplete UTF-8 tail
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        let valid = match std::str::from_utf8(&self.pending) {
            Ok(text) => text.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            // Invalid sequence, not just a split one
            Err(_) => {
                let text = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                self.push(&text);
                return;
            }
        };
        let rest = self.pending.split_off(valid);
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending = rest;
        self.push(&text);
    }

    /// Next complete event's data, if one is buffered
    pub fn next_event(&mut self) -> Option<String> {
        loop {
            let end = self.buffer.find("\n\n")?;
            let event: String = self.buffer.drain(..end + 2).collect();
            if let Some(data) = event_data(&event) {
                return Some(data);
            }
        }
    }

    /// Data of a trailing event that was not terminated by a blank line
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        event_data(&rest)
    }
}

fn event_data(event: &str) -> Option<String> {
    let lines: Vec<&str> = event
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}
