//! Incremental server-sent-events decoder
//!
//! Network chunks do not line up with SSE frames, so bytes are buffered
//! until a blank line closes an event.

/// One decoded `data:` payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Data(String),
    /// The `data: [DONE]` sentinel
    Done,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Raw bytes; a multi-byte character may be split across pushes
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning every event completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);
        if self.buffer.contains(&b'\r') {
            self.normalize_line_endings();
        }

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let frame: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            // a frame ends on an ASCII newline, so it holds whole characters
            events.extend(Self::decode_frame(&String::from_utf8_lossy(&frame)));
        }
        events
    }

    /// Flush whatever is left once the connection closes
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        Self::decode_frame(&String::from_utf8_lossy(&rest))
    }

    /// `\r\n` -> `\n`; a trailing `\r` waits for the next push
    fn normalize_line_endings(&mut self) {
        let mut out = Vec::with_capacity(self.buffer.len());
        let mut bytes = self.buffer.iter().peekable();
        while let Some(&b) = bytes.next() {
            if b == b'\r' && bytes.peek() == Some(&&b'\n') {
                continue;
            }
            out.push(b);
        }
        self.buffer = out;
    }

    fn decode_frame(frame: &str) -> Vec<SseEvent> {
        frame
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(str::trim)
            .filter(|data| !data.is_empty())
            .map(|data| {
                if data == "[DONE]" {
                    SseEvent::Done
                } else {
                    SseEvent::Data(data.to_string())
                }
            })
            .collect()
    }
}
