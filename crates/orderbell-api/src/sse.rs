//! Incremental `text/event-stream` decoder.
//!
//! Feeds raw body chunks in, gets complete frames out. Chunks may split
//! lines or multi-byte characters anywhere; the decoder buffers bytes until
//! a line terminator arrives. Field handling follows the HTML event-stream
//! rules: `data` lines accumulate, a blank line dispatches, lines starting
//! with `:` are comments (servers use them as keep-alives).

use bytes::{Buf, BytesMut};
use tracing::warn;

/// Longest line the decoder buffers before giving up on the frame.
pub const MAX_LINE_LEN: usize = 1024 * 1024;

/// One dispatched event-stream frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// The `event:` field, `"message"` when absent.
    pub event: String,
    /// All `data:` lines joined with `\n`.
    pub data: String,
    /// The last `id:` seen, if any.
    pub id: Option<String>,
}

#[derive(Debug)]
pub struct SseDecoder {
    buf: BytesMut,
    data: String,
    has_data: bool,
    event: Option<String>,
    last_id: Option<String>,
    max_line: usize,
    /// Inside a line that blew past `max_line`; bytes are dropped until
    /// its terminator.
    overflowed: bool,
    /// The current frame lost a line; drop it at the next blank line.
    discard_frame: bool,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_LEN)
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            data: String::new(),
            has_data: false,
            event: None,
            last_id: None,
            max_line,
            overflowed: false,
            discard_frame: false,
        }
    }

    /// Append a chunk and return every frame it completes.
    ///
    /// A line longer than the decoder's limit is dropped together with
    /// the frame it belongs to.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        loop {
            if self.overflowed && !self.skip_overlong_line() {
                break;
            }
            let Some(line) = self.next_line() else {
                break;
            };
            if line.len() > self.max_line {
                warn!(
                    len = line.len(),
                    max = self.max_line,
                    "event-stream line too long; dropping frame"
                );
                self.discard_frame = true;
                continue;
            }
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }

        if self.buf.len() > self.max_line {
            warn!(
                len = self.buf.len(),
                max = self.max_line,
                "event-stream line too long; dropping frame"
            );
            self.buf.clear();
            self.overflowed = true;
            self.discard_frame = true;
        }
        frames
    }

    /// Drop the rest of an overlong line. Returns `true` once its
    /// terminator has been consumed.
    fn skip_overlong_line(&mut self) -> bool {
        let Some(pos) = self.buf.iter().position(|b| *b == b'\n' || *b == b'\r') else {
            self.buf.clear();
            return false;
        };
        self.buf.advance(pos);
        if self.next_line().is_none() {
            return false;
        }
        self.overflowed = false;
        true
    }

    /// Split the next complete line off the buffer.
    ///
    /// A trailing `\r` is held back until the next byte shows whether it is
    /// half of a `\r\n` pair.
    fn next_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|b| *b == b'\n' || *b == b'\r')?;

        let terminator_len = match (self.buf.get(pos), self.buf.get(pos + 1)) {
            (Some(b'\r'), Some(b'\n')) => 2,
            (Some(b'\r'), None) => return None,
            _ => 1,
        };

        let line = self.buf.split_to(pos);
        self.buf.advance(terminator_len);
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if self.discard_frame {
            if line.is_empty() {
                self.discard_frame = false;
                self.data.clear();
                self.has_data = false;
                self.event = None;
            }
            return None;
        }
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => {
                if self.has_data {
                    self.data.push('\n');
                }
                self.data.push_str(value);
                self.has_data = true;
            }
            "event" => self.event = Some(value.to_owned()),
            "id" if !value.contains('\0') => self.last_id = Some(value.to_owned()),
            // `retry` and unknown fields are ignored; reconnect timing is
            // owned by the transport.
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if !self.has_data {
            return None;
        }
        self.has_data = false;

        Some(SseFrame {
            event: event.unwrap_or_else(|| "message".into()),
            data: std::mem::take(&mut self.data),
            id: self.last_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn decodes_single_frame() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b"data: {\"type\":\"ping\"}\n\n");
        assert_eq!(
            frames,
            vec![SseFrame {
                event: "message".into(),
                data: "{\"type\":\"ping\"}".into(),
                id: None,
            }]
        );
    }

    #[test]
    fn joins_multi_line_data_and_keeps_event_and_id() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b"event: order\nid: 42\ndata: first\ndata: second\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "order");
        assert_eq!(frames[0].data, "first\nsecond");
        assert_eq!(frames[0].id.as_deref(), Some("42"));
    }

    #[test]
    fn handles_chunks_split_mid_line_and_crlf() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: hel").is_empty());
        assert!(decoder.push(b"lo\r").is_empty());
        let frames = decoder.push(b"\n\r\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "hello");
    }

    #[test]
    fn handles_multibyte_character_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        let bytes = "data: café\n\n".as_bytes();
        let (head, tail) = bytes.split_at(10);
        assert!(decoder.push(head).is_empty());
        let frames = decoder.push(tail);
        assert_eq!(frames[0].data, "café");
    }

    #[test]
    fn comments_and_empty_frames_dispatch_nothing() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b": keep-alive\n\n").is_empty());
        assert!(decoder.push(b"event: lonely\n\n").is_empty());

        // The dangling event name must not leak into the next frame.
        let frames = decoder.push(b"data: x\n\n");
        assert_eq!(frames[0].event, "message");
    }

    #[test]
    fn field_without_colon_and_without_space() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b"data:tight\ndata\n\n");
        assert_eq!(frames[0].data, "tight\n");
    }

    #[test]
    fn unterminated_overlong_line_drops_its_frame_and_recovers() {
        let mut decoder = SseDecoder::with_max_line(16);
        assert!(decoder.push(b"data: 0123456789").is_empty());
        assert!(decoder.push(b"abcdefghij").is_empty());
        assert!(decoder.push(b"more\ndata: tail\n\n").is_empty());

        let frames = decoder.push(b"data: next\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "next");
    }

    #[test]
    fn complete_overlong_line_drops_only_its_frame() {
        let mut decoder = SseDecoder::with_max_line(16);
        let frames = decoder.push(b"data: 0123456789abcdef\n\ndata: ok\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "ok");
    }
}
