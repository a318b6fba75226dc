//! Server-sent-event framing.
//!
//! `encode_chunk`/`DONE_FRAME` build the outgoing wire format; `SseDecoder`
//! parses an incoming byte stream the other direction, buffering partial
//! trailing lines across reads and exposing a feed/finish split so it can be
//! unit-tested without a live HTTP body.

use serde_json::json;

pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Build the bare JSON body of one outgoing chat-completion chunk carrying
/// `content` as the delta text for `id` — what goes after `data: ` on the
/// wire. Exposed separately from `encode_chunk` so callers writing through
/// `axum::response::sse::Event` (which adds its own `data: `/`\n\n` framing)
/// can use it directly instead of double-wrapping.
pub fn chunk_json(id: &str, content: &str) -> String {
    let payload = json!({
        "id": id,
        "object": "chat.completion.chunk",
        "created": unix_seconds(),
        "choices": [{
            "index": 0,
            "delta": { "content": content },
            "finish_reason": serde_json::Value::Null,
        }],
    });
    payload.to_string()
}

/// Build one outgoing chat-completion chunk frame carrying `content` as the
/// delta text for `id`.
pub fn encode_chunk(id: &str, content: &str) -> String {
    format!("data: {}\n\n", chunk_json(id, content))
}

fn unix_seconds() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// One decoded event from an upstream SSE body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A `data: ...` payload, with the `data: ` prefix stripped. Carried
    /// verbatim, including malformed JSON.
    Data(String),
    /// The `[DONE]` sentinel.
    Done,
}

/// Incremental line-buffering SSE decoder. Feed it raw bytes as they arrive
/// off the wire; it yields complete events and holds any trailing partial
/// line until the next `feed`.
#[derive(Default)]
pub struct SseDecoder {
    buf: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of raw bytes, returning any complete events it produced.
    /// Non-UTF-8 input is dropped silently — upstream SSE bodies are text.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        let Ok(text) = std::str::from_utf8(bytes) else {
            return Vec::new();
        };
        self.buf.push_str(text);

        let mut lines: Vec<String> = self.buf.split('\n').map(str::to_string).collect();
        // The last element is either empty (buf ended on a newline) or a
        // partial line — hold it back either way.
        let remainder = lines.pop().unwrap_or_default();

        let events = lines
            .into_iter()
            .filter_map(|line| parse_line(line.trim()))
            .collect();

        self.buf = remainder;
        events
    }

    /// Flush any trailing buffered partial line as a final event, if it
    /// looks like a complete (if unterminated) `data:` line. Call once the
    /// upstream body is exhausted.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let line = std::mem::take(&mut self.buf);
        parse_line(line.trim())
    }
}

fn parse_line(line: &str) -> Option<SseEvent> {
    if line.is_empty() {
        return None;
    }
    let payload = line.strip_prefix("data:")?.trim_start();
    if payload == "[DONE]" {
        Some(SseEvent::Done)
    } else {
        Some(SseEvent::Data(payload.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_chunk_wraps_content_in_a_data_frame() {
        let frame = encode_chunk("abc", "hello");
        assert!(frame.starts_with("data: {"));
        assert!(frame.ends_with("\n\n"));
        assert!(frame.contains("\"content\":\"hello\""));
    }

    #[test]
    fn decoder_yields_complete_lines_and_buffers_partial_ones() {
        let mut dec = SseDecoder::new();
        let events = dec.feed(b"data: {\"a\":1}\ndata: {\"a\":2");
        assert_eq!(events, vec![SseEvent::Data("{\"a\":1}".to_string())]);

        let events = dec.feed(b"}\ndata: [DONE]\n");
        assert_eq!(
            events,
            vec![SseEvent::Data("{\"a\":2}".to_string()), SseEvent::Done]
        );
    }

    #[test]
    fn decoder_forwards_malformed_payloads_verbatim() {
        let mut dec = SseDecoder::new();
        let events = dec.feed(b"data: not json at all\n");
        assert_eq!(events, vec![SseEvent::Data("not json at all".to_string())]);
    }

    #[test]
    fn decoder_ignores_blank_lines() {
        let mut dec = SseDecoder::new();
        let events = dec.feed(b"\n\ndata: {\"a\":1}\n\n");
        assert_eq!(events, vec![SseEvent::Data("{\"a\":1}".to_string())]);
    }

    #[test]
    fn finish_flushes_an_unterminated_trailing_line() {
        let mut dec = SseDecoder::new();
        dec.feed(b"data: {\"a\":1}\ndata: [DONE]");
        assert_eq!(dec.finish(), Some(SseEvent::Done));
    }
}
