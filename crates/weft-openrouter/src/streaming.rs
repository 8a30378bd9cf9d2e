//! SSE decoding for streamed OpenRouter responses.
//!
//! The body arrives in arbitrary byte chunks. [`SseDecoder`] buffers them,
//! splits complete lines, and parses each `data:` payload into
//! [`SseEvent`]s. Comment lines (`: OPENROUTER PROCESSING`) and blank lines
//! are skipped; `data: [DONE]` ends the stream.

use serde::Deserialize;
use tracing::warn;

/// One decoded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Text for one choice.
    Delta { index: usize, text: String },
    /// The provider reported an error mid-stream.
    Error(String),
    /// `data: [DONE]` was received.
    Done,
}

// ── Wire types ─────────────────────────────────────────────────────

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<StreamError>,
}

#[derive(Deserialize)]
struct StreamChoice {
    index: Option<usize>,
    /// Chat endpoint.
    delta: Option<StreamDelta>,
    /// Completions endpoint.
    text: Option<String>,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamError {
    message: String,
}

// ── Decoder ────────────────────────────────────────────────────────

/// Incremental line decoder over SSE byte chunks.
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Raw bytes of the unfinished line. Decoded only once complete, so a
    /// code point split across chunks stays intact.
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `[DONE]` has been seen. Later input is ignored.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one chunk and return the events from every complete line in it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }
        self.buffer.extend_from_slice(chunk);

        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&raw);
            if self.parse_line(line.trim(), &mut events) {
                self.buffer.clear();
                break;
            }
        }
        events
    }

    /// Flush a trailing line that never got its newline.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if !self.done {
            let remaining = std::mem::take(&mut self.buffer);
            self.parse_line(String::from_utf8_lossy(&remaining).trim(), &mut events);
        }
        events
    }

    /// Returns `true` once the terminating line is seen.
    fn parse_line(&mut self, line: &str, events: &mut Vec<SseEvent>) -> bool {
        if line.is_empty() || line.starts_with(':') {
            return false;
        }
        if line == "data: [DONE]" {
            self.done = true;
            events.push(SseEvent::Done);
            return true;
        }
        if let Some(data) = line.strip_prefix("data: ") {
            parse_sse_data(data, events);
        }
        false
    }
}

/// Parse one `data:` payload. Choices without an explicit `index` take
/// their position in the `choices` array.
pub fn parse_sse_data(data: &str, events: &mut Vec<SseEvent>) {
    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => {
            if let Some(err) = chunk.error {
                events.push(SseEvent::Error(err.message));
                return;
            }
            for (position, choice) in chunk.choices.into_iter().enumerate() {
                let text = choice
                    .delta
                    .and_then(|d| d.content)
                    .or(choice.text)
                    .unwrap_or_default();
                if !text.is_empty() {
                    events.push(SseEvent::Delta {
                        index: choice.index.unwrap_or(position),
                        text,
                    });
                }
            }
        }
        Err(e) => {
            warn!("Failed to parse SSE chunk: {e} (data: {data})");
        }
    }
}
