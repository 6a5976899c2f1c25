//! Incremental SSE parser for streamed generations.
//!
//! Handles both wire shapes the providers emit: Anthropic event frames
//! (`event: content_block_delta` + `data: {...}`) and OpenAI-style bare
//! `data: {...}` chunk lines ending with `data: [DONE]`. Frames arrive
//! fragmented across network chunks; the parser buffers until the `\n\n`
//! frame boundary.

use crate::logging::emit_stream_parse_error;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    Token(String),
    Stop,
}

#[derive(Default)]
pub struct SseParser {
    buffer: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, chunk: &[u8]) -> Vec<StreamFrame> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        let mut frames = Vec::new();
        let mut start = 0;

        while let Some(end) = self.buffer[start..].find("\n\n") {
            let frame_end = start + end + 2;
            let frame_text = &self.buffer[start..frame_end];

            let mut event_type = None;
            let mut data = None;
            for line in frame_text.lines() {
                if let Some(rest) = line.strip_prefix("event: ") {
                    event_type = Some(rest.trim().to_string());
                } else if let Some(rest) = line.strip_prefix("data: ") {
                    data = Some(rest.trim().to_string());
                }
            }

            if let Some(json_data) = data {
                if json_data == "[DONE]" {
                    frames.push(StreamFrame::Stop);
                } else {
                    match serde_json::from_str::<Value>(&json_data) {
                        Ok(value) => frames.extend(extract_frames(event_type.as_deref(), &value)),
                        Err(parse_error) => emit_stream_parse_error(frame_text, &parse_error),
                    }
                }
            }

            start = frame_end;
        }

        if start > 0 {
            self.buffer.drain(..start);
        }

        frames
    }
}

fn extract_frames(event_type: Option<&str>, value: &Value) -> Vec<StreamFrame> {
    // Anthropic frames are tagged both by the SSE event line and by the
    // payload's "type" field; trust the payload.
    match value.get("type").and_then(Value::as_str) {
        Some("content_block_delta") => {
            return value
                .pointer("/delta/text")
                .and_then(Value::as_str)
                .map(|text| vec![StreamFrame::Token(text.to_string())])
                .unwrap_or_default();
        }
        Some("message_stop") => return vec![StreamFrame::Stop],
        Some(_) => return Vec::new(),
        None => {}
    }

    // OpenAI chunk shape: choices[0].delta.content, finish_reason on the
    // final chunk (the [DONE] sentinel also closes the stream).
    let _ = event_type;
    let mut frames = Vec::new();
    if let Some(text) = value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
    {
        if !text.is_empty() {
            frames.push(StreamFrame::Token(text.to_string()));
        }
    }
    if value
        .pointer("/choices/0/finish_reason")
        .and_then(Value::as_str)
        .is_some()
    {
        frames.push(StreamFrame::Stop);
    }
    frames
}
