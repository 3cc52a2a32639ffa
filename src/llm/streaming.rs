//! Incremental parsing of streamed responses.
//!
//! Both server-sent events (`data: {...}` lines, OpenAI-compatible and Anthropic) and
//! newline-delimited JSON (local inference) arrive as arbitrary byte chunks. The
//! [`FrameDecoder`] buffers them into complete lines and yields JSON frames; the
//! [`StreamAccumulator`] folds text and thinking deltas into one [`CallResult`].

use crate::llm::types::{CallResult, ThinkingSegment};
use serde_json::Value;
use tracing::trace;

/// One decoded stream frame
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    /// SSE `event:` name paired with its JSON payload, or a bare NDJSON line
    Data { event: Option<String>, data: Value },
    /// `data: [DONE]`
    Done,
}

/// Splits an incoming byte stream into complete frames
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    pending_event: Option<String>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes and return every frame completed by it
    pub fn push(&mut self, bytes: &[u8]) -> Vec<StreamFrame> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = self.decode_line(line.trim_end_matches(['\r', '\n'])) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush a trailing line that arrived without a newline
    pub fn finish(&mut self) -> Vec<StreamFrame> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        let rest = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&rest).to_string();
        self.decode_line(line.trim()).into_iter().collect()
    }

    fn decode_line(&mut self, line: &str) -> Option<StreamFrame> {
        let line = line.trim();
        if line.is_empty() || line.starts_with(':') {
            return None;
        }
        if let Some(event) = line.strip_prefix("event:") {
            self.pending_event = Some(event.trim().to_string());
            return None;
        }
        let payload = line.strip_prefix("data:").map(str::trim).unwrap_or(line);
        if payload == "[DONE]" {
            return Some(StreamFrame::Done);
        }
        match serde_json::from_str::<Value>(payload) {
            Ok(data) => Some(StreamFrame::Data {
                event: self.pending_event.take(),
                data,
            }),
            Err(e) => {
                trace!(error = %e, "skipping undecodable stream line");
                None
            }
        }
    }
}

/// Folds deltas into one result
#[derive(Debug, Default, Clone)]
pub struct StreamAccumulator {
    text: String,
    thinking: Vec<ThinkingSegment>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_text(&mut self, delta: &str) {
        self.text.push_str(delta);
    }

    /// Append to the open segment with the same label, or start a new one
    pub fn push_thinking(&mut self, kind: Option<&str>, label: &str, delta: &str) {
        if delta.is_empty() {
            return;
        }
        match self.thinking.last_mut() {
            Some(last) if last.label == label && last.kind.as_deref() == kind => {
                last.text.push_str(delta)
            }
            _ => self
                .thinking
                .push(ThinkingSegment::new(kind, label.to_string(), delta)),
        }
    }

    /// Merge an already-normalized delta
    pub fn merge(&mut self, delta: &CallResult) {
        self.push_text(&delta.text);
        for segment in &delta.thinking {
            self.push_thinking(segment.kind.as_deref(), &segment.label, &segment.text);
        }
    }

    pub fn snapshot(&self) -> CallResult {
        CallResult {
            text: self.text.clone(),
            thinking: self.thinking.clone(),
        }
    }

    pub fn finish(self) -> CallResult {
        CallResult {
            text: self.text,
            thinking: self.thinking,
        }
        .dedup_thinking()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sse_frames_split_across_chunks() {
        let mut decoder = FrameDecoder::new();
        let mut frames = decoder.push(b"data: {\"a\":");
        assert!(frames.is_empty());
        frames.extend(decoder.push(b"1}\n\ndata: [DONE]\n"));
        assert_eq!(
            frames,
            vec![
                StreamFrame::Data {
                    event: None,
                    data: json!({"a": 1})
                },
                StreamFrame::Done
            ]
        );
    }

    #[test]
    fn test_sse_event_names_attach_to_next_data() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(
            b"event: content_block_delta\ndata: {\"x\":true}\n\n: keepalive\ndata: {\"y\":1}\n",
        );
        assert_eq!(frames.len(), 2);
        assert!(matches!(
            &frames[0],
            StreamFrame::Data { event: Some(e), .. } if e == "content_block_delta"
        ));
        assert!(matches!(&frames[1], StreamFrame::Data { event: None, .. }));
    }

    #[test]
    fn test_ndjson_with_unterminated_tail() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(b"{\"response\":\"a\"}\n{\"response\":\"b\"}");
        assert_eq!(frames.len(), 1);
        let tail = decoder.finish();
        assert_eq!(
            tail,
            vec![StreamFrame::Data {
                event: None,
                data: json!({"response": "b"})
            }]
        );
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_undecodable_tail_is_dropped() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"{\"response\":\"b\"").is_empty());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_accumulator_appends_same_label() {
        let mut acc = StreamAccumulator::new();
        acc.push_thinking(Some("reasoning"), "Reasoning", "step ");
        acc.push_thinking(Some("reasoning"), "Reasoning", "one");
        acc.push_text("Hi");
        acc.push_text(" there");
        let result = acc.finish();
        assert_eq!(result.text, "Hi there");
        assert_eq!(result.thinking.len(), 1);
        assert_eq!(result.thinking[0].text, "step one");
    }
}
