//! Response normalization.
//!
//! Vendors disagree on where answer text and reasoning live. The Anthropic and local
//! inference schemas are fixed, so they get small tagged adapters. The OpenAI-compatible
//! family is genuinely heterogeneous (`content` may be a string or an array of parts,
//! reasoning shows up as `reasoning`, `reasoning_content`, `thinking`, nested objects or
//! typed parts), so it goes through [`walk`], a bounded recursive walker over the JSON
//! tree that classifies every string leaf as answer text or thinking.

use crate::llm::types::{CallResult, ThinkingSegment};
use serde_json::Value;

/// Maximum nesting the walker descends into
pub const MAX_WALK_DEPTH: usize = 12;

/// Fields holding a single structured value; serialized whole instead of walked
const JSON_PAYLOAD_KEYS: &[&str] = &["json", "parsed", "arguments", "input_json", "output_json"];

/// Fields whose strings are free text in the current classification
const TEXT_KEYS: &[&str] = &[
    "content",
    "text",
    "output_text",
    "value",
    "parts",
    "message",
    "output",
    "delta",
    "summary",
];

/// Metadata fields that merely look like reasoning
const IGNORED_KEYS: &[&str] = &["finish_reason", "stop_reason", "signature", "encrypted_content"];

/// Top-level fields tried when the walk yields no text
const FALLBACK_TEXT_KEYS: &[&str] = &["output_text", "text", "response", "content", "completion"];

/// Classification of the subtree being walked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkKind {
    Text,
    Thinking { kind: Option<String>, label: String },
}

/// Accumulator filled by [`walk`]
#[derive(Debug, Default)]
pub struct WalkOutput {
    pub text: String,
    pub thinking: Vec<ThinkingSegment>,
}

impl WalkOutput {
    fn push(&mut self, kind: &WalkKind, s: &str) {
        if s.is_empty() {
            return;
        }
        match kind {
            WalkKind::Text => self.text.push_str(s),
            WalkKind::Thinking { kind, label } => self
                .thinking
                .push(ThinkingSegment::new(kind.as_deref(), label.clone(), s)),
        }
    }

    pub fn into_result(self) -> CallResult {
        CallResult {
            text: self.text,
            thinking: self.thinking,
        }
        .dedup_thinking()
    }
}

fn thinking_kind_for(name: &str) -> Option<WalkKind> {
    let lowered = name.to_lowercase();
    if lowered.contains("reason") {
        Some(WalkKind::Thinking {
            kind: Some("reasoning".to_string()),
            label: "Reasoning".to_string(),
        })
    } else if lowered.contains("think") {
        Some(WalkKind::Thinking {
            kind: Some("thinking".to_string()),
            label: "Thinking".to_string(),
        })
    } else {
        None
    }
}

/// Walk `value`, classifying string leaves under `kind`
pub fn walk(value: &Value, kind: &WalkKind, depth: usize, out: &mut WalkOutput) {
    if depth > MAX_WALK_DEPTH {
        return;
    }
    match value {
        Value::String(s) => out.push(kind, s),
        Value::Array(items) => {
            for item in items {
                walk(item, kind, depth + 1, out);
            }
        }
        Value::Object(map) => {
            // An explicit type tag overrides the inherited classification
            let mut current = kind.clone();
            if let Some(tag) = map.get("type").and_then(Value::as_str) {
                if let Some(thinking) = thinking_kind_for(tag) {
                    current = match thinking {
                        WalkKind::Thinking { label, .. } => WalkKind::Thinking {
                            kind: Some(tag.to_string()),
                            label,
                        },
                        text => text,
                    };
                } else if matches!(tag, "text" | "output_text") {
                    current = WalkKind::Text;
                }
            }

            for (key, child) in map {
                if IGNORED_KEYS.contains(&key.as_str()) {
                    continue;
                }
                if JSON_PAYLOAD_KEYS.contains(&key.as_str()) {
                    match child {
                        Value::Null => {}
                        Value::String(s) => out.push(&current, s),
                        other => out.push(&current, &other.to_string()),
                    }
                } else if let Some(thinking) = thinking_kind_for(key) {
                    walk(child, &thinking, depth + 1, out);
                } else if TEXT_KEYS.contains(&key.as_str()) {
                    walk(child, &current, depth + 1, out);
                }
            }
        }
        _ => {}
    }
}

/// Try a short list of likely top-level text fields
pub fn fallback_text(response: &Value) -> Option<String> {
    FALLBACK_TEXT_KEYS
        .iter()
        .filter_map(|key| response.get(*key).and_then(Value::as_str))
        .find(|s| !s.trim().is_empty())
        .map(str::to_string)
}

/// Normalize an OpenAI-compatible chat completion (or a streamed delta frame)
pub fn normalize_openai_compatible(response: &Value) -> CallResult {
    let mut out = WalkOutput::default();

    let choice = response
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first());

    match choice {
        Some(choice) => {
            let node = choice
                .get("message")
                .or_else(|| choice.get("delta"))
                .unwrap_or(choice);
            walk(node, &WalkKind::Text, 0, &mut out);
        }
        None => {
            // Responses-style payloads keep everything under `output`
            if let Some(output) = response.get("output") {
                walk(output, &WalkKind::Text, 0, &mut out);
            }
        }
    }

    if out.text.is_empty() {
        if let Some(text) = fallback_text(response) {
            out.text = text;
        }
    }
    out.into_result()
}

/// Adapter for the Anthropic messages schema: `content` is an array of typed blocks
pub fn normalize_anthropic(response: &Value) -> CallResult {
    let mut result = CallResult::default();
    if let Some(blocks) = response.get("content").and_then(Value::as_array) {
        for block in blocks {
            match block.get("type").and_then(Value::as_str) {
                Some("text") => {
                    if let Some(text) = block.get("text").and_then(Value::as_str) {
                        result.text.push_str(text);
                    }
                }
                Some("thinking") => {
                    if let Some(text) = block.get("thinking").and_then(Value::as_str) {
                        result
                            .thinking
                            .push(ThinkingSegment::new(Some("thinking"), "Thinking", text));
                    }
                }
                _ => {}
            }
        }
    }
    if result.text.is_empty() {
        if let Some(text) = fallback_text(response) {
            result.text = text;
        }
    }
    result.dedup_thinking()
}

/// Adapter for the local-inference schema: `{response, thinking?}`
pub fn normalize_local(response: &Value) -> CallResult {
    let mut result = CallResult::default();
    if let Some(text) = response.get("response").and_then(Value::as_str) {
        result.text.push_str(text);
    } else if let Some(text) = response
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
    {
        result.text.push_str(text);
    }
    if let Some(thinking) = response.get("thinking").and_then(Value::as_str) {
        result
            .thinking
            .push(ThinkingSegment::new(Some("thinking"), "Thinking", thinking));
    }
    result.dedup_thinking()
}

/// Strip inline `<think>...</think>` blocks some local models emit, moving them to thinking
pub fn split_inline_thinking(mut result: CallResult) -> CallResult {
    const OPEN: &str = "<think>";
    const CLOSE: &str = "</think>";

    while let Some(start) = result.text.find(OPEN) {
        let Some(rel_end) = result.text[start..].find(CLOSE) else {
            break;
        };
        let end = start + rel_end;
        let inner = result.text[start + OPEN.len()..end].trim().to_string();
        result.text.replace_range(start..end + CLOSE.len(), "");
        if !inner.is_empty() {
            result
                .thinking
                .push(ThinkingSegment::new(Some("thinking"), "Thinking", inner));
        }
    }
    result.text = result.text.trim_start().to_string();
    result.dedup_thinking()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_openai_string_content_and_nested_reasoning() {
        let response = json!({
            "id": "chatcmpl-1",
            "model": "o4-mini",
            "choices": [{
                "index": 0,
                "finish_reason": "stop",
                "message": {
                    "role": "assistant",
                    "content": "The answer.",
                    "reasoning": {"text": "Because of the premise."}
                }
            }]
        });
        let result = normalize_openai_compatible(&response);
        assert_eq!(result.text, "The answer.");
        assert_eq!(result.thinking.len(), 1);
        assert_eq!(result.thinking[0].text, "Because of the premise.");
        assert_eq!(result.thinking[0].label, "Reasoning");
    }

    #[test]
    fn test_openai_typed_content_parts() {
        let response = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": [
                        {"type": "thinking", "text": "let me see"},
                        {"type": "text", "text": "Hello "},
                        {"type": "output_text", "text": "world"}
                    ]
                }
            }]
        });
        let result = normalize_openai_compatible(&response);
        assert_eq!(result.text, "Hello world");
        assert_eq!(result.thinking.len(), 1);
        assert_eq!(result.thinking[0].kind.as_deref(), Some("thinking"));
    }

    #[test]
    fn test_json_payload_serialized_whole() {
        let response = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "parsed": {"highlights": [{"text": "a"}]}
                }
            }]
        });
        let result = normalize_openai_compatible(&response);
        let parsed: Value = serde_json::from_str(&result.text).unwrap();
        assert_eq!(parsed["highlights"][0]["text"], "a");
    }

    #[test]
    fn test_thinking_deduplicated() {
        let response = json!({
            "choices": [{
                "message": {
                    "content": "ok",
                    "reasoning_content": "same thought",
                    "reasoning": " same thought "
                }
            }]
        });
        let result = normalize_openai_compatible(&response);
        assert_eq!(result.thinking.len(), 1);
    }

    #[test]
    fn test_fallback_top_level_text() {
        let response = json!({"choices": [], "output_text": "fallback"});
        assert_eq!(normalize_openai_compatible(&response).text, "fallback");
    }

    #[test]
    fn test_depth_limit() {
        let mut nested = json!("deep");
        for _ in 0..(MAX_WALK_DEPTH + 5) {
            nested = json!({ "content": nested });
        }
        let mut out = WalkOutput::default();
        walk(&nested, &WalkKind::Text, 0, &mut out);
        assert!(out.text.is_empty());
    }

    #[test]
    fn test_anthropic_blocks() {
        let response = json!({
            "type": "message",
            "role": "assistant",
            "content": [
                {"type": "thinking", "thinking": "pondering", "signature": "abc"},
                {"type": "text", "text": "Result"}
            ]
        });
        let result = normalize_anthropic(&response);
        assert_eq!(result.text, "Result");
        assert_eq!(result.thinking[0].text, "pondering");
    }

    #[test]
    fn test_local_response() {
        let result = normalize_local(&json!({"response": "hi", "done": true}));
        assert_eq!(result.text, "hi");
        assert!(result.thinking.is_empty());
    }

    #[test]
    fn test_split_inline_thinking() {
        let result = split_inline_thinking(CallResult::text("<think>plan</think>\nAnswer"));
        assert_eq!(result.text, "Answer");
        assert_eq!(result.thinking[0].text, "plan");
    }
}
