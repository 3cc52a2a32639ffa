//! Anthropic messages transport.
//!
//! The system prompt travels as a top-level `system` field and the answer comes back as
//! an array of typed content blocks.

use crate::llm::normalizer::normalize_anthropic;
use crate::llm::streaming::StreamFrame;
use crate::llm::transport::{StreamEvent, TransportContext};
use crate::llm::types::{CallRequest, CallResult, ResponseFormat, Role};
use serde_json::{Value, json};
use tracing::trace;

pub const MESSAGES_PATH: &str = "v1/messages";
pub const API_VERSION: &str = "2023-06-01";

pub fn build_body(ctx: &TransportContext, request: &CallRequest, stream: bool) -> Value {
    let messages: Vec<Value> = request
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
        .collect();

    let mut body = json!({
        "model": ctx.model,
        "messages": messages,
        "max_tokens": request.max_output_tokens.unwrap_or(ctx.max_output_tokens),
        "stream": stream,
    });

    let mut system = request.system_prompt();
    if request.response_format == ResponseFormat::Json {
        let hint = "Respond with valid JSON only.";
        system = Some(match system {
            Some(s) => format!("{}\n\n{}", s, hint),
            None => hint.to_string(),
        });
    }
    if let Some(system) = system {
        body["system"] = json!(system);
    }

    // Extended thinking forbids custom temperature
    if let Some(thinking) = &request.thinking {
        body["thinking"] = json!({
            "type": "enabled",
            "budget_tokens": thinking.budget_tokens,
        });
    } else if let Some(temperature) = request.temperature {
        body["temperature"] = json!(temperature);
    }

    body
}

pub fn headers(ctx: &TransportContext) -> Vec<(&'static str, String)> {
    let mut headers = vec![
        ("Content-Type", "application/json".to_string()),
        ("anthropic-version", API_VERSION.to_string()),
    ];
    if let Some(key) = &ctx.api_key {
        headers.push(("x-api-key", key.clone()));
    }
    headers
}

pub fn normalize(response: &Value) -> CallResult {
    normalize_anthropic(response)
}

pub fn stream_event(frame: &StreamFrame) -> StreamEvent {
    let StreamFrame::Data { event, data } = frame else {
        return StreamEvent::Done;
    };
    let event_type = event
        .as_deref()
        .or_else(|| data["type"].as_str())
        .unwrap_or_default();

    match event_type {
        "content_block_start" => {
            let block = &data["content_block"];
            let mut delta = CallResult::default();
            match block["type"].as_str() {
                Some("text") => delta.text = block["text"].as_str().unwrap_or("").to_string(),
                Some("thinking") => {
                    if let Some(text) = block["thinking"].as_str() {
                        delta.thinking.push(crate::llm::types::ThinkingSegment::new(
                            Some("thinking"),
                            "Thinking",
                            text,
                        ));
                    }
                }
                _ => {}
            }
            StreamEvent::Delta(delta)
        }
        "content_block_delta" => {
            let delta = &data["delta"];
            match delta["type"].as_str() {
                Some("text_delta") => {
                    StreamEvent::Delta(CallResult::text(delta["text"].as_str().unwrap_or("")))
                }
                Some("thinking_delta") => {
                    let mut result = CallResult::default();
                    if let Some(text) = delta["thinking"].as_str() {
                        result.thinking.push(crate::llm::types::ThinkingSegment::new(
                            Some("thinking"),
                            "Thinking",
                            text,
                        ));
                    }
                    StreamEvent::Delta(result)
                }
                _ => StreamEvent::Ignore,
            }
        }
        "message_stop" => StreamEvent::Done,
        "error" => StreamEvent::Error(
            data["error"]["message"]
                .as_str()
                .unwrap_or("stream error")
                .to_string(),
        ),
        other => {
            trace!(event_type = other, "ignoring stream event");
            StreamEvent::Ignore
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ThinkingOptions;

    fn ctx() -> TransportContext {
        TransportContext {
            provider_id: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key: Some("sk-ant".to_string()),
            max_output_tokens: 4096,
            reasoning: false,
        }
    }

    #[test]
    fn test_system_prompt_lifted_to_top_level() {
        let request = CallRequest::prompt("summarize").with_system("you are terse");
        let body = build_body(&ctx(), &request, false);
        assert_eq!(body["system"], "you are terse");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["max_tokens"], 4096);
    }

    #[test]
    fn test_thinking_drops_temperature() {
        let mut request = CallRequest::prompt("x").with_temperature(0.2);
        request.thinking = Some(ThinkingOptions {
            budget_tokens: 2000,
        });
        let body = build_body(&ctx(), &request, false);
        assert_eq!(body["thinking"]["budget_tokens"], 2000);
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_stream_text_and_thinking_deltas() {
        let text = StreamFrame::Data {
            event: Some("content_block_delta".to_string()),
            data: json!({"type": "content_block_delta", "index": 1,
                         "delta": {"type": "text_delta", "text": "Hel"}}),
        };
        let thinking = StreamFrame::Data {
            event: None,
            data: json!({"type": "content_block_delta", "index": 0,
                         "delta": {"type": "thinking_delta", "thinking": "hmm"}}),
        };
        assert!(matches!(stream_event(&text), StreamEvent::Delta(r) if r.text == "Hel"));
        assert!(
            matches!(stream_event(&thinking), StreamEvent::Delta(r) if r.thinking[0].text == "hmm")
        );
    }
}
