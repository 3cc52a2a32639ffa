//! OpenAI-compatible chat completion transport.
//!
//! Shared by every vendor exposing `/chat/completions` (OpenAI, OpenRouter, Groq,
//! DeepSeek, ...). Reasoning-capable models reject classic sampling parameters, so the
//! body switches to an effort level, `max_completion_tokens` and an optional thinking
//! budget for them.

use crate::llm::normalizer::normalize_openai_compatible;
use crate::llm::streaming::StreamFrame;
use crate::llm::types::{CallRequest, CallResult, ReasoningEffort, ResponseFormat};
use crate::llm::transport::{StreamEvent, TransportContext};
use serde_json::{Value, json};

pub const CHAT_COMPLETIONS_PATH: &str = "chat/completions";

pub fn build_body(ctx: &TransportContext, request: &CallRequest, stream: bool) -> Value {
    let messages: Vec<Value> = request
        .messages
        .iter()
        .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
        .collect();

    let max_tokens = request.max_output_tokens.unwrap_or(ctx.max_output_tokens);

    let mut body = json!({
        "model": ctx.model,
        "messages": messages,
        "stream": stream,
    });

    if ctx.reasoning {
        let effort = request
            .reasoning
            .as_ref()
            .map(|r| r.effort)
            .unwrap_or(ReasoningEffort::Medium);
        body["reasoning_effort"] = json!(effort.as_str());
        body["max_completion_tokens"] = json!(max_tokens);
        if let Some(thinking) = &request.thinking {
            body["thinking"] = json!({
                "type": "enabled",
                "budget_tokens": thinking.budget_tokens,
            });
        }
    } else {
        body["max_tokens"] = json!(max_tokens);
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
    }

    if request.response_format == ResponseFormat::Json {
        body["response_format"] = json!({ "type": "json_object" });
    }

    body
}

pub fn headers(ctx: &TransportContext) -> Vec<(&'static str, String)> {
    let mut headers = vec![("Content-Type", "application/json".to_string())];
    if let Some(key) = &ctx.api_key {
        headers.push(("Authorization", format!("Bearer {}", key)));
    }
    if ctx.provider_id == "openrouter" {
        headers.push(("X-Title", "scriptorium".to_string()));
    }
    headers
}

pub fn normalize(response: &Value) -> CallResult {
    normalize_openai_compatible(response)
}

pub fn stream_event(frame: &StreamFrame) -> StreamEvent {
    match frame {
        StreamFrame::Done => StreamEvent::Done,
        StreamFrame::Data { data, .. } => {
            if let Some(message) = data["error"]["message"].as_str() {
                return StreamEvent::Error(message.to_string());
            }
            StreamEvent::Delta(normalize_openai_compatible(data))
        }
    }
}
