//! Local inference transport (Ollama `/api/generate`).
//!
//! The local server takes one concatenated prompt string rather than a message array,
//! and streams newline-delimited JSON objects.

use crate::llm::normalizer::normalize_local;
use crate::llm::streaming::StreamFrame;
use crate::llm::transport::{StreamEvent, TransportContext};
use crate::llm::types::{CallRequest, CallResult, ResponseFormat, Role};
use serde_json::{Value, json};

pub const GENERATE_PATH: &str = "api/generate";

/// Flatten the conversation into a single prompt
pub fn flatten_prompt(request: &CallRequest) -> String {
    let mut prompt = String::new();
    for message in &request.messages {
        let label = match message.role {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        prompt.push_str(label);
        prompt.push_str(": ");
        prompt.push_str(&message.content);
        prompt.push_str("\n\n");
    }
    prompt.push_str("Assistant:");
    prompt
}

pub fn build_body(ctx: &TransportContext, request: &CallRequest, stream: bool) -> Value {
    let mut options = json!({
        "num_predict": request.max_output_tokens.unwrap_or(ctx.max_output_tokens),
    });
    if let Some(temperature) = request.temperature {
        options["temperature"] = json!(temperature);
    }

    let mut body = json!({
        "model": ctx.model,
        "prompt": flatten_prompt(request),
        "stream": stream,
        "options": options,
    });
    if request.response_format == ResponseFormat::Json {
        body["format"] = json!("json");
    }
    body
}

pub fn headers(_ctx: &TransportContext) -> Vec<(&'static str, String)> {
    vec![("Content-Type", "application/json".to_string())]
}

/// Inline `<think>` blocks are split out by [`Transport::finish`](crate::llm::transport::Transport::finish)
pub fn normalize(response: &Value) -> CallResult {
    normalize_local(response)
}

pub fn stream_event(frame: &StreamFrame) -> StreamEvent {
    match frame {
        StreamFrame::Done => StreamEvent::Done,
        StreamFrame::Data { data, .. } => {
            if let Some(error) = data["error"].as_str() {
                return StreamEvent::Error(error.to_string());
            }
            let delta = normalize_local(data);
            if data["done"].as_bool().unwrap_or(false) && delta.text.is_empty() {
                StreamEvent::Done
            } else {
                StreamEvent::Delta(delta)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_prompt() {
        let request = CallRequest::prompt("Summarize this").with_system("Be concise");
        assert_eq!(
            flatten_prompt(&request),
            "System: Be concise\n\nUser: Summarize this\n\nAssistant:"
        );
    }

    #[test]
    fn test_body_shape() {
        let ctx = TransportContext {
            provider_id: "ollama".to_string(),
            model: "llama3.1".to_string(),
            api_key: None,
            max_output_tokens: 1000,
            reasoning: false,
        };
        let request = CallRequest::prompt("x").with_response_format(ResponseFormat::Json);
        let body = build_body(&ctx, &request, false);
        assert_eq!(body["model"], "llama3.1");
        assert_eq!(body["stream"], false);
        assert_eq!(body["format"], "json");
        assert_eq!(body["options"]["num_predict"], 1000);
        assert!(body.get("messages").is_none());
    }
}
