//! HTTP plumbing shared by the vendor transports.

use crate::llm::registry::WireProtocol;
use crate::llm::streaming::{FrameDecoder, StreamAccumulator, StreamFrame};
use crate::llm::types::{CallRequest, CallResult, LLMError, StreamCallback};
use crate::llm::normalizer::split_inline_thinking;
use crate::llm::{anthropic, local, openai_compat};
use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

/// Resolved per-call settings handed to a transport
#[derive(Debug, Clone)]
pub struct TransportContext {
    pub provider_id: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_output_tokens: u32,
    /// Whether the model takes reasoning controls instead of sampling fields
    pub reasoning: bool,
}

/// Outcome of interpreting one stream frame
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Delta(CallResult),
    Error(String),
    Ignore,
    Done,
}

/// Vendor-specific request/response strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    OpenAICompatible,
    Anthropic,
    LocalInference,
}

impl From<WireProtocol> for Transport {
    fn from(protocol: WireProtocol) -> Self {
        match protocol {
            WireProtocol::OpenAICompatible => Transport::OpenAICompatible,
            WireProtocol::Anthropic => Transport::Anthropic,
            WireProtocol::LocalInference => Transport::LocalInference,
        }
    }
}

impl Transport {
    pub fn path(&self) -> &'static str {
        match self {
            Transport::OpenAICompatible => openai_compat::CHAT_COMPLETIONS_PATH,
            Transport::Anthropic => anthropic::MESSAGES_PATH,
            Transport::LocalInference => local::GENERATE_PATH,
        }
    }

    pub fn build_body(&self, ctx: &TransportContext, request: &CallRequest, stream: bool) -> Value {
        match self {
            Transport::OpenAICompatible => openai_compat::build_body(ctx, request, stream),
            Transport::Anthropic => anthropic::build_body(ctx, request, stream),
            Transport::LocalInference => local::build_body(ctx, request, stream),
        }
    }

    pub fn headers(&self, ctx: &TransportContext) -> Vec<(&'static str, String)> {
        match self {
            Transport::OpenAICompatible => openai_compat::headers(ctx),
            Transport::Anthropic => anthropic::headers(ctx),
            Transport::LocalInference => local::headers(ctx),
        }
    }

    pub fn normalize(&self, response: &Value) -> CallResult {
        match self {
            Transport::OpenAICompatible => openai_compat::normalize(response),
            Transport::Anthropic => anthropic::normalize(response),
            Transport::LocalInference => local::normalize(response),
        }
    }

    /// Post-processing shared by buffered and streamed replies
    pub fn finish(&self, result: CallResult) -> CallResult {
        match self {
            Transport::LocalInference => split_inline_thinking(result),
            Transport::OpenAICompatible | Transport::Anthropic => result,
        }
    }

    pub fn stream_event(&self, frame: &StreamFrame) -> StreamEvent {
        match self {
            Transport::OpenAICompatible => openai_compat::stream_event(frame),
            Transport::Anthropic => anthropic::stream_event(frame),
            Transport::LocalInference => local::stream_event(frame),
        }
    }
}

/// Join a transport path onto a provider base URL
pub fn endpoint(base_url: &str, path: &str) -> Result<Url, LLMError> {
    let base = if base_url.ends_with('/') {
        base_url.to_string()
    } else {
        format!("{}/", base_url)
    };
    Url::parse(&base)
        .and_then(|url| url.join(path))
        .map_err(|e| LLMError::Network(format!("invalid endpoint '{}': {}", base_url, e)))
}

async fn post(
    http: &reqwest::Client,
    transport: Transport,
    url: Url,
    ctx: &TransportContext,
    body: &Value,
) -> Result<reqwest::Response, LLMError> {
    let mut builder = http.post(url.clone());
    for (name, value) in transport.headers(ctx) {
        builder = builder.header(name, value);
    }

    debug!(provider = %ctx.provider_id, model = %ctx.model, url = %url, "sending provider request");

    let response = builder
        .json(body)
        .send()
        .await
        .map_err(|e| LLMError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(LLMError::Http {
            provider: ctx.provider_id.clone(),
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Issue a non-streaming request and normalize the response
pub async fn send(
    http: &reqwest::Client,
    transport: Transport,
    url: Url,
    ctx: &TransportContext,
    request: &CallRequest,
) -> Result<CallResult, LLMError> {
    let body = transport.build_body(ctx, request, false);
    let response = post(http, transport, url, ctx, &body).await?;
    let value: Value = response
        .json()
        .await
        .map_err(|e| LLMError::MalformedResponse {
            provider: ctx.provider_id.clone(),
            detail: e.to_string(),
        })?;
    Ok(transport.finish(transport.normalize(&value)))
}

/// Issue a streaming request, invoking `on_update` after every frame
pub async fn send_streaming(
    http: &reqwest::Client,
    transport: Transport,
    url: Url,
    ctx: &TransportContext,
    request: &CallRequest,
    on_update: StreamCallback,
) -> Result<CallResult, LLMError> {
    let body = transport.build_body(ctx, request, true);
    let response = post(http, transport, url, ctx, &body).await?;

    let mut decoder = FrameDecoder::new();
    let mut accumulator = StreamAccumulator::new();
    let mut bytes = response.bytes_stream();

    while let Some(chunk) = bytes.next().await {
        let chunk = chunk.map_err(|e| LLMError::Network(e.to_string()))?;
        let frames = decoder.push(&chunk);
        if apply_frames(transport, ctx, &frames, &mut accumulator, &on_update)? {
            return Ok(finish_stream(transport, accumulator));
        }
    }
    let tail = decoder.finish();
    apply_frames(transport, ctx, &tail, &mut accumulator, &on_update)?;
    Ok(finish_stream(transport, accumulator))
}

/// Final result of a stream, shaped like the buffered reply would be
pub fn finish_stream(transport: Transport, accumulator: StreamAccumulator) -> CallResult {
    transport.finish(accumulator.finish())
}

/// Fold frames into the accumulator; returns `true` once the stream signals completion
pub fn apply_frames(
    transport: Transport,
    ctx: &TransportContext,
    frames: &[StreamFrame],
    accumulator: &mut StreamAccumulator,
    on_update: &StreamCallback,
) -> Result<bool, LLMError> {
    for frame in frames {
        match transport.stream_event(frame) {
            StreamEvent::Delta(delta) => {
                accumulator.merge(&delta);
                on_update(&transport.finish(accumulator.snapshot()));
            }
            StreamEvent::Error(message) => {
                return Err(LLMError::MalformedResponse {
                    provider: ctx.provider_id.clone(),
                    detail: message,
                });
            }
            StreamEvent::Ignore => trace!("ignored stream frame"),
            StreamEvent::Done => return Ok(true),
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_join() {
        assert_eq!(
            endpoint("https://api.openai.com/v1", "chat/completions")
                .unwrap()
                .as_str(),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            endpoint("http://localhost:11434/", "api/generate")
                .unwrap()
                .as_str(),
            "http://localhost:11434/api/generate"
        );
        assert!(endpoint("not a url", "x").is_err());
    }
}
