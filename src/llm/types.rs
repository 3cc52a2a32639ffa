use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Default output budget when the configuration carries none
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 4096;

/// Chat role of a single message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
}

/// Effort level accepted by reasoning-capable models
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    #[default]
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
        }
    }
}

/// Reasoning controls for reasoning-capable models
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningOptions {
    pub effort: ReasoningEffort,
}

/// Extended thinking budget
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinkingOptions {
    pub budget_tokens: u32,
}

/// The single normalized request shape fed to every transport
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub id: Uuid,
    pub messages: Vec<ChatMessage>,
    pub max_output_tokens: Option<u32>,
    pub response_format: ResponseFormat,
    pub temperature: Option<f32>,
    pub reasoning: Option<ReasoningOptions>,
    pub thinking: Option<ThinkingOptions>,
    pub signal: Option<CancellationToken>,
}

impl Default for CallRequest {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            messages: Vec::new(),
            max_output_tokens: None,
            response_format: ResponseFormat::Text,
            temperature: None,
            reasoning: None,
            thinking: None,
            signal: None,
        }
    }
}

impl CallRequest {
    /// Single user-turn request
    pub fn prompt(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::user(prompt)],
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.messages.insert(0, ChatMessage::system(system));
        self
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = format;
        self
    }

    pub fn with_signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.as_ref().is_some_and(|s| s.is_cancelled())
    }

    /// System prompt, if any, joined when several are present
    pub fn system_prompt(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }

    /// Concatenated text of every message, used for token estimates
    pub fn total_text_len(&self) -> usize {
        self.messages.iter().map(|m| m.content.len()).sum()
    }
}

/// A unit of model-internal reasoning text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinkingSegment {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub label: String,
    pub text: String,
}

impl ThinkingSegment {
    pub fn new(kind: Option<&str>, label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: kind.map(str::to_string),
            label: label.into(),
            text: text.into(),
        }
    }
}

/// The single normalized response shape every adapter produces
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallResult {
    pub text: String,
    pub thinking: Vec<ThinkingSegment>,
}

impl CallResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            thinking: Vec::new(),
        }
    }

    /// Drop thinking segments that repeat an earlier `(type, trimmed text)` pair
    pub fn dedup_thinking(mut self) -> Self {
        let mut seen = std::collections::HashSet::new();
        self.thinking.retain(|segment| {
            let trimmed = segment.text.trim();
            !trimmed.is_empty() && seen.insert((segment.kind.clone(), trimmed.to_string()))
        });
        self
    }
}

/// Invoked after every streamed frame with the result accumulated so far
pub type StreamCallback = Arc<dyn Fn(&CallResult) + Send + Sync>;

/// Capability flags consumed by the client and callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCapabilities {
    pub requires_api_key: bool,
    pub reasoning: bool,
    pub supports_streaming: bool,
}

/// Provider-layer errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum LLMError {
    #[error("API key required for provider '{provider}'")]
    MissingApiKey { provider: String },
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
    #[error("No model selected for provider '{0}'")]
    NoModelSelected(String),
    #[error("{provider} API error {status}: {body}")]
    Http {
        provider: String,
        status: u16,
        body: String,
    },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Malformed {provider} response: {detail}")]
    MalformedResponse { provider: String, detail: String },
    #[error("Provider '{0}' returned no text")]
    EmptyResponse(String),
    #[error("Aborted by user")]
    Cancelled,
}

impl LLMError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LLMError::Cancelled)
    }
}
