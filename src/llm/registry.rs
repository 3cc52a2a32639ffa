//! Catalog of known providers and their models.
//!
//! The registry is consulted by the [`ProviderClient`](crate::llm::ProviderClient) to
//! resolve default models, API key requirements and reasoning capability. It does not
//! take part in the data flow of a single request.
//!
//! Built-in entries cover the OpenAI-compatible family (`openai`, `openrouter`, `groq`,
//! `deepseek`), the Anthropic messages API and a local Ollama server. Further providers
//! can be registered at runtime, and the local server's model list can be refreshed
//! from its `/api/tags` endpoint.

use crate::llm::types::{LLMError, ModelCapabilities};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Wire protocol spoken by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireProtocol {
    OpenAICompatible,
    Anthropic,
    LocalInference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub label: String,
    pub reasoning: bool,
}

impl ModelDescriptor {
    pub fn new(id: &str, label: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            reasoning: is_reasoning_model(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub id: String,
    pub label: String,
    pub protocol: WireProtocol,
    pub base_url: String,
    pub requires_api_key: bool,
    /// Environment variable consulted when the configured key is blank
    pub api_key_env: Option<String>,
    pub default_model: String,
    pub models: Vec<ModelDescriptor>,
}

/// Static and dynamic provider catalog
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    providers: Arc<DashMap<String, ProviderDescriptor>>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_builtin_providers()
    }
}

impl ProviderRegistry {
    /// Registry without any entries
    pub fn empty() -> Self {
        Self {
            providers: Arc::new(DashMap::new()),
        }
    }

    pub fn with_builtin_providers() -> Self {
        let registry = Self::empty();
        for descriptor in builtin_providers() {
            registry.register(descriptor);
        }
        registry
    }

    /// Add or replace a provider
    pub fn register(&self, descriptor: ProviderDescriptor) {
        debug!(provider = %descriptor.id, "registering provider");
        self.providers.insert(descriptor.id.clone(), descriptor);
    }

    pub fn get(&self, provider_id: &str) -> Option<ProviderDescriptor> {
        self.providers.get(provider_id).map(|entry| entry.clone())
    }

    pub fn require(&self, provider_id: &str) -> Result<ProviderDescriptor, LLMError> {
        self.get(provider_id)
            .ok_or_else(|| LLMError::UnknownProvider(provider_id.to_string()))
    }

    /// Provider ids, sorted
    pub fn provider_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn list(&self) -> Vec<ProviderDescriptor> {
        self.provider_ids()
            .iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    pub fn default_model(&self, provider_id: &str) -> Option<String> {
        self.get(provider_id).map(|p| p.default_model)
    }

    /// Resolve the model to use, falling back to the provider default when blank
    pub fn resolve_model(&self, provider_id: &str, model: &str) -> Result<String, LLMError> {
        if !model.trim().is_empty() {
            return Ok(model.trim().to_string());
        }
        let descriptor = self.require(provider_id)?;
        if descriptor.default_model.trim().is_empty() {
            return Err(LLMError::NoModelSelected(provider_id.to_string()));
        }
        Ok(descriptor.default_model)
    }

    pub fn capabilities(
        &self,
        provider_id: &str,
        model: &str,
    ) -> Result<ModelCapabilities, LLMError> {
        let descriptor = self.require(provider_id)?;
        let reasoning = descriptor
            .models
            .iter()
            .find(|m| m.id == model)
            .map(|m| m.reasoning)
            .unwrap_or_else(|| is_reasoning_model(model));
        Ok(ModelCapabilities {
            requires_api_key: descriptor.requires_api_key,
            reasoning,
            supports_streaming: true,
        })
    }

    /// Replace the model list of every local-inference provider with what the server reports
    pub async fn refresh_local_models(&self, http: &reqwest::Client) -> Result<usize, LLMError> {
        let local: Vec<ProviderDescriptor> = self
            .list()
            .into_iter()
            .filter(|p| p.protocol == WireProtocol::LocalInference)
            .collect();

        let mut discovered = 0;
        for descriptor in local {
            let url = format!("{}/api/tags", descriptor.base_url.trim_end_matches('/'));
            let response = http
                .get(&url)
                .send()
                .await
                .map_err(|e| LLMError::Network(e.to_string()))?;
            let status = response.status().as_u16();
            if !response.status().is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(LLMError::Http {
                    provider: descriptor.id.clone(),
                    status,
                    body,
                });
            }
            let body: serde_json::Value = response
                .json()
                .await
                .map_err(|e| LLMError::MalformedResponse {
                    provider: descriptor.id.clone(),
                    detail: e.to_string(),
                })?;

            let models = parse_local_model_tags(&body);
            discovered += models.len();
            info!(provider = %descriptor.id, count = models.len(), "refreshed local models");

            if let Some(mut entry) = self.providers.get_mut(&descriptor.id) {
                if !models.is_empty() && !models.iter().any(|m| m.id == entry.default_model) {
                    entry.default_model = models[0].id.clone();
                }
                entry.models = models;
            }
        }
        Ok(discovered)
    }
}

/// Model ids listed by a local-inference `/api/tags` response
pub fn parse_local_model_tags(body: &serde_json::Value) -> Vec<ModelDescriptor> {
    body["models"]
        .as_array()
        .map(|models| {
            models
                .iter()
                .filter_map(|m| m["name"].as_str().or_else(|| m["model"].as_str()))
                .map(|name| ModelDescriptor::new(name, name))
                .collect()
        })
        .unwrap_or_default()
}

/// Heuristic detection of models that take an effort level instead of sampling controls
pub fn is_reasoning_model(model_id: &str) -> bool {
    let id = model_id.to_lowercase();
    let name = id.rsplit('/').next().unwrap_or(&id);

    const PREFIXES: &[&str] = &["o1", "o3", "o4", "gpt-5"];
    const KEYWORDS: &[&str] = &["reason", "thinking", "-r1", "deepseek-r1", "qwq"];

    PREFIXES.iter().any(|p| name.starts_with(p)) || KEYWORDS.iter().any(|k| id.contains(k))
}

fn openai_compatible(
    id: &str,
    label: &str,
    base_url: &str,
    api_key_env: &str,
    default_model: &str,
    models: &[(&str, &str)],
) -> ProviderDescriptor {
    ProviderDescriptor {
        id: id.to_string(),
        label: label.to_string(),
        protocol: WireProtocol::OpenAICompatible,
        base_url: base_url.to_string(),
        requires_api_key: true,
        api_key_env: Some(api_key_env.to_string()),
        default_model: default_model.to_string(),
        models: models
            .iter()
            .map(|(id, label)| ModelDescriptor::new(id, label))
            .collect(),
    }
}

fn builtin_providers() -> Vec<ProviderDescriptor> {
    vec![
        openai_compatible(
            "openai",
            "OpenAI",
            "https://api.openai.com/v1",
            "OPENAI_API_KEY",
            "gpt-4.1-mini",
            &[
                ("gpt-4.1", "GPT-4.1"),
                ("gpt-4.1-mini", "GPT-4.1 mini"),
                ("o4-mini", "o4-mini"),
                ("o3", "o3"),
            ],
        ),
        openai_compatible(
            "openrouter",
            "OpenRouter",
            "https://openrouter.ai/api/v1",
            "OPENROUTER_API_KEY",
            "openai/gpt-4.1-mini",
            &[
                ("openai/gpt-4.1-mini", "GPT-4.1 mini"),
                ("deepseek/deepseek-r1", "DeepSeek R1"),
                ("anthropic/claude-sonnet-4", "Claude Sonnet 4"),
            ],
        ),
        openai_compatible(
            "groq",
            "Groq",
            "https://api.groq.com/openai/v1",
            "GROQ_API_KEY",
            "llama-3.3-70b-versatile",
            &[
                ("llama-3.3-70b-versatile", "Llama 3.3 70B"),
                ("qwen/qwen3-32b", "Qwen3 32B"),
            ],
        ),
        openai_compatible(
            "deepseek",
            "DeepSeek",
            "https://api.deepseek.com/v1",
            "DEEPSEEK_API_KEY",
            "deepseek-chat",
            &[
                ("deepseek-chat", "DeepSeek Chat"),
                ("deepseek-reasoner", "DeepSeek Reasoner"),
            ],
        ),
        ProviderDescriptor {
            id: "anthropic".to_string(),
            label: "Anthropic".to_string(),
            protocol: WireProtocol::Anthropic,
            base_url: "https://api.anthropic.com".to_string(),
            requires_api_key: true,
            api_key_env: Some("ANTHROPIC_API_KEY".to_string()),
            default_model: "claude-sonnet-4-20250514".to_string(),
            models: vec![
                ModelDescriptor::new("claude-sonnet-4-20250514", "Claude Sonnet 4"),
                ModelDescriptor::new("claude-opus-4-20250514", "Claude Opus 4"),
                ModelDescriptor::new("claude-3-5-haiku-latest", "Claude Haiku 3.5"),
            ],
        },
        ProviderDescriptor {
            id: "ollama".to_string(),
            label: "Ollama (local)".to_string(),
            protocol: WireProtocol::LocalInference,
            base_url: "http://localhost:11434".to_string(),
            requires_api_key: false,
            api_key_env: None,
            default_model: "llama3.1".to_string(),
            models: vec![ModelDescriptor::new("llama3.1", "Llama 3.1")],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_providers_present() {
        let registry = ProviderRegistry::default();
        let ids = registry.provider_ids();
        for id in ["anthropic", "deepseek", "groq", "ollama", "openai", "openrouter"] {
            assert!(ids.contains(&id.to_string()), "missing {id}");
        }
    }

    #[test]
    fn test_resolve_model_repairs_blank() {
        let registry = ProviderRegistry::default();
        assert_eq!(
            registry.resolve_model("openai", "  ").unwrap(),
            "gpt-4.1-mini"
        );
        assert_eq!(registry.resolve_model("openai", "o3").unwrap(), "o3");
        assert!(matches!(
            registry.resolve_model("nope", ""),
            Err(LLMError::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_reasoning_heuristics() {
        assert!(is_reasoning_model("o4-mini"));
        assert!(is_reasoning_model("o1-preview"));
        assert!(is_reasoning_model("gpt-5"));
        assert!(is_reasoning_model("deepseek/deepseek-r1"));
        assert!(is_reasoning_model("deepseek-reasoner"));
        assert!(is_reasoning_model("claude-3-7-sonnet-thinking"));
        assert!(!is_reasoning_model("gpt-4.1-mini"));
        assert!(!is_reasoning_model("llama-3.3-70b-versatile"));
        assert!(!is_reasoning_model("openai/gpt-4o"));
    }

    #[test]
    fn test_capabilities() {
        let registry = ProviderRegistry::default();
        let caps = registry.capabilities("ollama", "llama3.1").unwrap();
        assert!(!caps.requires_api_key);
        assert!(!caps.reasoning);

        let caps = registry.capabilities("openai", "o4-mini").unwrap();
        assert!(caps.requires_api_key);
        assert!(caps.reasoning);
    }

    #[test]
    fn test_register_replaces_entry() {
        let registry = ProviderRegistry::default();
        let mut custom = registry.get("openai").unwrap();
        custom.id = "proxy".to_string();
        custom.base_url = "http://proxy.local/v1".to_string();
        registry.register(custom);
        assert_eq!(
            registry.get("proxy").unwrap().base_url,
            "http://proxy.local/v1"
        );
    }

    #[test]
    fn test_parse_local_model_tags() {
        let body = json!({
            "models": [
                {"name": "qwen2.5:7b", "size": 1},
                {"model": "phi4"},
                {"size": 3}
            ]
        });
        let models = parse_local_model_tags(&body);
        let ids: Vec<&str> = models.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["qwen2.5:7b", "phi4"]);
        assert!(parse_local_model_tags(&json!({})).is_empty());
    }
}
