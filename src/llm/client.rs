//! Provider client: one normalized request in, one normalized result out.
//!
//! The client owns its [`ProviderConfig`]; callers replace it through
//! [`ProviderClient::update_config`]. Every read goes through
//! [`ProviderClient::effective_config`], which repairs blank fields (model falls back to
//! the registry default, API key falls back to the provider's environment variable)
//! before any network I/O happens.

use crate::llm::provider::LLMProvider;
use crate::llm::registry::ProviderRegistry;
use crate::llm::transport::{self, Transport, TransportContext};
use crate::llm::types::{
    CallRequest, CallResult, DEFAULT_MAX_OUTPUT_TOKENS, LLMError, StreamCallback,
};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Provider selection and limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub provider_id: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Overrides the registry base URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub max_output_tokens: u32,
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_id: "openai".to_string(),
            model: String::new(),
            api_key: None,
            base_url: None,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            request_timeout_secs: 300,
        }
    }
}

/// Configuration after repair, ready for a call
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub provider_id: String,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: String,
    pub max_output_tokens: u32,
    pub requires_api_key: bool,
    pub reasoning: bool,
    pub transport: Transport,
}

pub struct ProviderClient {
    http: reqwest::Client,
    registry: ProviderRegistry,
    config: RwLock<ProviderConfig>,
}

impl ProviderClient {
    pub fn new(config: ProviderConfig, registry: ProviderRegistry) -> Result<Self, LLMError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| LLMError::Network(e.to_string()))?;
        Ok(Self {
            http,
            registry,
            config: RwLock::new(config),
        })
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Replace the configuration; expected before a batch of requests, not mid-flight
    pub async fn update_config(&self, config: ProviderConfig) {
        info!(provider = %config.provider_id, model = %config.model, "provider configuration updated");
        *self.config.write().await = config;
    }

    pub async fn config(&self) -> ProviderConfig {
        self.config.read().await.clone()
    }

    /// Read the configuration and repair blank fields
    pub async fn effective_config(&self) -> Result<EffectiveConfig, LLMError> {
        let config = self.config().await;
        resolve_config(&config, &self.registry)
    }

    /// Model ids the registry knows for the configured provider
    pub async fn list_models(&self) -> Result<Vec<String>, LLMError> {
        let provider_id = self.config.read().await.provider_id.clone();
        let descriptor = self.registry.require(&provider_id)?;
        Ok(descriptor.models.into_iter().map(|m| m.id).collect())
    }

    async fn execute(
        &self,
        request: CallRequest,
        on_update: Option<StreamCallback>,
    ) -> Result<CallResult, LLMError> {
        if request.is_cancelled() {
            return Err(LLMError::Cancelled);
        }

        let effective = self.effective_config().await?;
        if effective.requires_api_key && effective.api_key.is_none() {
            return Err(LLMError::MissingApiKey {
                provider: effective.provider_id,
            });
        }

        let url = transport::endpoint(&effective.base_url, effective.transport.path())?;
        let ctx = TransportContext {
            provider_id: effective.provider_id.clone(),
            model: effective.model.clone(),
            api_key: effective.api_key.clone(),
            max_output_tokens: effective.max_output_tokens,
            reasoning: effective.reasoning,
        };

        let started = Instant::now();
        debug!(
            request_id = %request.id,
            provider = %ctx.provider_id,
            model = %ctx.model,
            streaming = on_update.is_some(),
            "provider call started"
        );

        let call = async {
            match on_update {
                Some(callback) => {
                    transport::send_streaming(
                        &self.http,
                        effective.transport,
                        url,
                        &ctx,
                        &request,
                        callback,
                    )
                    .await
                }
                None => transport::send(&self.http, effective.transport, url, &ctx, &request).await,
            }
        };

        let result = match request.signal.clone() {
            Some(signal) => {
                tokio::select! {
                    _ = signal.cancelled() => Err(LLMError::Cancelled),
                    result = call => result,
                }
            }
            None => call.await,
        };

        match &result {
            Ok(r) => debug!(
                request_id = %request.id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                text_len = r.text.len(),
                thinking_segments = r.thinking.len(),
                "provider call finished"
            ),
            Err(LLMError::Cancelled) => debug!(request_id = %request.id, "provider call aborted"),
            Err(e) => warn!(request_id = %request.id, error = %e, "provider call failed"),
        }

        let result = result?;
        if result.text.trim().is_empty() {
            if !result.thinking.is_empty() {
                warn!(request_id = %request.id, "reply carried reasoning but no answer text");
            }
            return Err(LLMError::EmptyResponse(ctx.provider_id));
        }
        Ok(result)
    }
}

/// Repair a configuration against the registry
pub fn resolve_config(
    config: &ProviderConfig,
    registry: &ProviderRegistry,
) -> Result<EffectiveConfig, LLMError> {
    let descriptor = registry.require(&config.provider_id)?;
    let model = registry.resolve_model(&config.provider_id, &config.model)?;
    let capabilities = registry.capabilities(&config.provider_id, &model)?;

    let api_key = config
        .api_key
        .as_ref()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .or_else(|| {
            descriptor
                .api_key_env
                .as_ref()
                .and_then(|var| std::env::var(var).ok())
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
        });

    let base_url = config
        .base_url
        .clone()
        .filter(|u| !u.trim().is_empty())
        .unwrap_or(descriptor.base_url);

    let max_output_tokens = if config.max_output_tokens == 0 {
        DEFAULT_MAX_OUTPUT_TOKENS
    } else {
        config.max_output_tokens
    };

    Ok(EffectiveConfig {
        provider_id: descriptor.id,
        model,
        api_key,
        base_url,
        max_output_tokens,
        requires_api_key: capabilities.requires_api_key,
        reasoning: capabilities.reasoning,
        transport: descriptor.protocol.into(),
    })
}

impl LLMProvider for ProviderClient {
    fn complete(
        &self,
        request: CallRequest,
        on_update: Option<StreamCallback>,
    ) -> BoxFuture<'_, Result<CallResult, LLMError>> {
        Box::pin(self.execute(request, on_update))
    }

    fn provider_name(&self) -> String {
        self.config
            .try_read()
            .map(|c| c.provider_id.clone())
            .unwrap_or_else(|_| "provider".to_string())
    }
}

/// Shared handle used by the pipelines
pub type SharedProvider = Arc<dyn LLMProvider>;
