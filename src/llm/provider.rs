use crate::llm::types::{CallRequest, CallResult, LLMError, StreamCallback};
use futures::future::BoxFuture;

/// Generic LLM provider seam consumed by the pipelines
pub trait LLMProvider: Send + Sync {
    /// Execute a single normalized request
    ///
    /// # Arguments
    /// * `request` - The normalized request; its `signal` aborts the call when fired
    /// * `on_update` - When present, the provider streams and invokes the callback after
    ///   every frame with the result accumulated so far
    ///
    /// The returned value always equals the fully accumulated result, so the streaming
    /// and non-streaming paths converge on the same data.
    fn complete(
        &self,
        request: CallRequest,
        on_update: Option<StreamCallback>,
    ) -> BoxFuture<'_, Result<CallResult, LLMError>>;

    /// Get provider name/identifier
    fn provider_name(&self) -> String;

    /// Estimate token count for text
    fn estimate_tokens(&self, text: &str) -> u64 {
        (text.len() as f64 / 4.0).ceil() as u64
    }

    /// Test provider connectivity
    fn health_check(&self) -> BoxFuture<'_, Result<(), LLMError>> {
        Box::pin(async move {
            let result = self.complete(CallRequest::prompt("ping"), None).await?;
            if result.text.trim().is_empty() {
                Err(LLMError::EmptyResponse(self.provider_name()))
            } else {
                Ok(())
            }
        })
    }
}
