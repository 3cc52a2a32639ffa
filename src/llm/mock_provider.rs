//! Scripted in-process provider used by tests and offline runs.

use crate::llm::provider::LLMProvider;
use crate::llm::types::{CallRequest, CallResult, LLMError, StreamCallback};
use futures::future::BoxFuture;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Responder = dyn Fn(&CallRequest) -> Result<String, LLMError> + Send + Sync;

/// Provider whose answers come from a closure
pub struct MockProvider {
    responder: Box<Responder>,
    latency: Option<(u64, u64)>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockProvider {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&CallRequest) -> Result<String, LLMError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            latency: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with the same text
    pub fn fixed(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(move |_| Ok(text.clone()))
    }

    /// Sleep a random duration in `[min_ms, max_ms]` before answering
    pub fn with_random_latency(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.latency = Some((min_ms, max_ms.max(min_ms)));
        self
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed running at once
    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Last user message of every call, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

/// Last user-authored message of a request
pub fn last_user_message(request: &CallRequest) -> String {
    request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == crate::llm::types::Role::User)
        .map(|m| m.content.clone())
        .unwrap_or_default()
}

impl LLMProvider for MockProvider {
    fn complete(
        &self,
        request: CallRequest,
        on_update: Option<StreamCallback>,
    ) -> BoxFuture<'_, Result<CallResult, LLMError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut prompts) = self.prompts.lock() {
                prompts.push(last_user_message(&request));
            }
            if request.is_cancelled() {
                return Err(LLMError::Cancelled);
            }

            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

            if let Some((min, max)) = self.latency {
                let delay = rand::rng().random_range(min..=max);
                let sleep = tokio::time::sleep(Duration::from_millis(delay));
                match request.signal.clone() {
                    Some(signal) => {
                        tokio::select! {
                            _ = signal.cancelled() => {
                                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                                return Err(LLMError::Cancelled);
                            }
                            _ = sleep => {}
                        }
                    }
                    None => sleep.await,
                }
            }

            let outcome = (self.responder)(&request);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            let text = outcome?;

            if let Some(callback) = on_update {
                let mut partial = String::new();
                for piece in text.split_inclusive(' ') {
                    partial.push_str(piece);
                    callback(&CallResult::text(partial.clone()));
                }
            }
            Ok(CallResult::text(text))
        })
    }

    fn provider_name(&self) -> String {
        "mock".to_string()
    }
}
