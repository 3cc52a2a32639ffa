//! Key highlight extraction from a finished summary.

use crate::llm::{CallRequest, ResponseFormat, SharedProvider};
use crate::pipeline::diagram::extract_code_block;
use crate::pipeline::prompts::PromptBuilder;
use crate::pipeline::types::{Highlight, PipelineError};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const MAX_HIGHLIGHTS: usize = 5;

#[async_trait]
pub trait HighlightExtractor: Send + Sync {
    /// Only cancellation is an error; any other failure degrades to fewer highlights
    async fn extract(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Highlight>, PipelineError>;
}

/// Extractor that never produces highlights
#[derive(Debug, Clone, Default)]
pub struct NoHighlights;

#[async_trait]
impl HighlightExtractor for NoHighlights {
    async fn extract(
        &self,
        _text: &str,
        _cancel: &CancellationToken,
    ) -> Result<Vec<Highlight>, PipelineError> {
        Ok(Vec::new())
    }
}

/// Asks the provider for a JSON list, falling back to bullet scraping
pub struct LlmHighlightExtractor {
    provider: SharedProvider,
    prompts: Arc<dyn PromptBuilder>,
    max: usize,
}

impl LlmHighlightExtractor {
    pub fn new(provider: SharedProvider, prompts: Arc<dyn PromptBuilder>) -> Self {
        Self {
            provider,
            prompts,
            max: MAX_HIGHLIGHTS,
        }
    }

    pub fn with_max(mut self, max: usize) -> Self {
        self.max = max;
        self
    }
}

#[async_trait]
impl HighlightExtractor for LlmHighlightExtractor {
    async fn extract(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Highlight>, PipelineError> {
        let request = CallRequest::prompt(self.prompts.highlights(text, self.max))
            .with_response_format(ResponseFormat::Json)
            .with_signal(cancel.clone());

        match self.provider.complete(request, None).await {
            Ok(result) => match parse_highlights(&result.text, self.max) {
                Some(highlights) => Ok(highlights),
                None => {
                    debug!("Highlight reply was not JSON, scraping the summary instead");
                    Ok(heuristic_highlights(text, self.max))
                }
            },
            Err(e) if e.is_cancelled() => Err(PipelineError::Cancelled),
            Err(e) => {
                warn!(error = %e, "Highlight extraction failed, scraping the summary instead");
                Ok(heuristic_highlights(text, self.max))
            }
        }
    }
}

fn highlight_from(value: &Value) -> Option<Highlight> {
    let text = match value {
        Value::String(s) => s.as_str(),
        Value::Object(map) => ["text", "highlight", "title", "content"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str))?,
        _ => return None,
    };
    let text = text.trim();
    (!text.is_empty()).then(|| Highlight {
        text: text.to_string(),
    })
}

/// Parse `[{"text": ..}]`, `["..."]` or `{"highlights": [..]}`; `None` if not JSON
pub fn parse_highlights(raw: &str, max: usize) -> Option<Vec<Highlight>> {
    let body = extract_code_block(raw);
    let value: Value = serde_json::from_str(&body).ok()?;
    let items = match &value {
        Value::Array(items) => items,
        Value::Object(map) => map
            .get("highlights")
            .or_else(|| map.get("items"))
            .and_then(Value::as_array)?,
        _ => return None,
    };
    Some(items.iter().filter_map(highlight_from).take(max).collect())
}

fn strip_bullet(line: &str) -> Option<&str> {
    let line = line.trim_start();
    for marker in ["- ", "* ", "• "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return Some(rest);
        }
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        return rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") "));
    }
    None
}

/// Bullet lines of `text`, or its first non-empty lines when it has none
pub fn heuristic_highlights(text: &str, max: usize) -> Vec<Highlight> {
    let clean = |s: &str| s.trim().trim_matches('*').trim().to_string();

    let bullets: Vec<Highlight> = text
        .lines()
        .filter_map(strip_bullet)
        .map(clean)
        .filter(|s| !s.is_empty())
        .take(max)
        .map(|text| Highlight { text })
        .collect();
    if !bullets.is_empty() {
        return bullets;
    }

    text.lines()
        .map(|l| clean(l.trim_start_matches('#')))
        .filter(|s| !s.is_empty())
        .take(max)
        .map(|text| Highlight { text })
        .collect()
}
