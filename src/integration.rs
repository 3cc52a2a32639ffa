//! # High-Level Integration
//!
//! [`ContentSuite`] wires the provider layer and the document pipelines together from a
//! single [`SuiteConfig`]:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    ContentSuite                      │
//! │  ┌────────────┐ ┌────────────────┐ ┌──────────────┐  │
//! │  │ Summarizer │ │ StyleExtractor │ │ MathFormatter│  │
//! │  └─────┬──────┘ └───────┬────────┘ └──────┬───────┘  │
//! │        └───────── MapReduceEngine ────────┘          │
//! │                         │                            │
//! │                  ProviderClient ── ProviderRegistry  │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use scriptorium::{ContentSuite, SuiteConfig};
//! use scriptorium::pipeline::{RunContext, SummaryOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let suite = ContentSuite::from_config(SuiteConfig::default())?;
//!     let text = std::fs::read_to_string("report.md")?;
//!     let result = suite
//!         .summarize(&text, &SummaryOptions::default(), &RunContext::default())
//!         .await?;
//!     println!("{}", result.final_summary);
//!     Ok(())
//! }
//! ```

use crate::cli::SuiteConfig;
use crate::llm::{ProviderClient, ProviderRegistry, SharedProvider};
use crate::pipeline::{
    DefaultPromptBuilder, DiagramGenerator, DiagramValidator, FormattedDocument,
    LlmHighlightExtractor, MapReduceEngine, MathFormatter, MermaidLint, PipelineConfig,
    PromptBuilder, RunContext, StyleExtractor, StyleResult, Summarizer, SummaryOptions,
    SummaryResult,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Summarization, style extraction and math formatting behind one handle
pub struct ContentSuite {
    client: Option<Arc<ProviderClient>>,
    provider: SharedProvider,
    summarizer: Summarizer,
    style: StyleExtractor,
    math: MathFormatter,
}

impl ContentSuite {
    /// Build a suite that talks to the configured provider over HTTP
    pub fn from_config(config: SuiteConfig) -> Result<Self> {
        let registry = ProviderRegistry::default();
        let client = Arc::new(
            ProviderClient::new(config.provider.clone(), registry)
                .context("Failed to initialize provider client")?,
        );
        info!(
            provider = %config.provider.provider_id,
            model = %config.provider.model,
            "Content suite initialized"
        );

        let provider: SharedProvider = client.clone();
        let mut suite = Self::with_provider(provider, config.pipeline, Arc::new(MermaidLint));
        suite.client = Some(client);
        Ok(suite)
    }

    /// Build a suite over any provider, e.g. a scripted one in tests
    pub fn with_provider(
        provider: SharedProvider,
        pipeline: PipelineConfig,
        validator: Arc<dyn DiagramValidator>,
    ) -> Self {
        let prompts: Arc<dyn PromptBuilder> = Arc::new(DefaultPromptBuilder);
        let engine = Arc::new(MapReduceEngine::new(
            Arc::clone(&provider),
            Arc::clone(&prompts),
            pipeline,
        ));

        Self {
            client: None,
            summarizer: Summarizer::new(
                Arc::clone(&engine),
                DiagramGenerator::new(Arc::clone(&provider), Arc::clone(&prompts), validator),
                Arc::new(LlmHighlightExtractor::new(Arc::clone(&provider), prompts)),
            ),
            style: StyleExtractor::new(Arc::clone(&engine)),
            math: MathFormatter::new(engine),
            provider,
        }
    }

    /// HTTP client, when the suite was built from configuration
    pub fn provider_client(&self) -> Option<&Arc<ProviderClient>> {
        self.client.as_ref()
    }

    pub fn provider(&self) -> &SharedProvider {
        &self.provider
    }

    pub async fn summarize(
        &self,
        text: &str,
        options: &SummaryOptions,
        ctx: &RunContext,
    ) -> Result<SummaryResult> {
        self.summarizer
            .summarize(text, options, ctx)
            .await
            .context("Summarization failed")
    }

    pub async fn extract_style(&self, text: &str, ctx: &RunContext) -> Result<StyleResult> {
        self.style
            .extract(text, None, ctx)
            .await
            .context("Style extraction failed")
    }

    pub async fn format_math(&self, text: &str, ctx: &RunContext) -> Result<FormattedDocument> {
        self.math
            .format(text, ctx)
            .await
            .context("Math formatting failed")
    }
}
