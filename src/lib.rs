//! # Scriptorium
//!
//! Long-document processing on top of any chat-completion provider: summaries, style
//! guides and math-notation cleanup for texts far larger than a single model call can
//! take.
//!
//! ## Architecture Overview
//!
//! - **[`llm`]**: Provider client speaking the OpenAI-compatible, Anthropic and
//!   local-inference wire protocols, with response normalization, streaming and a
//!   provider registry
//! - **[`pipeline`]**: Chunking, concurrency-bounded map, leveled reduce, progress and
//!   cancellation, plus the summarizer, style extractor and math formatter built on them
//! - **[`integration`]**: [`ContentSuite`], which wires both layers from one configuration
//! - **[`cli`]**: Argument parsing and configuration discovery for the `scriptorium` binary
//!
//! ## Features
//!
//! ### 📄 Map-Reduce Pipeline
//! - **Fast Path**: Short inputs are answered by a single call
//! - **Flat and Hierarchical Chunking**: Overlapping windows, optionally grouped
//! - **Ordered Results**: Batch completion order never changes the output
//! - **Partial Failure Tolerance**: One failed chunk never sinks the document
//! - **Bounded Fan-In**: Reduction merges at most five results per call
//!
//! ### 🤖 Provider Abstraction
//! - **Multi-Provider Support**: OpenAI, OpenRouter, Groq, DeepSeek, Anthropic, Ollama
//! - **Reasoning Models**: Effort and thinking-budget fields instead of sampling parameters
//! - **Streaming**: Incremental snapshots through a callback
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scriptorium::{ContentSuite, SuiteConfig};
//! use scriptorium::pipeline::{RunContext, SummaryFormat, SummaryOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let suite = ContentSuite::from_config(SuiteConfig::default())?;
//!     let options = SummaryOptions::new(SummaryFormat::ReverseEngineering);
//!     let result = suite
//!         .summarize("...a very long design document...", &options, &RunContext::default())
//!         .await?;
//!     println!("{}", result.final_summary);
//!     Ok(())
//! }
//! ```

/// Provider-agnostic LLM interface.
///
/// Wire protocols, response normalization, streaming and the provider registry.
pub mod llm;

/// Map-reduce document pipelines.
///
/// Chunking, batched map, leveled reduce, progress reporting and the three task
/// variants built on them.
pub mod pipeline;

/// High-level wiring of providers and pipelines.
pub mod integration;

/// Environment constants and path utilities.
pub mod env;

// CLI module for command-line interface
pub mod cli;

pub use cli::SuiteConfig;
pub use integration::ContentSuite;
pub use llm::{LLMError, LLMProvider, ProviderClient, ProviderConfig, ProviderRegistry};
pub use pipeline::{
    PipelineConfig, PipelineError, RunContext, SummaryFormat, SummaryOptions, SummaryResult,
};
