//! Writing style extraction.

use crate::pipeline::engine::{MapReduceEngine, PhasePlan, RunContext};
use crate::pipeline::prompts::TaskFormat;
use crate::pipeline::progress::{ProgressStage, ProgressUpdate};
use crate::pipeline::types::{ChunkingMode, PipelineError, StyleResult};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

/// Produces a style guide describing how a document is written
pub struct StyleExtractor {
    engine: Arc<MapReduceEngine>,
}

impl StyleExtractor {
    pub fn new(engine: Arc<MapReduceEngine>) -> Self {
        Self { engine }
    }

    pub async fn extract(
        &self,
        text: &str,
        mode: Option<ChunkingMode>,
        ctx: &RunContext,
    ) -> Result<StyleResult, PipelineError> {
        let output = self
            .engine
            .run(TaskFormat::Style, text, mode, PhasePlan::STYLE, ctx)
            .await?;

        ctx.ensure_active()?;
        let mut stats = output.stats;
        stats.completed_at = Utc::now();
        ctx.report(ProgressUpdate::new(
            ProgressStage::Completed,
            100.0,
            "Style analysis complete",
        ));
        info!(mode = ?stats.mode, calls = stats.provider_calls, "Style extraction finished");

        Ok(StyleResult {
            style_guide: output.text,
            stats,
        })
    }
}
