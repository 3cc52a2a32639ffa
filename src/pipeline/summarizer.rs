//! Document summarization: map-reduce, then optional diagram and highlights.

use crate::pipeline::diagram::DiagramGenerator;
use crate::pipeline::engine::{MapReduceEngine, PhasePlan, RunContext};
use crate::pipeline::highlights::HighlightExtractor;
use crate::pipeline::prompts::{SummaryFormat, TaskFormat};
use crate::pipeline::progress::{ProgressStage, ProgressUpdate};
use crate::pipeline::types::{ChunkingMode, PipelineError, SummaryResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

const DIAGRAM_PROGRESS: f32 = 85.0;
const HIGHLIGHT_PROGRESS: f32 = 92.0;

/// Per-request summarization switches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryOptions {
    pub format: SummaryFormat,
    /// Overrides the configured chunking mode
    pub mode: Option<ChunkingMode>,
    pub diagram: bool,
    pub highlights: bool,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            format: SummaryFormat::Technical,
            mode: None,
            diagram: true,
            highlights: true,
        }
    }
}

impl SummaryOptions {
    pub fn new(format: SummaryFormat) -> Self {
        Self {
            format,
            ..Default::default()
        }
    }

    fn wants_diagram(&self) -> bool {
        self.diagram && self.format.requires_diagram()
    }
}

pub struct Summarizer {
    engine: Arc<MapReduceEngine>,
    diagrams: DiagramGenerator,
    highlights: Arc<dyn HighlightExtractor>,
}

impl Summarizer {
    pub fn new(
        engine: Arc<MapReduceEngine>,
        diagrams: DiagramGenerator,
        highlights: Arc<dyn HighlightExtractor>,
    ) -> Self {
        Self {
            engine,
            diagrams,
            highlights,
        }
    }

    pub async fn summarize(
        &self,
        text: &str,
        options: &SummaryOptions,
        ctx: &RunContext,
    ) -> Result<SummaryResult, PipelineError> {
        let started = Instant::now();
        info!(format = ?options.format, chars = text.chars().count(), "Summarization started");

        let output = self
            .engine
            .run(
                TaskFormat::Summary(options.format),
                text,
                options.mode,
                PhasePlan::SUMMARY,
                ctx,
            )
            .await?;
        let final_summary = output.text;
        let mut stats = output.stats;

        let diagram = if options.wants_diagram() {
            ctx.ensure_active()?;
            ctx.report(ProgressUpdate::new(
                ProgressStage::DiagramGeneration,
                DIAGRAM_PROGRESS,
                "Generating diagram",
            ));
            match self.diagrams.generate(options.format, &final_summary, ctx).await {
                Ok(diagram) => {
                    stats.provider_calls += if diagram.corrected { 2 } else { 1 };
                    Some(diagram)
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!(error = %e, "Diagram generation failed, returning summary without it");
                    None
                }
            }
        } else {
            None
        };

        let highlights = if options.highlights {
            ctx.ensure_active()?;
            ctx.report(ProgressUpdate::new(
                ProgressStage::HighlightExtraction,
                HIGHLIGHT_PROGRESS,
                "Extracting highlights",
            ));
            self.highlights.extract(&final_summary, &ctx.cancel).await?
        } else {
            Vec::new()
        };

        ctx.ensure_active()?;
        stats.finish(started);
        ctx.report(ProgressUpdate::new(
            ProgressStage::Completed,
            100.0,
            "Summary complete",
        ));
        info!(
            mode = ?stats.mode,
            calls = stats.provider_calls,
            failed = stats.failed_units,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "Summarization finished"
        );

        Ok(SummaryResult {
            final_summary,
            highlights,
            diagram,
            stats,
        })
    }
}
