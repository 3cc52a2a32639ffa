//! Line-preserving math notation reformatting.
//!
//! The document is split on line boundaries so every output chunk maps back to a known
//! slice of the input. A chunk whose call fails is emitted unchanged, which means the
//! formatter always returns a complete document.

use crate::pipeline::chunker::chunk_by_lines;
use crate::pipeline::engine::{MapReduceEngine, RunContext};
use crate::pipeline::progress::{PhaseRange, ProgressStage, ProgressUpdate};
use crate::pipeline::prompts::{TaskFormat, UnitPosition};
use crate::pipeline::types::{FormattedDocument, PipelineError, RunMode, RunStats, UnitOutcome};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

const MAP_RANGE: PhaseRange = PhaseRange::new(5.0, 95.0);

pub struct MathFormatter {
    engine: Arc<MapReduceEngine>,
}

/// Reattach the line ending a model tends to drop
fn preserve_newline(original: &str, mut formatted: String) -> String {
    if original.ends_with('\n') && !formatted.ends_with('\n') {
        formatted.push('\n');
    }
    formatted
}

impl MathFormatter {
    pub fn new(engine: Arc<MapReduceEngine>) -> Self {
        Self { engine }
    }

    pub async fn format(&self, text: &str, ctx: &RunContext) -> Result<FormattedDocument, PipelineError> {
        let started = Instant::now();
        if text.trim().is_empty() {
            return Err(PipelineError::EmptyInput);
        }
        ctx.ensure_active()?;

        let config = self.engine.config();
        let format = TaskFormat::MathFormat;
        let chunks = chunk_by_lines(text, config.math_chunk_size.max(1));
        let units: Vec<String> = chunks.into_iter().map(|c| c.text).collect();
        let total = units.len();

        let mut stats = RunStats::new(if total == 1 { RunMode::Direct } else { RunMode::Lines });
        stats.chunks = total;
        stats.map_units = total;
        ctx.report(
            ProgressUpdate::new(ProgressStage::Chunking, MAP_RANGE.start, "Splitting document on line boundaries")
                .with_counts(0, total),
        );
        info!(chunks = total, "Math formatting started");

        let prompts = Arc::clone(self.engine.prompts());
        let outcomes = self
            .engine
            .map_batched(&units, config.flat_concurrency, MAP_RANGE, ctx, &mut stats, |index, unit| {
                let position = UnitPosition {
                    index,
                    total,
                    grouped: false,
                };
                let prompt = if total == 1 {
                    prompts.direct(format, unit)
                } else {
                    prompts.map(format, unit, position)
                };
                self.engine.request(format, prompt, ctx)
            })
            .await?;

        let mut fallback_chunks = 0;
        let mut document = String::with_capacity(text.len());
        for (index, (original, outcome)) in units.iter().zip(outcomes).enumerate() {
            match outcome {
                UnitOutcome::Ok(formatted) => {
                    document.push_str(&preserve_newline(original, formatted));
                }
                UnitOutcome::Failed(reason) => {
                    warn!(chunk = index, error = %reason, "Keeping original text for chunk");
                    fallback_chunks += 1;
                    document.push_str(original);
                }
                UnitOutcome::Cancelled => return Err(PipelineError::Cancelled),
            }
        }

        ctx.ensure_active()?;
        stats.failed_units = fallback_chunks;
        stats.finish(started);
        ctx.report(ProgressUpdate::new(
            ProgressStage::Completed,
            100.0,
            "Formatting complete",
        ));
        info!(
            chunks = total,
            fallback_chunks,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "Math formatting finished"
        );

        Ok(FormattedDocument {
            text: document,
            fallback_chunks,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preserve_newline() {
        assert_eq!(preserve_newline("a\n", "b".to_string()), "b\n");
        assert_eq!(preserve_newline("a\n", "b\n".to_string()), "b\n");
        assert_eq!(preserve_newline("a", "b".to_string()), "b");
    }
}
