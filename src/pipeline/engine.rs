//! Map-reduce engine shared by every document pipeline.
//!
//! A run goes through three phases:
//!
//! 1. **Planning**: inputs shorter than `target_chunk_size` skip chunking and are answered
//!    by one direct call. Longer inputs are windowed with [`chunk_by_offset`]; in
//!    hierarchical mode the windows are smaller and consecutive ones are grouped so a
//!    single call sees several of them.
//! 2. **Map**: units are processed in sequential batches of `concurrency` calls. Every
//!    outcome is written to a slot at the unit's original index so completion order never
//!    leaks into the result order. A failed unit is recorded and skipped; it never aborts
//!    its batch.
//! 3. **Reduce**: the surviving results are merged level by level, at most
//!    `max_reduction_inputs` per call, until one remains.
//!
//! Cancellation is checked before every batch and every reduction level, and the token is
//! attached to each provider request so in-flight calls abort too.

use crate::llm::{CallRequest, SharedProvider};
use crate::pipeline::chunker::{Chunk, chunk_by_offset, group_chunks};
use crate::pipeline::progress::{
    EtaTracker, PhaseRange, ProgressReporter, ProgressStage, ProgressUpdate, hint_from,
};
use crate::pipeline::prompts::{PromptBuilder, TaskFormat, UnitPosition};
use crate::pipeline::types::{
    ChunkingMode, PipelineConfig, PipelineError, RunMode, RunStats, UnitOutcome,
};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Per-request plumbing: the abort signal and the progress sink
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub cancel: CancellationToken,
    pub progress: ProgressReporter,
}

impl RunContext {
    pub fn new(cancel: CancellationToken, progress: ProgressReporter) -> Self {
        Self { cancel, progress }
    }

    pub fn report(&self, update: ProgressUpdate) {
        self.progress.report(update);
    }

    pub fn ensure_active(&self) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Percentage ranges a map-reduce run reports into
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhasePlan {
    pub chunking: f32,
    pub map: PhaseRange,
    pub reduce: PhaseRange,
}

impl PhasePlan {
    /// Layout used by the summarizer, leaving room for diagram and highlights
    pub const SUMMARY: PhasePlan = PhasePlan {
        chunking: 5.0,
        map: PhaseRange::new(10.0, 70.0),
        reduce: PhaseRange::new(70.0, 85.0),
    };

    pub const STYLE: PhasePlan = PhasePlan {
        chunking: 5.0,
        map: PhaseRange::new(10.0, 75.0),
        reduce: PhaseRange::new(75.0, 95.0),
    };
}

/// Map units chosen for a document
#[derive(Debug, Clone)]
pub struct MapPlan {
    pub mode: RunMode,
    pub chunks: Vec<Chunk>,
    pub units: Vec<String>,
    pub concurrency: usize,
}

/// Output of a full map-reduce run
#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub text: String,
    pub stats: RunStats,
}

/// Number of levels needed to fold `items` results with fan-in `fan_in`
pub fn reduction_levels(items: usize, fan_in: usize) -> usize {
    let fan_in = fan_in.max(2);
    let mut remaining = items;
    let mut levels = 0;
    while remaining > 1 {
        remaining = remaining.div_ceil(fan_in);
        levels += 1;
    }
    levels
}

/// Character window and overlap derived from a size and ratio
fn window(chunk_size: usize, overlap_ratio: f64) -> (usize, usize) {
    let chunk_size = chunk_size.max(1);
    let overlap = (chunk_size as f64 * overlap_ratio.clamp(0.0, 1.0)) as usize;
    (chunk_size, overlap.min(chunk_size - 1))
}

pub struct MapReduceEngine {
    provider: SharedProvider,
    prompts: Arc<dyn PromptBuilder>,
    config: PipelineConfig,
}

impl MapReduceEngine {
    pub fn new(
        provider: SharedProvider,
        prompts: Arc<dyn PromptBuilder>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            provider,
            prompts,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn provider(&self) -> &SharedProvider {
        &self.provider
    }

    pub fn prompts(&self) -> &Arc<dyn PromptBuilder> {
        &self.prompts
    }

    /// Base request for `format`: the prompt plus the builder's system message, if any
    pub fn request(&self, format: TaskFormat, prompt: String, ctx: &RunContext) -> CallRequest {
        let request = CallRequest::prompt(prompt).with_signal(ctx.cancel.clone());
        match self.prompts.system(format) {
            Some(system) => request.with_system(system),
            None => request,
        }
    }

    /// Whether `text` is short enough for a single direct call
    pub fn is_fast_path(&self, text: &str) -> bool {
        text.chars().count() < self.config.target_chunk_size
    }

    /// Choose flat or hierarchical units for a document
    pub fn plan(&self, text: &str, mode_override: Option<ChunkingMode>) -> Result<MapPlan, PipelineError> {
        let config = &self.config;
        let (flat_size, flat_overlap) = window(config.target_chunk_size, config.flat_overlap_ratio);
        let flat = chunk_by_offset(text, flat_size, flat_overlap)?;

        let hierarchical = match mode_override.unwrap_or(config.mode) {
            ChunkingMode::Flat => false,
            ChunkingMode::Hierarchical => true,
            ChunkingMode::Auto => flat.len() > config.hierarchical_threshold_chunks,
        };

        if !hierarchical {
            let units = flat.iter().map(|c| c.text.clone()).collect();
            return Ok(MapPlan {
                mode: RunMode::Flat,
                chunks: flat,
                units,
                concurrency: config.flat_concurrency.max(1),
            });
        }

        let group_size = config.hierarchical_group_size.max(1);
        let (size, overlap) = window(
            config.target_chunk_size / group_size,
            config.hierarchical_overlap_ratio,
        );
        let chunks = chunk_by_offset(text, size, overlap)?;
        let units = group_chunks(&chunks, group_size);
        Ok(MapPlan {
            mode: RunMode::Hierarchical,
            chunks,
            units,
            concurrency: config.hierarchical_concurrency.max(1),
        })
    }

    /// Run `units` through the provider in bounded batches, preserving order
    ///
    /// `build` turns `(index, unit)` into a request. Returns one outcome per unit; only a
    /// cancellation is an error.
    pub async fn map_batched<F>(
        &self,
        units: &[String],
        concurrency: usize,
        range: PhaseRange,
        ctx: &RunContext,
        stats: &mut RunStats,
        build: F,
    ) -> Result<Vec<UnitOutcome>, PipelineError>
    where
        F: Fn(usize, &str) -> CallRequest,
    {
        let total = units.len();
        let concurrency = concurrency.max(1);
        let batches = total.div_ceil(concurrency);
        let mut slots: Vec<Option<UnitOutcome>> = vec![None; total];
        let mut eta = EtaTracker::new();

        for (batch, batch_start) in (0..total).step_by(concurrency).enumerate() {
            ctx.ensure_active()?;
            let batch_end = (batch_start + concurrency).min(total);

            ctx.report(
                ProgressUpdate::new(
                    ProgressStage::Mapping,
                    range.at(batch_start, total),
                    format!("Processing batch {}/{}", batch + 1, batches),
                )
                .with_counts(batch_start, total)
                .with_etr(eta.estimate(total - batch_start))
                .with_hint(hint_from(&units[batch_start], self.config.hint_chars)),
            );
            debug!(batch = batch + 1, batches, batch_start, batch_end, "Map batch started");

            let calls = (batch_start..batch_end).map(|index| {
                let request = build(index, &units[index]).with_signal(ctx.cancel.clone());
                let provider = Arc::clone(&self.provider);
                async move {
                    let started = Instant::now();
                    let result = provider.complete(request, None).await.map(|r| r.text);
                    (index, UnitOutcome::from_result(result), started.elapsed())
                }
            });
            let results = join_all(calls).await;

            stats.map_batches += 1;
            stats.provider_calls += results.len();
            let mut cancelled = false;
            for (index, outcome, elapsed) in results {
                match &outcome {
                    UnitOutcome::Ok(_) => eta.record_success(elapsed),
                    UnitOutcome::Failed(reason) => {
                        warn!(unit = index, error = %reason, "Map unit failed, continuing")
                    }
                    UnitOutcome::Cancelled => cancelled = true,
                }
                slots[index] = Some(outcome);
            }
            if cancelled {
                return Err(PipelineError::Cancelled);
            }
            ctx.ensure_active()?;

            let next_hint = units
                .get(batch_end)
                .and_then(|unit| hint_from(unit, self.config.hint_chars));
            ctx.report(
                ProgressUpdate::new(
                    ProgressStage::Mapping,
                    range.at(batch_end, total),
                    format!("Processed {}/{} units", batch_end, total),
                )
                .with_counts(batch_end, total)
                .with_etr(eta.estimate(total - batch_end))
                .with_hint(next_hint),
            );
        }

        Ok(slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| UnitOutcome::Failed("not attempted".to_string())))
            .collect())
    }

    /// Fold ordered results into one, at most `max_reduction_inputs` per call
    pub async fn reduce(
        &self,
        format: TaskFormat,
        mut items: Vec<String>,
        range: PhaseRange,
        ctx: &RunContext,
        stats: &mut RunStats,
    ) -> Result<String, PipelineError> {
        let fan_in = self.config.max_reduction_inputs.max(2);
        let concurrency = self.config.flat_concurrency.max(1);
        let expected = reduction_levels(items.len(), fan_in);
        let mut level = 0;

        while items.len() > 1 {
            ctx.ensure_active()?;
            if level >= self.config.max_reduction_levels {
                warn!(
                    level,
                    remaining = items.len(),
                    "Reduction level limit reached, concatenating remaining results"
                );
                return Ok(items.join("\n\n"));
            }
            level += 1;

            let groups: Vec<Vec<String>> = items.chunks(fan_in).map(|g| g.to_vec()).collect();
            ctx.report(
                ProgressUpdate::new(
                    ProgressStage::Reducing,
                    range.at(level - 1, expected.max(level)),
                    format!(
                        "Reduction level {}: combining {} results into {}",
                        level,
                        items.len(),
                        groups.len()
                    ),
                )
                .with_counts(level - 1, expected.max(level)),
            );
            info!(level, inputs = items.len(), outputs = groups.len(), "Reduction level");

            let mut next: Vec<Option<String>> = vec![None; groups.len()];
            let pending: Vec<usize> = groups
                .iter()
                .enumerate()
                .filter_map(|(i, group)| {
                    if group.len() > 1 {
                        Some(i)
                    } else {
                        next[i] = group.first().cloned();
                        None
                    }
                })
                .collect();

            for batch in pending.chunks(concurrency) {
                ctx.ensure_active()?;
                let calls = batch.iter().map(|&gi| {
                    let prompt = self.prompts.reduce(format, &groups[gi], level);
                    let request = self.request(format, prompt, ctx);
                    let provider = Arc::clone(&self.provider);
                    async move {
                        let result = provider.complete(request, None).await.map(|r| r.text);
                        (gi, UnitOutcome::from_result(result))
                    }
                });
                let results = join_all(calls).await;
                stats.provider_calls += results.len();

                for (gi, outcome) in results {
                    next[gi] = Some(match outcome {
                        UnitOutcome::Ok(text) => text,
                        UnitOutcome::Failed(reason) => {
                            warn!(level, group = gi, error = %reason, "Reduce call failed, concatenating its inputs");
                            groups[gi].join("\n\n")
                        }
                        UnitOutcome::Cancelled => return Err(PipelineError::Cancelled),
                    });
                }
            }

            items = next.into_iter().flatten().collect();
            stats.reduction_levels = level;
        }

        Ok(items.into_iter().next().unwrap_or_default())
    }

    /// Full run: fast path or plan, map and reduce
    pub async fn run(
        &self,
        format: TaskFormat,
        text: &str,
        mode_override: Option<ChunkingMode>,
        phases: PhasePlan,
        ctx: &RunContext,
    ) -> Result<EngineOutput, PipelineError> {
        let started = Instant::now();
        if text.trim().is_empty() {
            return Err(PipelineError::EmptyInput);
        }
        ctx.ensure_active()?;

        if self.is_fast_path(text) {
            let mut stats = RunStats::new(RunMode::Direct);
            ctx.report(
                ProgressUpdate::new(
                    ProgressStage::Mapping,
                    phases.map.start,
                    "Processing document in a single pass",
                )
                .with_counts(0, 1)
                .with_hint(hint_from(text, self.config.hint_chars)),
            );
            debug!(chars = text.chars().count(), "Direct call, skipping chunking");

            let request = self.request(format, self.prompts.direct(format, text), ctx);
            stats.provider_calls = 1;
            stats.map_units = 1;
            let result = self.provider.complete(request, None).await?;
            ctx.report(
                ProgressUpdate::new(ProgressStage::Mapping, phases.reduce.end, "Single pass complete")
                    .with_counts(1, 1),
            );
            stats.finish(started);
            return Ok(EngineOutput {
                text: result.text,
                stats,
            });
        }

        ctx.report(ProgressUpdate::new(
            ProgressStage::Chunking,
            phases.chunking,
            "Splitting document into chunks",
        ));
        let plan = self.plan(text, mode_override)?;
        let mut stats = RunStats::new(plan.mode);
        stats.chunks = plan.chunks.len();
        stats.map_units = plan.units.len();
        info!(
            mode = ?plan.mode,
            chunks = plan.chunks.len(),
            units = plan.units.len(),
            concurrency = plan.concurrency,
            "Document planned"
        );

        let grouped = plan.mode == RunMode::Hierarchical;
        let total = plan.units.len();
        let outcomes = self
            .map_batched(&plan.units, plan.concurrency, phases.map, ctx, &mut stats, |index, unit| {
                let position = UnitPosition {
                    index,
                    total,
                    grouped,
                };
                self.request(format, self.prompts.map(format, unit, position), ctx)
            })
            .await?;

        let valid: Vec<String> = outcomes
            .into_iter()
            .filter_map(|outcome| match outcome {
                UnitOutcome::Ok(text) => Some(text),
                _ => None,
            })
            .collect();
        stats.failed_units = total - valid.len();
        if valid.is_empty() {
            return Err(PipelineError::AllUnitsFailed { attempted: total });
        }
        if stats.failed_units > 0 {
            warn!(failed = stats.failed_units, total, "Continuing with partial map results");
        }

        let text = self.reduce(format, valid, phases.reduce, ctx, &mut stats).await?;
        stats.finish(started);
        Ok(EngineOutput { text, stats })
    }
}

impl std::fmt::Debug for MapReduceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapReduceEngine")
            .field("provider", &self.provider.provider_name())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::prompts::DefaultPromptBuilder;

    #[test]
    fn test_reduction_levels_match_log_fan_in() {
        assert_eq!(reduction_levels(0, 5), 0);
        assert_eq!(reduction_levels(1, 5), 0);
        assert_eq!(reduction_levels(5, 5), 1);
        assert_eq!(reduction_levels(6, 5), 2);
        assert_eq!(reduction_levels(7, 5), 2);
        assert_eq!(reduction_levels(25, 5), 2);
        assert_eq!(reduction_levels(26, 5), 3);
        assert_eq!(reduction_levels(125, 5), 3);
    }

    #[test]
    fn test_window_keeps_overlap_below_size() {
        assert_eq!(window(100, 0.2), (100, 20));
        assert_eq!(window(1, 0.5), (1, 0));
        assert_eq!(window(0, 0.1), (1, 0));
        assert_eq!(window(10, 1.0), (10, 9));
    }

    fn engine(config: PipelineConfig) -> MapReduceEngine {
        MapReduceEngine::new(
            crate::llm::MockProvider::fixed("ok").into_shared(),
            Arc::new(DefaultPromptBuilder),
            config,
        )
    }

    #[test]
    fn test_auto_mode_switches_to_hierarchical_above_threshold() {
        let config = PipelineConfig {
            target_chunk_size: 30,
            hierarchical_threshold_chunks: 4,
            ..Default::default()
        };
        let engine = engine(config);

        let short = "x".repeat(90);
        let plan = engine.plan(&short, None).unwrap();
        assert_eq!(plan.mode, RunMode::Flat);
        assert_eq!(plan.units.len(), plan.chunks.len());

        let long = "y".repeat(400);
        let plan = engine.plan(&long, None).unwrap();
        assert_eq!(plan.mode, RunMode::Hierarchical);
        assert_eq!(plan.units.len(), plan.chunks.len().div_ceil(3));
        assert_eq!(plan.concurrency, 6);

        let forced = engine.plan(&long, Some(ChunkingMode::Flat)).unwrap();
        assert_eq!(forced.mode, RunMode::Flat);
    }
}
