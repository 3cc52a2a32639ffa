use crate::llm::LLMError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Chunk count above which `auto` mode switches to hierarchical grouping
pub const HIERARCHICAL_THRESHOLD_CHUNKS: usize = 12;

/// Consecutive chunks summarized together in hierarchical mode
pub const HIERARCHICAL_CHUNK_GROUP_SIZE: usize = 3;

/// Fan-in bound of a single reduce call
pub const MAX_REDUCTION_INPUT_SUMMARIES: usize = 5;

/// Safety valve against runaway reduction
pub const MAX_REDUCTION_LEVELS: usize = 8;

/// Marker placed between members of a chunk group
pub const SEGMENT_BREAK: &str = "\n\n--- SEGMENT BREAK ---\n\n";

/// Chunking strategy selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingMode {
    #[default]
    Auto,
    Flat,
    Hierarchical,
}

impl std::str::FromStr for ChunkingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(ChunkingMode::Auto),
            "flat" => Ok(ChunkingMode::Flat),
            "hierarchical" => Ok(ChunkingMode::Hierarchical),
            other => Err(format!(
                "Invalid mode '{}'. Must be 'auto', 'flat' or 'hierarchical'",
                other
            )),
        }
    }
}

/// Tunables of the map-reduce engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Characters per map unit; inputs shorter than this take the single-call fast path
    pub target_chunk_size: usize,
    pub flat_overlap_ratio: f64,
    pub hierarchical_overlap_ratio: f64,
    pub hierarchical_group_size: usize,
    pub flat_concurrency: usize,
    pub hierarchical_concurrency: usize,
    pub hierarchical_threshold_chunks: usize,
    pub max_reduction_inputs: usize,
    pub max_reduction_levels: usize,
    /// Characters per chunk for line-preserving reformatting
    pub math_chunk_size: usize,
    pub mode: ChunkingMode,
    /// Length of the chunk prefix reported as a progress hint
    pub hint_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_chunk_size: 12_000,
            flat_overlap_ratio: 0.2,
            hierarchical_overlap_ratio: 0.1,
            hierarchical_group_size: HIERARCHICAL_CHUNK_GROUP_SIZE,
            flat_concurrency: 3,
            hierarchical_concurrency: 6,
            hierarchical_threshold_chunks: HIERARCHICAL_THRESHOLD_CHUNKS,
            max_reduction_inputs: MAX_REDUCTION_INPUT_SUMMARIES,
            max_reduction_levels: MAX_REDUCTION_LEVELS,
            math_chunk_size: 6_000,
            mode: ChunkingMode::Auto,
            hint_chars: 60,
        }
    }
}

/// Outcome of one map or reduce unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    Ok(String),
    Failed(String),
    Cancelled,
}

impl UnitOutcome {
    pub fn from_result(result: Result<String, LLMError>) -> Self {
        match result {
            Ok(text) if text.trim().is_empty() => UnitOutcome::Failed("empty reply".to_string()),
            Ok(text) => UnitOutcome::Ok(text),
            Err(LLMError::Cancelled) => UnitOutcome::Cancelled,
            Err(e) => UnitOutcome::Failed(e.to_string()),
        }
    }

    pub fn ok(&self) -> Option<&str> {
        match self {
            UnitOutcome::Ok(text) => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Input text is empty")]
    EmptyInput,
    #[error("Aborted by user")]
    Cancelled,
    #[error("All {attempted} map units failed")]
    AllUnitsFailed { attempted: usize },
    #[error("Provider error: {0}")]
    Provider(LLMError),
    #[error("Chunking error: {0}")]
    Chunking(#[from] crate::pipeline::chunker::ChunkError),
}

impl From<LLMError> for PipelineError {
    fn from(error: LLMError) -> Self {
        match error {
            LLMError::Cancelled => PipelineError::Cancelled,
            other => PipelineError::Provider(other),
        }
    }
}

impl PipelineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }
}

/// Map-phase granularity actually used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Direct,
    Flat,
    Hierarchical,
    Lines,
}

/// Counters reported with every result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub mode: RunMode,
    pub chunks: usize,
    pub map_units: usize,
    pub failed_units: usize,
    pub map_batches: usize,
    pub reduction_levels: usize,
    pub provider_calls: usize,
    pub elapsed: Duration,
    pub completed_at: DateTime<Utc>,
}

impl RunStats {
    pub fn new(mode: RunMode) -> Self {
        Self {
            mode,
            chunks: 0,
            map_units: 0,
            failed_units: 0,
            map_batches: 0,
            reduction_levels: 0,
            provider_calls: 0,
            elapsed: Duration::ZERO,
            completed_at: Utc::now(),
        }
    }

    /// Stamp the run as finished now
    pub fn finish(&mut self, started: Instant) {
        self.elapsed = started.elapsed();
        self.completed_at = Utc::now();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlight {
    pub text: String,
}

/// Diagram produced after reduction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramOutput {
    pub code: String,
    pub valid: bool,
    pub corrected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResult {
    pub final_summary: String,
    pub highlights: Vec<Highlight>,
    pub diagram: Option<DiagramOutput>,
    pub stats: RunStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleResult {
    pub style_guide: String,
    pub stats: RunStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormattedDocument {
    pub text: String,
    /// Chunks returned verbatim because their call failed
    pub fallback_chunks: usize,
    pub stats: RunStats,
}
