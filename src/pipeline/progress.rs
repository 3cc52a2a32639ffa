//! Progress reporting and time-remaining estimation.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressStage {
    Chunking,
    Mapping,
    Reducing,
    DiagramGeneration,
    HighlightExtraction,
    Completed,
}

impl ProgressStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStage::Chunking => "Chunking",
            ProgressStage::Mapping => "Mapping",
            ProgressStage::Reducing => "Reducing",
            ProgressStage::DiagramGeneration => "DiagramGeneration",
            ProgressStage::HighlightExtraction => "HighlightExtraction",
            ProgressStage::Completed => "Completed",
        }
    }
}

impl std::fmt::Display for ProgressStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub stage: ProgressStage,
    /// 0-100
    pub percentage: f32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etr_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_hint: Option<String>,
}

impl ProgressUpdate {
    pub fn new(stage: ProgressStage, percentage: f32, message: impl Into<String>) -> Self {
        Self {
            stage,
            percentage: percentage.clamp(0.0, 100.0),
            message: message.into(),
            current: None,
            total: None,
            etr_seconds: None,
            thinking_hint: None,
        }
    }

    pub fn with_counts(mut self, current: usize, total: usize) -> Self {
        self.current = Some(current);
        self.total = Some(total);
        self
    }

    pub fn with_etr(mut self, etr_seconds: Option<u64>) -> Self {
        self.etr_seconds = etr_seconds;
        self
    }

    pub fn with_hint(mut self, hint: Option<String>) -> Self {
        self.thinking_hint = hint;
        self
    }
}

/// Synchronous progress channel
pub type ProgressCallback = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Optional callback wrapper threaded through the pipelines
#[derive(Clone, Default)]
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
}

impl ProgressReporter {
    pub fn new(callback: ProgressCallback) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    pub fn silent() -> Self {
        Self { callback: None }
    }

    pub fn report(&self, update: ProgressUpdate) {
        if let Some(callback) = &self.callback {
            callback(update);
        }
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("attached", &self.callback.is_some())
            .finish()
    }
}

/// Percentage range a phase occupies
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseRange {
    pub start: f32,
    pub end: f32,
}

impl PhaseRange {
    pub const fn new(start: f32, end: f32) -> Self {
        Self { start, end }
    }

    /// Linear interpolation of `done / total` across the range
    pub fn at(&self, done: usize, total: usize) -> f32 {
        if total == 0 {
            return self.end;
        }
        let fraction = (done as f32 / total as f32).clamp(0.0, 1.0);
        self.start + (self.end - self.start) * fraction
    }
}

/// Mean duration of successful units, projected over the remaining ones
#[derive(Debug, Default, Clone)]
pub struct EtaTracker {
    successful: usize,
    total_time: Duration,
}

impl EtaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, duration: Duration) {
        self.successful += 1;
        self.total_time += duration;
    }

    /// Seconds remaining, `None` until a unit has succeeded
    pub fn estimate(&self, remaining: usize) -> Option<u64> {
        if self.successful == 0 {
            return None;
        }
        let mean = self.total_time.as_secs_f64() / self.successful as f64;
        Some((mean * remaining as f64).ceil() as u64)
    }
}

/// Short single-line preview of the text about to be processed
pub fn hint_from(text: &str, max_chars: usize) -> Option<String> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() || max_chars == 0 {
        return None;
    }
    let mut hint: String = collapsed.chars().take(max_chars).collect();
    if collapsed.chars().count() > max_chars {
        hint.push('…');
    }
    Some(hint)
}
