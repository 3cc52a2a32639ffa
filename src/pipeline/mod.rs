pub mod chunker;
pub mod diagram;
pub mod engine;
pub mod highlights;
pub mod math_formatter;
pub mod progress;
pub mod prompts;
pub mod style;
pub mod summarizer;
pub mod types;


pub use chunker::{Chunk, ChunkError, chunk_by_lines, chunk_by_offset, group_chunks};
pub use diagram::{AssumeValid, DiagramGenerator, DiagramValidator, MermaidLint, ValidationResult};
pub use engine::{EngineOutput, MapReduceEngine, PhasePlan, RunContext, reduction_levels};
pub use highlights::{HighlightExtractor, LlmHighlightExtractor, NoHighlights};
pub use math_formatter::MathFormatter;
pub use progress::{ProgressCallback, ProgressReporter, ProgressStage, ProgressUpdate};
pub use prompts::{DefaultPromptBuilder, PromptBuilder, SummaryFormat, TaskFormat, UnitPosition};
pub use style::StyleExtractor;
pub use summarizer::{SummaryOptions, Summarizer};
pub use types::*;
