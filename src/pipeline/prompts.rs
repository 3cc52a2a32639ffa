//! Prompt construction seam.
//!
//! The pipelines never format prompt text themselves; they ask a [`PromptBuilder`] keyed
//! by [`TaskFormat`]. [`DefaultPromptBuilder`] ships usable templates; callers with their
//! own house style supply another implementation.

use serde::{Deserialize, Serialize};

/// Summary flavor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryFormat {
    #[default]
    Technical,
    EntityRelationship,
    ReverseEngineering,
}

impl SummaryFormat {
    pub fn requires_diagram(&self) -> bool {
        matches!(
            self,
            SummaryFormat::EntityRelationship | SummaryFormat::ReverseEngineering
        )
    }
}

impl std::str::FromStr for SummaryFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "technical" => Ok(SummaryFormat::Technical),
            "entities" | "entity_relationship" => Ok(SummaryFormat::EntityRelationship),
            "reverse" | "reverse_engineering" => Ok(SummaryFormat::ReverseEngineering),
            other => Err(format!(
                "Invalid format '{}'. Must be 'technical', 'entities' or 'reverse'",
                other
            )),
        }
    }
}

/// What a prompt is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskFormat {
    Summary(SummaryFormat),
    Style,
    MathFormat,
}

/// Position of a map unit within the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitPosition {
    pub index: usize,
    pub total: usize,
    /// The unit is a group of chunks joined by segment breaks
    pub grouped: bool,
}

pub trait PromptBuilder: Send + Sync {
    /// Whole-document prompt for the fast path
    fn direct(&self, format: TaskFormat, text: &str) -> String;

    fn map(&self, format: TaskFormat, text: &str, position: UnitPosition) -> String;

    /// Combine ordered partial results into one
    fn reduce(&self, format: TaskFormat, parts: &[String], level: usize) -> String;

    fn diagram(&self, format: SummaryFormat, summary: &str) -> String;

    fn diagram_correction(&self, code: &str, error: &str, syntax_reference: &str) -> String;

    /// Ask for a JSON array of `{"text": ...}` highlights
    fn highlights(&self, text: &str, max: usize) -> String;

    fn system(&self, _format: TaskFormat) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, Default)]
pub struct DefaultPromptBuilder;

impl DefaultPromptBuilder {
    fn goal(format: TaskFormat) -> &'static str {
        match format {
            TaskFormat::Summary(SummaryFormat::Technical) => {
                "Write a precise technical summary in markdown. Keep concrete names, numbers and decisions."
            }
            TaskFormat::Summary(SummaryFormat::EntityRelationship) => {
                "Produce an entity-relationship digest in markdown: list every entity with its attributes, then every relationship as `A -> B: meaning`."
            }
            TaskFormat::Summary(SummaryFormat::ReverseEngineering) => {
                "Produce a reverse-engineering digest in markdown: components, responsibilities, data flow, and the order in which things happen."
            }
            TaskFormat::Style => {
                "Analyze the writing style: tone, voice, sentence rhythm, vocabulary, structure, formatting habits. Quote short representative examples."
            }
            TaskFormat::MathFormat => {
                "Rewrite the text so every mathematical expression uses LaTeX delimiters ($...$ inline, $$...$$ display). Change nothing else and keep every line."
            }
        }
    }
}

impl PromptBuilder for DefaultPromptBuilder {
    fn direct(&self, format: TaskFormat, text: &str) -> String {
        format!("{}\n\n<document>\n{}\n</document>", Self::goal(format), text)
    }

    fn map(&self, format: TaskFormat, text: &str, position: UnitPosition) -> String {
        let note = if position.grouped {
            " It contains several consecutive segments separated by SEGMENT BREAK markers; treat them as one continuous passage."
        } else {
            ""
        };
        format!(
            "{}\n\nThis is part {} of {} of a larger document.{}\n\n<part>\n{}\n</part>",
            Self::goal(format),
            position.index + 1,
            position.total,
            note,
            text
        )
    }

    fn reduce(&self, format: TaskFormat, parts: &[String], level: usize) -> String {
        let mut prompt = format!(
            "{}\n\nMerge the following {} partial results (reduction level {}) into one coherent result. Remove repetition, keep every distinct fact, preserve their order.\n",
            Self::goal(format),
            parts.len(),
            level
        );
        for (i, part) in parts.iter().enumerate() {
            prompt.push_str(&format!("\n<partial index=\"{}\">\n{}\n</partial>\n", i + 1, part));
        }
        prompt
    }

    fn diagram(&self, format: SummaryFormat, summary: &str) -> String {
        let kind = match format {
            SummaryFormat::EntityRelationship => "an erDiagram",
            SummaryFormat::ReverseEngineering => "a flowchart (graph TD)",
            SummaryFormat::Technical => "a flowchart (graph TD)",
        };
        format!(
            "Draw {} in Mermaid syntax capturing the structure described below. Return only the code in a ```mermaid fenced block.\n\n{}",
            kind, summary
        )
    }

    fn diagram_correction(&self, code: &str, error: &str, syntax_reference: &str) -> String {
        format!(
            "The following Mermaid diagram fails to parse.\n\n```mermaid\n{}\n```\n\nParser error:\n{}\n\nSyntax reference:\n{}\n\nReturn only the corrected code in a ```mermaid fenced block.",
            code, error, syntax_reference
        )
    }

    fn highlights(&self, text: &str, max: usize) -> String {
        format!(
            "Extract at most {} key highlights from the text below. Respond with a JSON array of objects shaped like {{\"text\": \"...\"}} and nothing else.\n\n{}",
            max, text
        )
    }

    fn system(&self, format: TaskFormat) -> Option<String> {
        match format {
            TaskFormat::MathFormat => Some(
                "You are a meticulous copy editor. Output only the rewritten text.".to_string(),
            ),
            _ => Some("You are an expert analyst producing faithful, well-structured output.".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!("entities".parse::<SummaryFormat>().unwrap(), SummaryFormat::EntityRelationship);
        assert_eq!("Technical".parse::<SummaryFormat>().unwrap(), SummaryFormat::Technical);
        assert!("poem".parse::<SummaryFormat>().is_err());
    }

    #[test]
    fn test_diagram_requirement() {
        assert!(!SummaryFormat::Technical.requires_diagram());
        assert!(SummaryFormat::EntityRelationship.requires_diagram());
        assert!(SummaryFormat::ReverseEngineering.requires_diagram());
    }

    #[test]
    fn test_reduce_prompt_preserves_order() {
        let prompt = DefaultPromptBuilder.reduce(
            TaskFormat::Style,
            &["first".to_string(), "second".to_string()],
            1,
        );
        assert!(prompt.find("first").unwrap() < prompt.find("second").unwrap());
    }
}
