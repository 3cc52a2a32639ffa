//! Diagram generation with a single self-correction round.

use crate::llm::{CallRequest, SharedProvider};
use crate::pipeline::engine::RunContext;
use crate::pipeline::prompts::{PromptBuilder, SummaryFormat};
use crate::pipeline::types::{DiagramOutput, PipelineError};
use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{info, warn};

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)```").expect("fenced block pattern is valid")
});

const DIAGRAM_KINDS: &[&str] = &[
    "graph",
    "flowchart",
    "erDiagram",
    "sequenceDiagram",
    "classDiagram",
    "stateDiagram",
    "stateDiagram-v2",
    "gantt",
    "pie",
    "mindmap",
    "journey",
];

const LINK_SYNTAX: &str = "Links: `A --> B`, `A --- B`, `A -.-> B`, `A ==> B`, labelled `A -->|label| B`. \
ER relationships: `CUSTOMER ||--o{ ORDER : places`. Every link needs a node on both sides.";

const NODE_SYNTAX: &str = "Nodes: `id[Text]` rectangle, `id(Text)` rounded, `id{Text}` rhombus, \
`id((Text))` circle, `id[(Text)]` database. Quote labels containing punctuation: `id[\"a: b\"]`. \
Brackets must be balanced.";

const SUBGRAPH_SYNTAX: &str = "Subgraphs: `subgraph title` ... `end`. Every `subgraph` needs a matching `end`.";

const GENERAL_SYNTAX: &str = "The first line declares the diagram type (`graph TD`, `flowchart LR`, \
`erDiagram`, `sequenceDiagram`). One statement per line. Comments start with `%%`.";

/// Verdict of a diagram syntax check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub error: Option<String>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error: Some(error.into()),
        }
    }
}

/// Syntax checker plugged into the correction loop
#[async_trait]
pub trait DiagramValidator: Send + Sync {
    async fn validate(&self, code: &str) -> ValidationResult;
}

/// Accepts everything
#[derive(Debug, Clone, Default)]
pub struct AssumeValid;

#[async_trait]
impl DiagramValidator for AssumeValid {
    async fn validate(&self, _code: &str) -> ValidationResult {
        ValidationResult::valid()
    }
}

/// Structural Mermaid checks: diagram header, bracket balance, subgraph nesting
#[derive(Debug, Clone, Default)]
pub struct MermaidLint;

impl MermaidLint {
    pub fn check(code: &str) -> ValidationResult {
        let mut lines = code
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with("%%"));

        let Some(header) = lines.next() else {
            return ValidationResult::invalid("Empty diagram: missing diagram type declaration");
        };
        let kind = header.split_whitespace().next().unwrap_or_default();
        if !DIAGRAM_KINDS.contains(&kind) {
            return ValidationResult::invalid(format!(
                "Unknown diagram type '{}' on first line",
                kind
            ));
        }

        let mut open_subgraphs = 0usize;
        for (number, line) in lines.enumerate() {
            let line_no = number + 2;
            if line.starts_with("subgraph") {
                open_subgraphs += 1;
            } else if line == "end" {
                if open_subgraphs == 0 {
                    return ValidationResult::invalid(format!(
                        "Line {}: 'end' without matching subgraph",
                        line_no
                    ));
                }
                open_subgraphs -= 1;
            }

            let mut stack = Vec::new();
            let mut in_quotes = false;
            for c in line.chars() {
                match c {
                    '"' => in_quotes = !in_quotes,
                    '[' | '(' | '{' if !in_quotes => stack.push(c),
                    ']' | ')' | '}' if !in_quotes => {
                        let expected = match c {
                            ']' => '[',
                            ')' => '(',
                            _ => '{',
                        };
                        // ER cardinality markers like `}|` and `|{` are not node shapes
                        if kind == "erDiagram" && stack.last() != Some(&expected) {
                            continue;
                        }
                        if stack.pop() != Some(expected) {
                            return ValidationResult::invalid(format!(
                                "Line {}: unbalanced '{}' in node shape",
                                line_no, c
                            ));
                        }
                    }
                    _ => {}
                }
            }
            if kind != "erDiagram" && !stack.is_empty() {
                return ValidationResult::invalid(format!(
                    "Line {}: unclosed node shape bracket",
                    line_no
                ));
            }
            if kind != "erDiagram"
                && (line.ends_with("-->") || line.ends_with("---") || line.starts_with("-->"))
            {
                return ValidationResult::invalid(format!(
                    "Line {}: link arrow is missing a target node",
                    line_no
                ));
            }
        }

        if open_subgraphs > 0 {
            return ValidationResult::invalid("Subgraph is missing its 'end'");
        }
        ValidationResult::valid()
    }
}

#[async_trait]
impl DiagramValidator for MermaidLint {
    async fn validate(&self, code: &str) -> ValidationResult {
        Self::check(code)
    }
}

/// Content of the first fenced block, or the whole reply trimmed
pub fn extract_code_block(reply: &str) -> String {
    FENCED_BLOCK
        .captures(reply)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| reply.trim().to_string())
}

/// Documentation excerpt matching the kind of error reported
pub fn syntax_reference_for(error: &str) -> &'static str {
    let error = error.to_lowercase();
    if ["link", "arrow", "edge", "relationship"]
        .iter()
        .any(|k| error.contains(k))
    {
        LINK_SYNTAX
    } else if ["node", "shape", "bracket", "label"]
        .iter()
        .any(|k| error.contains(k))
    {
        NODE_SYNTAX
    } else if error.contains("subgraph") || error.contains("'end'") {
        SUBGRAPH_SYNTAX
    } else {
        GENERAL_SYNTAX
    }
}

fn with_warning(code: &str, error: &str) -> String {
    let reason = error.lines().next().unwrap_or("validation failed");
    format!("%% WARNING: diagram failed validation: {}\n{}", reason, code)
}

pub struct DiagramGenerator {
    provider: SharedProvider,
    prompts: Arc<dyn PromptBuilder>,
    validator: Arc<dyn DiagramValidator>,
}

impl DiagramGenerator {
    pub fn new(
        provider: SharedProvider,
        prompts: Arc<dyn PromptBuilder>,
        validator: Arc<dyn DiagramValidator>,
    ) -> Self {
        Self {
            provider,
            prompts,
            validator,
        }
    }

    async fn ask(&self, prompt: String, ctx: &RunContext) -> Result<String, PipelineError> {
        let request = CallRequest::prompt(prompt).with_signal(ctx.cancel.clone());
        let result = self.provider.complete(request, None).await?;
        Ok(extract_code_block(&result.text))
    }

    /// Draw a diagram for `summary`, retrying once with a correction prompt if it is invalid
    pub async fn generate(
        &self,
        format: SummaryFormat,
        summary: &str,
        ctx: &RunContext,
    ) -> Result<DiagramOutput, PipelineError> {
        ctx.ensure_active()?;
        let code = self.ask(self.prompts.diagram(format, summary), ctx).await?;

        let verdict = self.validator.validate(&code).await;
        if verdict.is_valid {
            return Ok(DiagramOutput {
                code,
                valid: true,
                corrected: false,
            });
        }

        let error = verdict.error.unwrap_or_else(|| "unknown syntax error".to_string());
        info!(error = %error, "Diagram invalid, requesting correction");
        ctx.ensure_active()?;

        let prompt = self
            .prompts
            .diagram_correction(&code, &error, syntax_reference_for(&error));
        let corrected = match self.ask(prompt, ctx).await {
            Ok(corrected) => corrected,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!(error = %e, "Diagram correction call failed");
                return Ok(DiagramOutput {
                    code: with_warning(&code, &error),
                    valid: false,
                    corrected: false,
                });
            }
        };

        let verdict = self.validator.validate(&corrected).await;
        if verdict.is_valid {
            return Ok(DiagramOutput {
                code: corrected,
                valid: true,
                corrected: true,
            });
        }

        let error = verdict.error.unwrap_or(error);
        warn!(error = %error, "Diagram still invalid after correction");
        Ok(DiagramOutput {
            code: with_warning(&corrected, &error),
            valid: false,
            corrected: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockProvider;
    use crate::pipeline::prompts::DefaultPromptBuilder;

    #[test]
    fn test_extract_code_block() {
        let reply = "Here you go:\n```mermaid\ngraph TD\n  A --> B\n```\nEnjoy";
        assert_eq!(extract_code_block(reply), "graph TD\n  A --> B");
        assert_eq!(extract_code_block("  graph TD\nA-->B  "), "graph TD\nA-->B");
    }

    #[test]
    fn test_syntax_reference_routing() {
        assert_eq!(syntax_reference_for("Parse error: unexpected ARROW"), LINK_SYNTAX);
        assert_eq!(syntax_reference_for("Invalid node shape"), NODE_SYNTAX);
        assert_eq!(syntax_reference_for("subgraph never closed"), SUBGRAPH_SYNTAX);
        assert_eq!(syntax_reference_for("lexical error"), GENERAL_SYNTAX);
    }

    #[test]
    fn test_mermaid_lint() {
        assert!(MermaidLint::check("graph TD\n  A[Start] --> B(End)").is_valid);
        assert!(MermaidLint::check("erDiagram\n  CUSTOMER ||--o{ ORDER : places").is_valid);
        assert!(!MermaidLint::check("").is_valid);
        assert!(!MermaidLint::check("diagram\nA-->B").is_valid);
        assert!(!MermaidLint::check("graph TD\n  A[Start --> B").is_valid);
        assert!(!MermaidLint::check("graph TD\n  A -->").is_valid);
        assert!(!MermaidLint::check("graph TD\nsubgraph one\nA-->B").is_valid);
    }

    fn generator(provider: Arc<MockProvider>) -> DiagramGenerator {
        DiagramGenerator::new(
            provider,
            Arc::new(DefaultPromptBuilder),
            Arc::new(MermaidLint),
        )
    }

    #[tokio::test]
    async fn test_valid_diagram_needs_one_call() {
        let provider = MockProvider::fixed("```mermaid\ngraph TD\nA-->B\n```").into_shared();
        let output = generator(Arc::clone(&provider))
            .generate(SummaryFormat::ReverseEngineering, "summary", &RunContext::default())
            .await
            .unwrap();
        assert!(output.valid);
        assert!(!output.corrected);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_diagram_corrected_once() {
        let provider = MockProvider::new(|request| {
            let prompt = crate::llm::mock_provider::last_user_message(request);
            if prompt.contains("fails to parse") {
                Ok("```mermaid\ngraph TD\nA[Start] --> B\n```".to_string())
            } else {
                Ok("```mermaid\ngraph TD\nA[Start --> B\n```".to_string())
            }
        })
        .into_shared();
        let output = generator(Arc::clone(&provider))
            .generate(SummaryFormat::ReverseEngineering, "summary", &RunContext::default())
            .await
            .unwrap();
        assert!(output.valid);
        assert!(output.corrected);
        assert_eq!(output.code, "graph TD\nA[Start] --> B");
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_still_invalid_gets_warning_prefix() {
        let provider = MockProvider::fixed("graph TD\nA -->").into_shared();
        let output = generator(Arc::clone(&provider))
            .generate(SummaryFormat::ReverseEngineering, "summary", &RunContext::default())
            .await
            .unwrap();
        assert!(!output.valid);
        assert!(output.code.starts_with("%% WARNING:"));
        assert!(output.code.ends_with("graph TD\nA -->"));
        assert_eq!(provider.call_count(), 2);
    }
}
