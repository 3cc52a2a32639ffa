//! Command line argument parsing
//!
//! Subcommands:
//! - `summarize`: Summarize a document, optionally with a diagram and highlights
//! - `style`: Extract a writing style guide from a document
//! - `format-math`: Rewrite math notation with LaTeX delimiters, line by line
//! - `providers`: List known providers and models
//! - `show-config`: Show configuration discovery information

use crate::pipeline::{ChunkingMode, SummaryFormat, SummaryOptions};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug)]
pub enum ExecutionMode {
    Summarize(SummarizeConfig),
    Style(DocumentConfig),
    FormatMath(DocumentConfig),
    Providers { refresh_local: bool },
    ShowConfig { init: bool },
}

/// Input and output shared by every document command
#[derive(Debug, Clone)]
pub struct DocumentConfig {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub json: bool,
}

#[derive(Debug, Clone)]
pub struct SummarizeConfig {
    pub document: DocumentConfig,
    pub options: SummaryOptions,
}

/// Settings that apply to every subcommand
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub config_override: Option<PathBuf>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub verbose: bool,
}

#[derive(Debug, Parser)]
#[command(name = "scriptorium")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Summarize, analyze and reformat long documents with any LLM provider")]
#[command(long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,
    /// Provider id override (e.g. openai, anthropic, ollama)
    #[arg(long = "provider", global = true)]
    pub provider: Option<String>,
    /// Model id override
    #[arg(long = "model", global = true)]
    pub model: Option<String>,
    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Summarize a document
    Summarize {
        /// Document to summarize
        file: PathBuf,
        /// Summary flavor: technical, entities or reverse
        #[arg(short = 'f', long = "format", default_value = "technical")]
        format: SummaryFormat,
        /// Chunking mode: auto, flat or hierarchical
        #[arg(short = 'm', long = "mode")]
        mode: Option<ChunkingMode>,
        /// Skip diagram generation
        #[arg(long = "no-diagram")]
        no_diagram: bool,
        /// Skip highlight extraction
        #[arg(long = "no-highlights")]
        no_highlights: bool,
        /// Print the full result as JSON
        #[arg(long = "json")]
        json: bool,
        /// Write the result to a file instead of stdout
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// Extract a writing style guide
    Style {
        file: PathBuf,
        #[arg(long = "json")]
        json: bool,
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// Reformat math notation, preserving every line
    FormatMath {
        file: PathBuf,
        #[arg(long = "json")]
        json: bool,
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// List known providers and their models
    Providers {
        /// Query the local inference server for installed models
        #[arg(long = "refresh-local")]
        refresh_local: bool,
    },
    /// Show configuration discovery information
    ShowConfig {
        /// Write a default ~/.scriptorium/config.toml if none exists
        #[arg(long)]
        init: bool,
    },
}

impl Args {
    pub fn parse() -> Self {
        Parser::parse()
    }

    pub fn globals(&self) -> GlobalOptions {
        GlobalOptions {
            config_override: self.config.clone(),
            provider: self.provider.clone(),
            model: self.model.clone(),
            verbose: self.verbose,
        }
    }

    pub fn mode(&self) -> Result<ExecutionMode, String> {
        match &self.command {
            Some(Commands::Summarize {
                file,
                format,
                mode,
                no_diagram,
                no_highlights,
                json,
                output,
            }) => Ok(ExecutionMode::Summarize(SummarizeConfig {
                document: DocumentConfig {
                    input: file.clone(),
                    output: output.clone(),
                    json: *json,
                },
                options: SummaryOptions {
                    format: *format,
                    mode: *mode,
                    diagram: !no_diagram,
                    highlights: !no_highlights,
                },
            })),
            Some(Commands::Style { file, json, output }) => {
                Ok(ExecutionMode::Style(DocumentConfig {
                    input: file.clone(),
                    output: output.clone(),
                    json: *json,
                }))
            }
            Some(Commands::FormatMath { file, json, output }) => {
                Ok(ExecutionMode::FormatMath(DocumentConfig {
                    input: file.clone(),
                    output: output.clone(),
                    json: *json,
                }))
            }
            Some(Commands::Providers { refresh_local }) => Ok(ExecutionMode::Providers {
                refresh_local: *refresh_local,
            }),
            Some(Commands::ShowConfig { init }) => Ok(ExecutionMode::ShowConfig { init: *init }),
            None => Err(
                "No command specified. Use 'scriptorium --help' to see available commands."
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_summarize_defaults() {
        let args = parse(&["scriptorium", "summarize", "doc.md"]);
        let ExecutionMode::Summarize(config) = args.mode().unwrap() else {
            panic!("Expected Summarize mode");
        };
        assert_eq!(config.document.input, PathBuf::from("doc.md"));
        assert_eq!(config.options.format, SummaryFormat::Technical);
        assert_eq!(config.options.mode, None);
        assert!(config.options.diagram);
        assert!(config.options.highlights);
        assert!(!config.document.json);
    }

    #[test]
    fn test_summarize_flags() {
        let args = parse(&[
            "scriptorium",
            "summarize",
            "doc.md",
            "--format",
            "entities",
            "--mode",
            "hierarchical",
            "--no-diagram",
            "--no-highlights",
            "--json",
            "-o",
            "out.json",
        ]);
        let ExecutionMode::Summarize(config) = args.mode().unwrap() else {
            panic!("Expected Summarize mode");
        };
        assert_eq!(config.options.format, SummaryFormat::EntityRelationship);
        assert_eq!(config.options.mode, Some(ChunkingMode::Hierarchical));
        assert!(!config.options.diagram);
        assert!(!config.options.highlights);
        assert!(config.document.json);
        assert_eq!(config.document.output, Some(PathBuf::from("out.json")));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = parse(&[
            "scriptorium",
            "format-math",
            "notes.tex",
            "--provider",
            "ollama",
            "--model",
            "qwen3",
            "-v",
        ]);
        let globals = args.globals();
        assert_eq!(globals.provider.as_deref(), Some("ollama"));
        assert_eq!(globals.model.as_deref(), Some("qwen3"));
        assert!(globals.verbose);
        assert!(matches!(args.mode().unwrap(), ExecutionMode::FormatMath(_)));
    }

    #[test]
    fn test_invalid_format_rejected() {
        assert!(Args::try_parse_from(["scriptorium", "summarize", "a", "--format", "poem"]).is_err());
    }

    #[test]
    fn test_providers_command() {
        let args = parse(&["scriptorium", "providers", "--refresh-local"]);
        assert!(matches!(
            args.mode().unwrap(),
            ExecutionMode::Providers { refresh_local: true }
        ));
    }

    #[test]
    fn test_show_config_init() {
        let args = parse(&["scriptorium", "show-config", "--init"]);
        assert!(matches!(args.mode().unwrap(), ExecutionMode::ShowConfig { init: true }));
        let args = parse(&["scriptorium", "show-config"]);
        assert!(matches!(args.mode().unwrap(), ExecutionMode::ShowConfig { init: false }));
    }

    #[test]
    fn test_no_command_error() {
        let args = Args {
            config: None,
            provider: None,
            model: None,
            verbose: false,
            command: None,
        };
        assert!(args.mode().is_err());
    }
}
