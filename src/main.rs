use scriptorium::cli::{Args, ConfigDiscovery, DocumentConfig, ExecutionMode, GlobalOptions, SummarizeConfig};
use scriptorium::env::{DEFAULT_LOG_FILTER, EXIT_ABORTED};
use scriptorium::llm::ProviderRegistry;
use scriptorium::pipeline::{PipelineError, ProgressReporter, ProgressUpdate, RunContext};
use scriptorium::{ContentSuite, SuiteConfig};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mode = match args.mode() {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, cancelling");
            trigger.cancel();
        }
    });

    if let Err(e) = run(mode, args.globals(), cancel).await {
        let aborted = e
            .downcast_ref::<PipelineError>()
            .is_some_and(PipelineError::is_cancelled);
        if aborted {
            eprintln!("Aborted by user");
            std::process::exit(EXIT_ABORTED);
        }
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(mode: ExecutionMode, globals: GlobalOptions, cancel: CancellationToken) -> Result<()> {
    match mode {
        ExecutionMode::ShowConfig { init } => {
            if init {
                let path = ConfigDiscovery::create_default_user_config()?;
                eprintln!("✅ Default configuration at {:?}", path);
            }
            ConfigDiscovery::show_discovery_info();
            Ok(())
        }
        ExecutionMode::Providers { refresh_local } => {
            let config = load_config(&globals)?;
            show_providers(&config, refresh_local).await
        }
        ExecutionMode::Summarize(config) => run_summarize(config, &globals, cancel).await,
        ExecutionMode::Style(document) => {
            let (suite, text, ctx) = prepare(&document, &globals, cancel)?;
            let result = suite.extract_style(&text, &ctx).await?;
            if document.json {
                write_json(&document, &result)
            } else {
                write_output(&document, &result.style_guide)
            }
        }
        ExecutionMode::FormatMath(document) => {
            let (suite, text, ctx) = prepare(&document, &globals, cancel)?;
            let result = suite.format_math(&text, &ctx).await?;
            if result.fallback_chunks > 0 {
                eprintln!(
                    "⚠️  {} chunk(s) could not be reformatted and were kept as-is",
                    result.fallback_chunks
                );
            }
            if document.json {
                write_json(&document, &result)
            } else {
                write_output(&document, &result.text)
            }
        }
    }
}

fn load_config(globals: &GlobalOptions) -> Result<SuiteConfig> {
    let mut config = ConfigDiscovery::load(globals.config_override.as_deref())?;
    if let Some(provider) = &globals.provider {
        config.provider.provider_id = provider.clone();
        // A model chosen for another provider is meaningless here
        if globals.model.is_none() {
            config.provider.model.clear();
        }
    }
    if let Some(model) = &globals.model {
        config.provider.model = model.clone();
    }
    Ok(config)
}

fn progress_printer(verbose: bool) -> ProgressReporter {
    ProgressReporter::new(Arc::new(move |update: ProgressUpdate| {
        let mut line = format!("[{:>5.1}%] {}: {}", update.percentage, update.stage, update.message);
        if let Some(etr) = update.etr_seconds {
            line.push_str(&format!(" (~{}s left)", etr));
        }
        if verbose && let Some(hint) = &update.thinking_hint {
            line.push_str(&format!(" | {}", hint));
        }
        eprintln!("{}", line);
    }))
}

fn prepare(
    document: &DocumentConfig,
    globals: &GlobalOptions,
    cancel: CancellationToken,
) -> Result<(ContentSuite, String, RunContext)> {
    let config = load_config(globals)?;
    let text = std::fs::read_to_string(&document.input)
        .with_context(|| format!("Failed to read {:?}", document.input))?;
    let suite = ContentSuite::from_config(config)?;
    let ctx = RunContext::new(cancel, progress_printer(globals.verbose));
    Ok((suite, text, ctx))
}

async fn run_summarize(
    config: SummarizeConfig,
    globals: &GlobalOptions,
    cancel: CancellationToken,
) -> Result<()> {
    let (suite, text, ctx) = prepare(&config.document, globals, cancel)?;
    let result = suite.summarize(&text, &config.options, &ctx).await?;

    if config.document.json {
        return write_json(&config.document, &result);
    }

    let mut out = result.final_summary.clone();
    if let Some(diagram) = &result.diagram {
        out.push_str(&format!("\n\n```mermaid\n{}\n```\n", diagram.code));
    }
    if !result.highlights.is_empty() {
        out.push_str("\n\n## Highlights\n\n");
        for highlight in &result.highlights {
            out.push_str(&format!("- {}\n", highlight.text));
        }
    }
    if globals.verbose {
        eprintln!(
            "📊 {:?} mode: {} chunk(s), {} failed, {} reduction level(s), {} call(s) in {:.1}s",
            result.stats.mode,
            result.stats.chunks,
            result.stats.failed_units,
            result.stats.reduction_levels,
            result.stats.provider_calls,
            result.stats.elapsed.as_secs_f64()
        );
    }
    write_output(&config.document, &out)
}

fn write_json<T: Serialize>(document: &DocumentConfig, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize result")?;
    write_output(document, &json)
}

fn write_output(document: &DocumentConfig, content: &str) -> Result<()> {
    match &document.output {
        Some(path) => write_file(path, content),
        None => {
            println!("{}", content);
            Ok(())
        }
    }
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))?;
    eprintln!("✅ Wrote {:?}", path);
    Ok(())
}

async fn show_providers(config: &SuiteConfig, refresh_local: bool) -> Result<()> {
    let registry = ProviderRegistry::default();
    if refresh_local {
        let http = reqwest::Client::new();
        match registry.refresh_local_models(&http).await {
            Ok(count) => eprintln!("🔄 Found {} local model(s)", count),
            Err(e) => eprintln!("⚠️  Could not refresh local models: {}", e),
        }
    }

    println!("Providers:");
    for provider in registry.list() {
        let active = if provider.id == config.provider.provider_id {
            " (active)"
        } else {
            ""
        };
        let key = match (&provider.api_key_env, provider.requires_api_key) {
            (Some(var), true) => format!("key from ${}", var),
            (None, true) => "key required".to_string(),
            (_, false) => "no key".to_string(),
        };
        println!("\n  {}{} - {} [{}]", provider.id, active, provider.label, key);
        println!("    {}", provider.base_url);
        for model in &provider.models {
            let mut tags = Vec::new();
            if model.id == provider.default_model {
                tags.push("default");
            }
            if model.reasoning {
                tags.push("reasoning");
            }
            let tags = if tags.is_empty() {
                String::new()
            } else {
                format!(" ({})", tags.join(", "))
            };
            println!("    - {}{}", model.id, tags);
        }
    }
    Ok(())
}
