//! aisearch CLI: runs the retrieval-augmented generation pipelines.
//!
//! Every subcommand builds (or reloads) its indexes, runs a list of questions
//! through them and prints the answers.

mod display;
mod pipelines;
mod questions;

use anyhow::Context;
use clap::Parser;
use pipelines::PipelineContext;
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// aisearch: experimental RAG pipelines over local documents
#[derive(Parser, Debug)]
#[command(name = "aisearch", version, about, long_about = None)]
struct Cli {
    /// Reuse indexes persisted by an earlier run instead of rebuilding them
    #[arg(short, long, global = true)]
    load_from_storage: bool,

    /// Question to ask (repeatable); overrides the built-in list
    #[arg(short = 'q', long = "question", global = true)]
    questions: Vec<String>,

    /// File with one question per line (relative to the questions directory)
    #[arg(long, global = true)]
    questions_file: Option<PathBuf>,

    /// LLM model to use
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Workspace directory
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug, Clone, Copy)]
enum Commands {
    /// Vector index over the essay, answers only
    Basic,
    /// Vector index with faithfulness and relevancy evaluation
    BasicVector,
    /// Semantic chunking compared against sentence chunking
    Semantic,
    /// Knowledge graph index with hybrid retrieval and evaluation
    KnowledgeGraph,
    /// Knowledge graph index, answers only
    Graph,
    /// Metadata extraction and sub-question decomposition over SEC filings
    Metadata {
        /// Also derive the `custom` key from title and keywords
        #[arg(long)]
        custom_extractor: bool,
    },
    /// One agent per documentation page behind a top-level ReAct agent
    Agentic,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Basic => "basic",
            Commands::BasicVector => "basic-vector",
            Commands::Semantic => "semantic",
            Commands::KnowledgeGraph => "knowledge-graph",
            Commands::Graph => "graph",
            Commands::Metadata { .. } => "metadata",
            Commands::Agentic => "agentic",
        }
    }
}

/// `YYYY-MM-DD_HH-MM-SS_log.txt` for the run starting now.
fn log_file_name(now: chrono::DateTime<chrono::Local>) -> String {
    format!("{}_log.txt", now.format("%Y-%m-%d_%H-%M-%S"))
}

fn resolve_workspace(workspace: &Path) -> PathBuf {
    workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let workspace = resolve_workspace(&cli.workspace);

    let mut config = aisearch_core::load_config(Some(&workspace), cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    if let Some(model) = &cli.model {
        config.llm.model = model.clone();
    }
    let paths = config.paths.resolved(&workspace);

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    std::fs::create_dir_all(&paths.log_dir)
        .with_context(|| format!("creating log directory {}", paths.log_dir.display()))?;
    let file_appender =
        tracing_appender::rolling::never(&paths.log_dir, log_file_name(chrono::Local::now()));
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let (source, questions) = questions::resolve(
        cli.command.name(),
        &cli.questions,
        cli.questions_file.as_deref(),
        &paths.questions_dir,
    )?;
    tracing::info!(questions = %source, count = questions.len(), "Questions");
    tracing::info!(model = %config.llm.model, "Generation model");

    let ctx = PipelineContext::new(config, paths, workspace, questions, cli.load_from_storage)?;
    let result = match cli.command {
        Commands::Basic => pipelines::basic::run(&ctx, false).await,
        Commands::BasicVector => pipelines::basic::run(&ctx, true).await,
        Commands::Semantic => pipelines::semantic::run(&ctx).await,
        Commands::KnowledgeGraph => pipelines::knowledge_graph::run(&ctx, true).await,
        Commands::Graph => pipelines::knowledge_graph::run(&ctx, false).await,
        Commands::Metadata { custom_extractor } => {
            pipelines::metadata::run(&ctx, custom_extractor).await
        }
        Commands::Agentic => pipelines::agentic::run(&ctx).await,
    };
    ctx.log_token_usage();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_log_file_name_is_start_timestamp() {
        let at = chrono::Local.with_ymd_and_hms(2024, 5, 7, 9, 3, 1).unwrap();
        assert_eq!(log_file_name(at), "2024-05-07_09-03-01_log.txt");
    }

    #[test]
    fn test_cli_parses_repeated_questions() {
        let cli = Cli::try_parse_from([
            "aisearch",
            "basic-vector",
            "-q",
            "What did the author do growing up?",
            "--question",
            "Who bought Viaweb?",
            "--load-from-storage",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::BasicVector));
        assert_eq!(cli.questions.len(), 2);
        assert!(cli.load_from_storage);
    }

    #[test]
    fn test_cli_metadata_flag() {
        let cli = Cli::try_parse_from(["aisearch", "metadata", "--custom-extractor"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Metadata {
                custom_extractor: true
            }
        ));
        assert_eq!(cli.command.name(), "metadata");
    }
}
