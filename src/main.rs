//! # Research Reporter
//!
//! Turns a topic into a researched HTML report using a local LLM.
//!
//! The pipeline:
//! - searches the web (DuckDuckGo) and scrapes the top results
//! - has the model write an initial Markdown report
//! - asks the model for information gaps and follow-up questions
//! - researches the follow-up questions
//! - has the model fold the new material into an enhanced report
//! - renders the report as a standalone HTML page
//!
//! Every prompt and reply is saved to a JSON conversation log.
//!
//! ## Quick Start
//! ```bash
//! cargo run -- quantum computing in drug discovery
//! ```

// =============================================================================
// MODULE DECLARATIONS
// =============================================================================
/// Configuration management
mod config;

/// Typed errors for every pipeline boundary
mod error;

/// Web search and page fetching
mod tools;

/// Model client boundary
mod llm;

/// Conversation log persistence
mod conversation;

/// Search-and-scrape batches
mod collector;

/// The two-pass report protocol
mod synthesizer;

/// Markdown to HTML report page
mod render;

/// End-to-end orchestration
mod pipeline;

#[cfg(test)]
mod testing;

// =============================================================================
// IMPORTS
// =============================================================================
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::conversation::ConversationStore;
use crate::llm::OllamaModel;
use crate::pipeline::{Pipeline, TracingObserver};
use crate::tools::{DuckDuckGoSearch, HttpFetcher};

// =============================================================================
// CLI ARGUMENTS
// =============================================================================
/// # Rust Concept: Derive Macros with Clap
///
/// The struct is the CLI definition. `Vec<String>` with `num_args = 1..`
/// collects every positional word, so the topic needs no quoting.
#[derive(Parser, Debug)]
#[command(
    name = "research-reporter",
    version = "0.1.0",
    about = "Researches a topic on the web and writes an AI-generated HTML report",
    long_about = r#"
Research Reporter - from a topic to a sourced HTML report.

The tool searches the web, scrapes the top results and has a local LLM (via
Ollama) write a report. It then asks the model what the report is missing,
researches three follow-up questions and produces an enhanced final report.

OUTPUT:
  reports/<topic>_report.html           the rendered report
  debug/<timestamp>_<topic>.json        every prompt and reply
  debug/results.txt, debug/questions.txt

PREREQUISITES:
  1. Install Ollama: https://ollama.ai
  2. Pull a model: ollama pull llama3.2
  3. Start Ollama: ollama serve

EXAMPLES:
  research-reporter history of the printing press
  research-reporter --model qwen2.5 -n 5 "solid-state batteries"
"#
)]
struct Args {
    /// The topic to research; all words are joined with spaces
    #[arg(required = true, num_args = 1.., value_name = "TOPIC")]
    topic: Vec<String>,

    /// The Ollama model to use (overrides OLLAMA_MODEL)
    #[arg(short = 'm', long = "model", env = "OLLAMA_MODEL")]
    model: Option<String>,

    /// Search results to scrape per query (overrides MAX_SEARCH_RESULTS)
    #[arg(short = 'n', long = "results")]
    results: Option<usize>,

    /// Directory for the HTML report (overrides REPORTS_DIR)
    #[arg(long = "reports-dir")]
    reports_dir: Option<PathBuf>,

    /// Directory for conversation logs and side files (overrides DEBUG_DIR)
    #[arg(long = "debug-dir")]
    debug_dir: Option<PathBuf>,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long = "verbose", default_value = "false")]
    verbose: bool,
}

impl Args {
    fn topic(&self) -> String {
        self.topic.join(" ")
    }

    /// Apply command-line overrides on top of the environment config.
    fn apply(&self, config: &mut Config) {
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(results) = self.results {
            config.max_search_results = results;
        }
        if let Some(dir) = &self.reports_dir {
            config.reports_dir = dir.clone();
        }
        if let Some(dir) = &self.debug_dir {
            config.debug_dir = dir.clone();
        }
    }
}

// =============================================================================
// MAIN FUNCTION
// =============================================================================
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::from_env().context("Failed to load configuration")?;
    args.apply(&mut config);

    init_logging(args.verbose, &config.log_level)?;

    config.validate()?;

    let topic = args.topic();
    info!(
        topic = %topic,
        model = %config.model,
        host = %config.ollama_host,
        results = config.max_search_results,
        "Configuration loaded"
    );

    let timeout = Duration::from_secs(config.fetch_timeout_secs);
    let search = DuckDuckGoSearch::new(timeout).context("Failed to build search client")?;
    let fetcher = HttpFetcher::new(timeout, config.max_content_chars)
        .context("Failed to build page fetcher")?;
    let model = OllamaModel::new(&config);

    let pipeline = Pipeline::new(
        config,
        Arc::new(search),
        Arc::new(fetcher),
        Arc::new(model),
        Arc::new(TracingObserver),
    );

    match pipeline.run(&topic).await {
        Ok(artifacts) => {
            // Read the log back so a truncated or unreadable file is reported now.
            let entries = ConversationStore::load(&artifacts.conversation_path)
                .context("Saved conversation log could not be read back")?;

            println!("Report:       {}", artifacts.report_path.display());
            println!(
                "Conversation: {} ({} entries)",
                artifacts.conversation_path.display(),
                entries.len()
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Research failed");
            Err(e).context("Failed to save research artifacts")
        }
    }
}

// =============================================================================
// LOGGING INITIALIZATION
// =============================================================================
/// Install the global tracing subscriber.
///
/// `RUST_LOG` directives win when they parse; `--verbose` forces `debug`.
fn init_logging(verbose: bool, level: &str) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}

// =============================================================================
// UNIT TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_words_are_joined() {
        let args = Args::parse_from(["test", "quantum", "computing", "basics"]);
        assert_eq!(args.topic(), "quantum computing basics");
        assert!(!args.verbose);
        assert!(args.results.is_none());
    }

    #[test]
    fn test_args_with_flags() {
        let args = Args::parse_from([
            "test",
            "--verbose",
            "--model",
            "qwen2.5",
            "-n",
            "5",
            "--reports-dir",
            "out",
            "Test topic",
        ]);

        assert_eq!(args.topic(), "Test topic");
        assert!(args.verbose);
        assert_eq!(args.model, Some("qwen2.5".to_string()));
        assert_eq!(args.results, Some(5));
        assert_eq!(args.reports_dir, Some(PathBuf::from("out")));
    }

    #[test]
    fn test_topic_is_required() {
        assert!(Args::try_parse_from(["test"]).is_err());
    }

    #[test]
    fn test_overrides_apply_to_config() {
        let args = Args::parse_from(["test", "-n", "7", "--debug-dir", "dbg", "topic"]);
        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.max_search_results, 7);
        assert_eq!(config.debug_dir, PathBuf::from("dbg"));
        assert_eq!(config.reports_dir, PathBuf::from("reports"));
    }
}
