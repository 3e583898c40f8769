//! # Configuration Module
//!
//! Loads the pipeline configuration from environment variables (and an
//! optional `.env` file). Every value has a sensible default, so a bare
//! `research-reporter "topic"` works against a local Ollama install.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

// =============================================================================
// CONFIGURATION STRUCT
// =============================================================================
/// Main configuration for the research pipeline.
///
/// # Rust Concept: Derive Macros
/// - Debug: Allows printing with {:?} format
/// - Clone: The pipeline and `main` both keep a copy
#[derive(Debug, Clone)]
pub struct Config {
    /// The Ollama model to use (e.g., "llama3.2", "deepseek-v3.2")
    pub model: String,

    /// Ollama server URL (default: http://localhost:11434)
    pub ollama_host: String,

    /// Temperature for LLM responses (0.0 = deterministic, 1.0 = creative)
    pub temperature: f32,

    /// Number of search results fetched per query (initial and follow-up)
    pub max_search_results: usize,

    /// Token ceiling for every model call
    pub max_tokens: u64,

    /// Scraped page text is truncated to this many characters
    pub max_content_chars: usize,

    /// Per-request HTTP timeout for search and page fetches
    pub fetch_timeout_secs: u64,

    /// Where the HTML reports are written
    pub reports_dir: PathBuf,

    /// Where the conversation logs and debug side files are written
    pub debug_dir: PathBuf,

    /// Log level for the application
    pub log_level: String,
}

// =============================================================================
// DEFAULT IMPLEMENTATION
// =============================================================================
impl Default for Config {
    fn default() -> Self {
        Self {
            model: "llama3.2".to_string(),
            ollama_host: "http://localhost:11434".to_string(),
            temperature: 0.7,
            max_search_results: 3,
            max_tokens: 2000,
            max_content_chars: 5000,
            fetch_timeout_secs: 30,
            reports_dir: PathBuf::from("reports"),
            debug_dir: PathBuf::from("debug"),
            log_level: "info".to_string(),
        }
    }
}

// =============================================================================
// CONFIGURATION LOADING
// =============================================================================
impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Rust Concept: The ? Operator
    ///
    /// If a numeric variable fails to parse, `?` returns early with the
    /// error, and `.context()` says which variable was wrong.
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (silently ignore if not found)
        let _ = dotenvy::dotenv();

        let mut config = Config::default();

        if let Ok(val) = env::var("OLLAMA_MODEL") {
            config.model = val;
        }

        if let Ok(val) = env::var("OLLAMA_API_BASE_URL") {
            config.ollama_host = val;
        }

        if let Ok(val) = env::var("TEMPERATURE") {
            config.temperature = val
                .parse()
                .context("TEMPERATURE must be a valid floating-point number (e.g., 0.7)")?;
        }

        if let Ok(val) = env::var("MAX_SEARCH_RESULTS") {
            config.max_search_results = val
                .parse()
                .context("MAX_SEARCH_RESULTS must be a valid positive integer")?;
        }

        if let Ok(val) = env::var("MAX_TOKENS") {
            config.max_tokens = val
                .parse()
                .context("MAX_TOKENS must be a valid positive integer")?;
        }

        if let Ok(val) = env::var("MAX_CONTENT_CHARS") {
            config.max_content_chars = val
                .parse()
                .context("MAX_CONTENT_CHARS must be a valid positive integer")?;
        }

        if let Ok(val) = env::var("FETCH_TIMEOUT_SECS") {
            config.fetch_timeout_secs = val
                .parse()
                .context("FETCH_TIMEOUT_SECS must be a number of seconds")?;
        }

        if let Ok(val) = env::var("REPORTS_DIR") {
            config.reports_dir = PathBuf::from(val);
        }

        if let Ok(val) = env::var("DEBUG_DIR") {
            config.debug_dir = PathBuf::from(val);
        }

        if let Ok(val) = env::var("RUST_LOG") {
            config.log_level = val;
        }

        Ok(config)
    }

    /// Validate the configuration before the pipeline starts.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            anyhow::bail!(
                "Temperature must be between 0.0 and 2.0, got: {}",
                self.temperature
            );
        }

        if self.max_search_results == 0 {
            anyhow::bail!("MAX_SEARCH_RESULTS must be at least 1");
        }

        if self.max_tokens == 0 {
            anyhow::bail!("MAX_TOKENS must be at least 1");
        }

        if self.max_content_chars == 0 {
            anyhow::bail!("MAX_CONTENT_CHARS must be at least 1");
        }

        if self.model.is_empty() {
            anyhow::bail!("OLLAMA_MODEL cannot be empty");
        }

        if self.reports_dir.as_os_str().is_empty() || self.debug_dir.as_os_str().is_empty() {
            anyhow::bail!("REPORTS_DIR and DEBUG_DIR cannot be empty");
        }

        Ok(())
    }
}
