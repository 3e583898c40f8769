//! # LLM Module
//!
//! The Model Client boundary. Everything above this module sees one trait,
//! [`ModelClient`], and one result type, [`ModelResponse`]. Provider quirks
//! (reasoning blocks, padding, empty replies) are handled once, in
//! [`ModelResponse::from_raw`].
//!
//! - [`OllamaModel`]: the production client, built on Rig's Ollama provider
//! - [`RecordingModel`]: wraps any client and writes every exchange to the
//!   conversation log

use async_trait::async_trait;
use regex::Regex;
use rig::client::{CompletionClient, ProviderClient};
use rig::completion::Prompt;
use rig::providers::ollama;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::conversation::{ConversationLog, Role};
use crate::error::ModelError;

/// Reasoning models served by Ollama wrap their chain of thought in these.
static THINK_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid think regex"));

/// The system prompt shared by every generation step.
const REPORT_WRITER_PREAMBLE: &str = "You are a meticulous research analyst. \
You write well-structured Markdown reports grounded in the material you are given, \
with concrete examples, names, dates and places wherever the sources provide them.";

// =============================================================================
// NORMALIZED RESPONSE
// =============================================================================
/// The only shape a model reply takes once it leaves this module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelResponse {
    pub content: String,
}

impl ModelResponse {
    /// Normalize a raw completion: drop `<think>` blocks, trim, reject empty.
    pub fn from_raw(raw: impl AsRef<str>) -> Result<Self, ModelError> {
        let stripped = THINK_BLOCK.replace_all(raw.as_ref(), "");
        let content = stripped.trim();

        if content.is_empty() {
            return Err(ModelError::EmptyResponse);
        }

        Ok(Self {
            content: content.to_string(),
        })
    }
}

// =============================================================================
// MODEL CLIENT TRAIT
// =============================================================================
/// Given a prompt and a token budget, return generated text.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, prompt: &str, max_tokens: u64) -> Result<ModelResponse, ModelError>;
}

// =============================================================================
// OLLAMA CLIENT
// =============================================================================
/// Model client for a local Ollama server, via Rig.
pub struct OllamaModel {
    client: ollama::Client,
    model: String,
    temperature: f64,
}

impl OllamaModel {
    /// Create the client from the pipeline configuration.
    ///
    /// Rig's Ollama client reads `OLLAMA_API_BASE_URL`, so the configured
    /// host is exported before the client is built.
    pub fn new(config: &Config) -> Self {
        std::env::set_var("OLLAMA_API_BASE_URL", &config.ollama_host);
        let client = ollama::Client::from_env();

        debug!(
            host = %config.ollama_host,
            model = %config.model,
            "Ollama client ready"
        );

        Self {
            client,
            model: config.model.clone(),
            temperature: f64::from(config.temperature),
        }
    }
}

#[async_trait]
impl ModelClient for OllamaModel {
    async fn generate(&self, prompt: &str, max_tokens: u64) -> Result<ModelResponse, ModelError> {
        // A fresh agent per call: the token budget differs between stages.
        let agent = self
            .client
            .agent(&self.model)
            .preamble(REPORT_WRITER_PREAMBLE)
            .temperature(self.temperature)
            .max_tokens(max_tokens)
            .build();

        info!(model = %self.model, max_tokens, "Sending prompt to model");

        let raw = agent
            .prompt(prompt)
            .await
            .map_err(|e| ModelError::Completion(e.to_string()))?;

        ModelResponse::from_raw(raw)
    }
}

// =============================================================================
// RECORDING WRAPPER
// =============================================================================
/// Logs every exchange of the wrapped client to the conversation log.
///
/// The prompt is recorded as a `user` entry before the call. The reply is
/// recorded as `assistant`, or the failure as `system`. A failed log write
/// is only a warning here; the pipeline flushes the log at the end and
/// reports persistent failures there.
pub struct RecordingModel {
    inner: Arc<dyn ModelClient>,
    log: Arc<ConversationLog>,
}

impl RecordingModel {
    pub fn new(inner: Arc<dyn ModelClient>, log: Arc<ConversationLog>) -> Self {
        Self { inner, log }
    }

    fn record(&self, role: Role, content: &str) {
        if let Err(e) = self.log.append(role, content) {
            warn!(error = %e, "Failed to persist conversation entry");
        }
    }
}

#[async_trait]
impl ModelClient for RecordingModel {
    async fn generate(&self, prompt: &str, max_tokens: u64) -> Result<ModelResponse, ModelError> {
        self.record(Role::User, prompt);

        let result = self.inner.generate(prompt, max_tokens).await;
        match &result {
            Ok(response) => self.record(Role::Assistant, &response.content),
            Err(e) => self.record(Role::System, &format!("Model call failed: {e}")),
        }

        result
    }
}
