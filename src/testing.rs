//! Scripted stand-ins for the search, fetch and model collaborators.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{FetchError, ModelError, SearchError};
use crate::llm::{ModelClient, ModelResponse};
use crate::tools::{ContentFetcher, PageContent, SearchProvider};

/// Answers prompts by substring match, first rule wins.
#[derive(Default)]
pub struct ScriptedModel {
    rules: Vec<(String, Result<String, String>)>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, needle: &str, text: &str) -> Self {
        self.rules.push((needle.to_string(), Ok(text.to_string())));
        self
    }

    pub fn fail_on(mut self, needle: &str, message: &str) -> Self {
        self.rules.push((needle.to_string(), Err(message.to_string())));
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn generate(&self, prompt: &str, _max_tokens: u64) -> Result<ModelResponse, ModelError> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        match self.rules.iter().find(|(needle, _)| prompt.contains(needle.as_str())) {
            Some((_, Ok(text))) => ModelResponse::from_raw(text),
            Some((_, Err(message))) => Err(ModelError::Completion(message.clone())),
            None => ModelResponse::from_raw("Default model reply"),
        }
    }
}

/// Returns canned URL lists per query; unknown queries find nothing.
#[derive(Default)]
pub struct ScriptedSearch {
    results: HashMap<String, Vec<String>>,
    failing: Vec<String>,
    queries: Mutex<Vec<String>>,
}

impl ScriptedSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(mut self, query: &str, urls: &[&str]) -> Self {
        self.results
            .insert(query.to_string(), urls.iter().map(|u| u.to_string()).collect());
        self
    }

    pub fn failing(mut self, query: &str) -> Self {
        self.failing.push(query.to_string());
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for ScriptedSearch {
    async fn search(&self, query: &str, _max_results: usize) -> Result<Vec<String>, SearchError> {
        self.queries.lock().unwrap().push(query.to_string());

        if self.failing.iter().any(|q| q == query) {
            return Err(SearchError::RateLimited);
        }
        // Deliberately ignores max_results so the collector's cap is exercised.
        Ok(self.results.get(query).cloned().unwrap_or_default())
    }
}

/// Serves a synthetic page for every URL except the ones set to fail.
#[derive(Default)]
pub struct ScriptedFetcher {
    failures: HashMap<String, FetchError>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, url: &str, error: FetchError) -> Self {
        self.failures.insert(url.to_string(), error);
        self
    }
}

#[async_trait]
impl ContentFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<PageContent, FetchError> {
        if let Some(error) = self.failures.get(url) {
            return Err(error.clone());
        }
        Ok(PageContent {
            title: format!("Title of {url}"),
            text: format!("Content of {url}"),
        })
    }
}
