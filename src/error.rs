//! # Error Types
//!
//! One enum per failure family in the pipeline. Most of them never stop a run:
//! the caller turns them into data (an errored record, an empty batch, an
//! error draft, an error page). Only [`PersistenceError`] is propagated to
//! `main`, because without the written files there is nothing to return.

use std::path::PathBuf;
use thiserror::Error;

// =============================================================================
// FETCH ERRORS
// =============================================================================
/// Failure fetching a single page. Stored on the `SourceRecord` as text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Timeout fetching: {0}")]
    Timeout(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("HTTP {status} for: {url}")]
    Status { status: u16, url: String },

    #[error("No content extracted from: {0}")]
    NoContent(String),
}

// =============================================================================
// SEARCH ERRORS
// =============================================================================
/// # Rust Concept: `#[from]`
///
/// The `#[from]` attribute generates a `From<reqwest::Error>` impl, so the
/// `?` operator converts network errors into `SearchError::Network` for us.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Failed to perform web search: {0}")]
    SearchFailed(String),

    #[error("Rate limited by search provider, please wait")]
    RateLimited,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

// =============================================================================
// MODEL ERRORS
// =============================================================================
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Model completion failed: {0}")]
    Completion(String),

    #[error("Model returned an empty response")]
    EmptyResponse,
}

// =============================================================================
// RENDER ERRORS
// =============================================================================
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Malformed document structure: {0}")]
    Structure(String),
}

// =============================================================================
// PERSISTENCE ERRORS
// =============================================================================
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PersistenceError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
