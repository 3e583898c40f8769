//! # Research Collector
//!
//! Runs the search provider and the content fetcher over a set of queries
//! and normalizes the outcome into [`SourceRecord`]s.
//!
//! Partial results are the norm: a page that fails to load becomes an
//! errored record in its batch, and a query whose search fails (or finds
//! nothing) gets an empty batch. Neither stops the run.

use futures::stream::{self, StreamExt};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::tools::{truncate_chars, ContentFetcher, PageContent, SearchProvider};

/// Characters of each page written to the results side file.
const RESULTS_PREVIEW_CHARS: usize = 500;

// =============================================================================
// DATA MODEL
// =============================================================================
/// The outcome of fetching one search result.
///
/// # Rust Concept: Private Fields as Invariants
///
/// The fields are private, so the only way to build a record is through
/// [`SourceRecord::fetched`] or [`SourceRecord::failed`]. That is what
/// guarantees an errored record never carries a title or content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    url: String,
    title: String,
    content: String,
    error: Option<String>,
}

impl SourceRecord {
    pub fn fetched(url: impl Into<String>, page: PageContent) -> Self {
        Self {
            url: url.into(),
            title: page.title,
            content: page.text,
            error: None,
        }
    }

    pub fn failed(url: impl Into<String>, error: impl ToString) -> Self {
        Self {
            url: url.into(),
            title: String::new(),
            content: String::new(),
            error: Some(error.to_string()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// One record per search result of a single query, in search order.
pub type ResearchBatch = Vec<SourceRecord>;

/// Batches keyed by query, kept in the order the queries were given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Research {
    batches: Vec<(String, ResearchBatch)>,
}

impl Research {
    #[cfg(test)]
    pub fn get(&self, query: &str) -> Option<&ResearchBatch> {
        self.batches
            .iter()
            .find(|(q, _)| q == query)
            .map(|(_, batch)| batch)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ResearchBatch)> {
        self.batches.iter().map(|(q, batch)| (q.as_str(), batch))
    }

    /// Total number of records over all batches.
    pub fn source_count(&self) -> usize {
        self.batches.iter().map(|(_, batch)| batch.len()).sum()
    }

    pub(crate) fn insert(&mut self, query: String, batch: ResearchBatch) {
        self.batches.push((query, batch));
    }
}

// =============================================================================
// DEBUG SIDE FILES
// =============================================================================
/// Informational files in the debug directory. Never read back.
///
/// Write failures are logged and swallowed: these files are debugging aids,
/// not artifacts.
#[derive(Debug, Clone)]
pub struct DebugArtifacts {
    dir: PathBuf,
}

impl DebugArtifacts {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn results_path(&self) -> PathBuf {
        self.dir.join("results.txt")
    }

    pub fn questions_path(&self) -> PathBuf {
        self.dir.join("questions.txt")
    }

    /// Empty `results.txt` so it only holds the current run's records.
    pub fn reset_results(&self) {
        let path = self.results_path();
        let result = fs::create_dir_all(&self.dir).and_then(|_| fs::write(&path, ""));

        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "Failed to reset results log");
        }
    }

    /// Append a preview of each record to `results.txt`.
    pub fn append_results(&self, records: &[SourceRecord]) {
        if records.is_empty() {
            return;
        }

        let mut text = String::new();
        for record in records {
            text.push_str(&format!("URL: {}\n", record.url()));
            match record.error() {
                Some(error) => text.push_str(&format!("Error: {error}\n")),
                None => {
                    text.push_str(&format!("Title: {}\n", record.title()));
                    text.push_str(&format!(
                        "Content: {}...\n",
                        truncate_chars(record.content(), RESULTS_PREVIEW_CHARS)
                    ));
                }
            }
            text.push_str("---\n\n");
        }

        let path = self.results_path();
        let result = fs::create_dir_all(&self.dir).and_then(|_| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?
                .write_all(text.as_bytes())
        });

        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "Failed to append results log");
        }
    }

    /// Overwrite `questions.txt` with the raw follow-up question text.
    pub fn write_questions(&self, questions: &str) {
        let path = self.questions_path();
        let result = fs::create_dir_all(&self.dir).and_then(|_| fs::write(&path, questions));

        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "Failed to write questions file");
        }
    }
}

// =============================================================================
// COLLECTOR
// =============================================================================
pub struct ResearchCollector {
    search: Arc<dyn SearchProvider>,
    fetcher: Arc<dyn ContentFetcher>,
    artifacts: DebugArtifacts,
}

impl ResearchCollector {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn ContentFetcher>,
        artifacts: DebugArtifacts,
    ) -> Self {
        Self {
            search,
            fetcher,
            artifacts,
        }
    }

    /// Research every query. Queries are independent of each other.
    pub async fn collect(&self, queries: &[String], results_per_query: usize) -> Research {
        let mut research = Research::default();

        for query in queries {
            let batch = self.collect_one(query, results_per_query).await;
            research.insert(query.clone(), batch);
        }

        info!(
            queries = queries.len(),
            sources = research.source_count(),
            "Research collection finished"
        );
        research
    }

    /// Search one query and fetch up to `results_per_query` of its URLs.
    ///
    /// # Rust Concept: Bounded Concurrency with Streams
    ///
    /// `buffered(n)` runs up to `n` fetches at once but yields their results
    /// in input order, so the batch keeps the search ranking without any
    /// shared accumulator.
    pub async fn collect_one(&self, query: &str, results_per_query: usize) -> ResearchBatch {
        info!(query = %query, "Starting search and scrape");

        let urls = match self.search.search(query, results_per_query).await {
            Ok(urls) => urls,
            Err(e) => {
                warn!(query = %query, error = %e, "Search failed, continuing with an empty batch");
                return Vec::new();
            }
        };

        if urls.is_empty() {
            warn!(query = %query, "No search results found");
            return Vec::new();
        }

        let batch: ResearchBatch = stream::iter(urls.into_iter().take(results_per_query))
            .map(|url| async move {
                match self.fetcher.fetch(&url).await {
                    Ok(page) => {
                        info!(url = %url, "Scraped page");
                        SourceRecord::fetched(url, page)
                    }
                    Err(e) => {
                        warn!(url = %url, error = %e, "Failed to scrape page");
                        SourceRecord::failed(url, e)
                    }
                }
            })
            .buffered(results_per_query.max(1))
            .collect()
            .await;

        self.artifacts.append_results(&batch);
        batch
    }
}

// =============================================================================
// UNIT TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::testing::{ScriptedFetcher, ScriptedSearch};
    use tempfile::TempDir;

    fn collector(
        search: ScriptedSearch,
        fetcher: ScriptedFetcher,
        dir: &TempDir,
    ) -> ResearchCollector {
        ResearchCollector::new(
            Arc::new(search),
            Arc::new(fetcher),
            DebugArtifacts::new(dir.path()),
        )
    }

    #[test]
    fn test_failed_record_has_no_content() {
        let record = SourceRecord::failed("https://a.example", FetchError::Timeout("x".into()));
        assert_eq!(record.title(), "");
        assert_eq!(record.content(), "");
        assert_eq!(record.error(), Some("Timeout fetching: x"));
    }

    #[tokio::test]
    async fn test_batch_follows_search_order() {
        let dir = TempDir::new().unwrap();
        let search = ScriptedSearch::new().with_results(
            "rust",
            &["https://c.example", "https://a.example", "https://b.example"],
        );
        let collector = collector(search, ScriptedFetcher::new(), &dir);

        let batch = collector.collect_one("rust", 3).await;
        let urls: Vec<_> = batch.iter().map(SourceRecord::url).collect();
        assert_eq!(urls, ["https://c.example", "https://a.example", "https://b.example"]);
        assert_eq!(batch[0].title(), "Title of https://c.example");
    }

    #[tokio::test]
    async fn test_batch_is_capped_at_requested_count() {
        let dir = TempDir::new().unwrap();
        let search = ScriptedSearch::new().with_results(
            "rust",
            &["https://1.example", "https://2.example", "https://3.example", "https://4.example"],
        );
        let collector = collector(search, ScriptedFetcher::new(), &dir);

        let batch = collector.collect_one("rust", 2).await;
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1].url(), "https://2.example");
    }

    #[tokio::test]
    async fn test_duplicates_are_kept() {
        let dir = TempDir::new().unwrap();
        let search = ScriptedSearch::new()
            .with_results("dup", &["https://same.example", "https://same.example"]);
        let collector = collector(search, ScriptedFetcher::new(), &dir);

        assert_eq!(collector.collect_one("dup", 3).await.len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_becomes_error_record() {
        let dir = TempDir::new().unwrap();
        let search = ScriptedSearch::new()
            .with_results("rust", &["https://ok.example", "https://down.example"]);
        let fetcher = ScriptedFetcher::new().failing(
            "https://down.example",
            FetchError::Status {
                status: 503,
                url: "https://down.example".into(),
            },
        );
        let collector = collector(search, fetcher, &dir);

        let batch = collector.collect_one("rust", 3).await;
        assert_eq!(batch.len(), 2);
        assert!(batch[0].error().is_none());
        assert_eq!(batch[1].error(), Some("HTTP 503 for: https://down.example"));
        assert!(batch[1].content().is_empty());
    }

    #[tokio::test]
    async fn test_empty_or_failed_search_gives_empty_batch() {
        let dir = TempDir::new().unwrap();
        let search = ScriptedSearch::new().failing("broken");
        let collector = collector(search, ScriptedFetcher::new(), &dir);

        assert!(collector.collect_one("nothing", 3).await.is_empty());
        assert!(collector.collect_one("broken", 3).await.is_empty());
    }

    #[tokio::test]
    async fn test_collect_keeps_query_order() {
        let dir = TempDir::new().unwrap();
        let search = ScriptedSearch::new()
            .with_results("second", &["https://s.example"])
            .with_results("first", &["https://f.example"]);
        let collector = collector(search, ScriptedFetcher::new(), &dir);

        let queries = vec!["first".to_string(), "second".to_string(), "third".to_string()];
        let research = collector.collect(&queries, 3).await;

        let order: Vec<_> = research.iter().map(|(q, _)| q).collect();
        assert_eq!(order, ["first", "second", "third"]);
        assert_eq!(research.get("first").unwrap()[0].url(), "https://f.example");
        assert!(research.get("third").unwrap().is_empty());
        assert_eq!(research.source_count(), 2);
    }

    #[tokio::test]
    async fn test_results_side_file_is_appended() {
        let dir = TempDir::new().unwrap();
        let search = ScriptedSearch::new()
            .with_results("a", &["https://a.example"])
            .with_results("b", &["https://b.example"]);
        let collector = collector(search, ScriptedFetcher::new(), &dir);

        collector.collect_one("a", 1).await;
        collector.collect_one("b", 1).await;

        let log = fs::read_to_string(DebugArtifacts::new(dir.path()).results_path()).unwrap();
        assert!(log.contains("URL: https://a.example"));
        assert!(log.contains("Content: Content of https://b.example..."));
        assert_eq!(log.matches("---").count(), 2);
    }

    #[tokio::test]
    async fn test_reset_results_empties_side_file() {
        let dir = TempDir::new().unwrap();
        let artifacts = DebugArtifacts::new(dir.path().join("debug"));
        let search = ScriptedSearch::new().with_results("a", &["https://a.example"]);
        let collector = ResearchCollector::new(
            Arc::new(search),
            Arc::new(ScriptedFetcher::new()),
            artifacts.clone(),
        );

        // Works before the directory exists.
        artifacts.reset_results();
        assert_eq!(fs::read_to_string(artifacts.results_path()).unwrap(), "");

        collector.collect_one("a", 1).await;
        assert!(fs::read_to_string(artifacts.results_path()).unwrap().contains("a.example"));

        artifacts.reset_results();
        assert_eq!(fs::read_to_string(artifacts.results_path()).unwrap(), "");
    }
}
