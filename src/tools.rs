//! # Tools Module
//!
//! The two leaf collaborators of the pipeline:
//! - [`SearchProvider`]: query -> ordered candidate URLs (DuckDuckGo HTML)
//! - [`ContentFetcher`]: URL -> page title + plain text (reqwest + scraper)
//!
//! Both are traits so the collector can be driven by scripted doubles in
//! tests, and by the HTTP implementations in production.

use async_trait::async_trait;
use reqwest::{Client, Url};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{FetchError, SearchError};

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Elements whose text never counts as page content.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

// =============================================================================
// COLLABORATOR TRAITS
// =============================================================================
/// Turns a query into an ordered list of candidate URLs.
///
/// # Rust Concept: async-trait
///
/// `#[async_trait]` boxes the returned future so the trait stays object
/// safe, which lets the collector hold an `Arc<dyn SearchProvider>`.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>, SearchError>;
}

/// Fetches one page and extracts its title and readable text.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<PageContent, FetchError>;
}

/// Title and plain-text body of a fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContent {
    pub title: String,
    pub text: String,
}

// =============================================================================
// DUCKDUCKGO SEARCH
// =============================================================================
/// Web search backed by the DuckDuckGo HTML endpoint.
///
/// DuckDuckGo has no free JSON search API, so the result page is scraped
/// with a few fallback strategies.
#[derive(Debug, Clone)]
pub struct DuckDuckGoSearch {
    client: Client,
}

impl DuckDuckGoSearch {
    pub fn new(timeout: Duration) -> Result<Self, SearchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>, SearchError> {
        info!(query = %query, "Performing web search");

        // Rate limiting: wait a bit before making the request
        tokio::time::sleep(Duration::from_millis(500)).await;

        let url = format!(
            "https://html.duckduckgo.com/html/?q={}",
            urlencoding::encode(query)
        );

        debug!(url = %url, "Fetching search results");

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(SearchError::RateLimited);
            }
            return Err(SearchError::SearchFailed(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        let urls = parse_result_urls(&body, max_results);

        if urls.is_empty() {
            warn!(query = %query, "No search results found");
        } else {
            info!(query = %query, count = urls.len(), "Search completed");
        }

        Ok(urls)
    }
}

/// Pull result URLs out of a DuckDuckGo HTML result page, in page order.
///
/// Strategies, tried in order until `max_results` URLs are found:
/// 1. `uddg=` redirect parameters (the real result links)
/// 2. `href`s following a `result__url` marker
/// 3. any bare `https://` URL that does not look like an asset
fn parse_result_urls(html: &str, max_results: usize) -> Vec<String> {
    let mut urls = Vec::new();
    let mut seen = HashSet::new();
    let mut push = |url: String, urls: &mut Vec<String>| {
        if urls.len() < max_results && !url.contains("duckduckgo.com") && seen.insert(url.clone())
        {
            urls.push(url);
        }
    };

    for segment in html.split("uddg=").skip(1) {
        if let Some(end) = segment.find(&['&', '"', '\''][..]) {
            if let Ok(decoded) = urlencoding::decode(&segment[..end]) {
                if decoded.starts_with("http") {
                    push(decoded.into_owned(), &mut urls);
                }
            }
        }
    }

    for segment in html.split("result__url").skip(1) {
        let Some(start) = segment.find("href=\"") else {
            continue;
        };
        let after = &segment[start + 6..];
        let Some(end) = after.find('"') else {
            continue;
        };
        let href = &after[..end];
        if let Some(rest) = href.strip_prefix("//") {
            push(format!("https://{rest}"), &mut urls);
        } else if href.starts_with("http") {
            push(href.to_string(), &mut urls);
        }
    }

    for segment in html.split("https://").skip(1) {
        let Some(end) = segment.find(&['"', '\'', '<', '>', ' ', ')'][..]) else {
            continue;
        };
        let rest = &segment[..end];
        let is_asset = [".js", ".css", ".png", ".ico", "cdn."]
            .iter()
            .any(|marker| rest.contains(marker));
        if !rest.starts_with("duckduckgo")
            && !rest.starts_with("improving.duckduckgo")
            && !is_asset
            && rest.contains('.')
            && rest.len() > 5
        {
            push(format!("https://{rest}"), &mut urls);
        }
    }

    urls
}

// =============================================================================
// HTTP CONTENT FETCHER
// =============================================================================
/// Fetches pages over HTTP and extracts the main text with `scraper`.
///
/// No retries and no caching: a failed fetch is reported once and the
/// collector records it.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_chars: usize,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, max_chars: usize) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| FetchError::Http(e.to_string()))?;

        Ok(Self { client, max_chars })
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<PageContent, FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }

        debug!(url = %url, "Fetching page");

        let response = self.client.get(parsed).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(url.to_string())
            } else {
                FetchError::Http(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let html = response
            .text()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;

        let page = extract_page(&html, self.max_chars);
        if page.text.is_empty() {
            return Err(FetchError::NoContent(url.to_string()));
        }

        info!(url = %url, chars = page.text.chars().count(), "Fetched page");
        Ok(page)
    }
}

/// Extract the `<title>` and the readable text of a page.
///
/// Content comes from the first of `main`, `article`, `body` that exists.
/// Whitespace is collapsed and the text is cut to `max_chars` characters.
pub fn extract_page(html: &str, max_chars: usize) -> PageContent {
    let document = Html::parse_document(html);

    let title = select_first(&document, "title")
        .map(|title| collapse_whitespace(&title.text().collect::<String>()))
        .unwrap_or_default();

    let text = ["main", "article", "body"]
        .iter()
        .find_map(|selector| select_first(&document, selector))
        .map(|element| collapse_whitespace(&visible_text(element)))
        .unwrap_or_default();

    PageContent {
        title,
        text: truncate_chars(&text, max_chars),
    }
}

fn select_first<'a>(document: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(selector).ok()?;
    document.select(&selector).next()
}

fn visible_text(element: ElementRef<'_>) -> String {
    element
        .descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let parent = node.parent().and_then(ElementRef::wrap)?;
            if SKIPPED_ELEMENTS.contains(&parent.value().name()) {
                None
            } else {
                Some(&**text)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate on a char boundary (byte slicing would panic on multi-byte text).
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

// =============================================================================
// UNIT TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_PAGE: &str = r#"
        <div class="result">
          <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.rust-lang.org%2Flearn&amp;rut=abc">Learn Rust</a>
        </div>
        <div class="result">
          <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fdoc.rust-lang.org%2Fbook%2F&amp;rut=def">The Book</a>
        </div>
        <div class="result">
          <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.rust-lang.org%2Flearn&amp;rut=ghi">Duplicate</a>
        </div>
    "#;

    #[test]
    fn test_parse_result_urls_in_page_order() {
        let urls = parse_result_urls(SEARCH_PAGE, 5);
        assert_eq!(
            urls,
            vec![
                "https://www.rust-lang.org/learn".to_string(),
                "https://doc.rust-lang.org/book/".to_string(),
            ]
        );
    }

    #[test]
    fn test_parse_result_urls_respects_limit() {
        let urls = parse_result_urls(SEARCH_PAGE, 1);
        assert_eq!(urls, vec!["https://www.rust-lang.org/learn".to_string()]);
    }

    #[test]
    fn test_parse_result_urls_empty_page() {
        assert!(parse_result_urls("<html><body>No results.</body></html>", 3).is_empty());
    }

    #[test]
    fn test_extract_page_prefers_main() {
        let html = r#"
            <html>
            <head><title>  Rust   Ownership </title></head>
            <body>
              <nav>Site navigation</nav>
              <main>
                <h1>Ownership</h1>
                <p>Each value has   an owner.</p>
                <script>var tracking = 1;</script>
              </main>
            </body>
            </html>
        "#;

        let page = extract_page(html, 5000);
        assert_eq!(page.title, "Rust Ownership");
        assert_eq!(page.text, "Ownership Each value has an owner.");
    }

    #[test]
    fn test_extract_page_falls_back_to_body() {
        let html = "<html><head></head><body><p>Plain body text</p></body></html>";
        let page = extract_page(html, 5000);
        assert_eq!(page.title, "");
        assert_eq!(page.text, "Plain body text");
    }

    #[test]
    fn test_extract_page_truncates() {
        let html = "<html><body><article>abcdefghij</article></body></html>";
        let page = extract_page(html, 4);
        assert_eq!(page.text, "abcd");
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("héllo wörld", 7), "héllo w");
        assert_eq!(truncate_chars("short", 100), "short");
    }

    #[tokio::test]
    async fn test_fetch_rejects_non_http_scheme() {
        let fetcher = HttpFetcher::new(Duration::from_secs(1), 100).unwrap();
        let err = fetcher.fetch("ftp://example.com/file").await.unwrap_err();
        assert_eq!(err, FetchError::InvalidUrl("ftp://example.com/file".to_string()));

        let err = fetcher.fetch("not a url").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
    }
}
