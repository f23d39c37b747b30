//! # Tools Module
//!
//! Web search for the research loop.
//!
//! - [`SearchProvider`] is the collaborator port: one call, one result page.
//! - [`DuckDuckGoSearch`] implements it against DuckDuckGo's HTML endpoint.
//! - [`SearchTool`] is the adapter the loop actually calls. It retries a
//!   failing provider with linear backoff and gives up with a
//!   [`SearchFailure`] carrying the last error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{SearchError, SearchFailure};

const DUCKDUCKGO_HTML_URL: &str = "https://html.duckduckgo.com";

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

// =============================================================================
// SEARCH RESULT STRUCT
// =============================================================================
/// A single search hit. Only `title` and `body` reach the research state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchResult {
    /// The title of the search result
    pub title: String,

    /// The snippet/summary shown under the title
    pub body: String,

    /// The URL of the result
    pub href: String,
}

impl SearchResult {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            href: String::new(),
        }
    }

    pub fn with_href(mut self, href: impl Into<String>) -> Self {
        self.href = href.into();
        self
    }
}

// =============================================================================
// SEARCH PROVIDER PORT
// =============================================================================
/// A web search backend.
///
/// `max_results` is a hint; providers may return fewer.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn text(&self, query: &str, max_results: usize)
        -> Result<Vec<SearchResult>, SearchError>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

// =============================================================================
// RETRY POLICY
// =============================================================================
/// Bounded attempts with linear backoff.
///
/// Attempt 1 runs immediately; attempt `k` (k > 1) waits `unit * (k - 1)`.
/// With the defaults that is 1.5s before attempt 2 and 3.0s before attempt 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1500))
    }
}

impl RetryPolicy {
    /// At least one attempt is always made.
    pub fn new(max_attempts: u32, backoff_unit: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_unit,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to sleep before the 1-based `attempt`.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        self.backoff_unit * attempt.saturating_sub(1)
    }
}

// =============================================================================
// SEARCH TOOL ADAPTER
// =============================================================================
/// Retrying front for a [`SearchProvider`].
///
/// # Behaviour
///
/// - A call that returns (even with zero results) ends the loop at once.
///   Empty pages are not errors and are not retried.
/// - A call that errors is retried after the policy's delay.
/// - When every attempt errors, the error of the final attempt is surfaced;
///   earlier ones are only logged.
#[derive(Clone)]
pub struct SearchTool {
    provider: Arc<dyn SearchProvider>,
    policy: RetryPolicy,
}

impl SearchTool {
    pub fn new(provider: Arc<dyn SearchProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn search(
        &self,
        query: &str,
        max_items: usize,
    ) -> Result<Vec<SearchResult>, SearchFailure> {
        let mut last_error = None;

        for attempt in 1..=self.policy.max_attempts {
            let delay = self.policy.delay_before(attempt);
            if !delay.is_zero() {
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Backing off before retry");
                tokio::time::sleep(delay).await;
            }

            match self.provider.text(query, max_items).await {
                Ok(results) => {
                    if results.is_empty() {
                        warn!(query = %query, provider = self.provider.name(), "No search results found");
                    } else {
                        info!(query = %query, count = results.len(), "Search completed");
                    }
                    return Ok(results);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Search attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(SearchFailure {
            attempts: self.policy.max_attempts,
            last: last_error
                .unwrap_or_else(|| SearchError::SearchFailed("no attempts made".to_string())),
        })
    }
}

// =============================================================================
// DUCKDUCKGO PROVIDER
// =============================================================================
/// Free web search via DuckDuckGo's HTML endpoint (no API key required).
#[derive(Debug, Clone)]
pub struct DuckDuckGoSearch {
    client: reqwest::Client,
    base_url: String,
}

impl DuckDuckGoSearch {
    pub fn new() -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: DUCKDUCKGO_HTML_URL.to_string(),
        })
    }

    /// Point the provider at another host (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    async fn text(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let url = format!("{}/html/?q={}", self.base_url, urlencoding::encode(query));

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
        Ok(parse_html(&body, max_results))
    }

    fn name(&self) -> &str {
        "duckduckgo"
    }
}

/// Parse DuckDuckGo's HTML result page.
///
/// Each organic hit is an `<a class="result__a">` title link followed by an
/// element with class `result__snippet`. Ads route through `y.js` and are
/// skipped.
fn parse_html(html: &str, max_results: usize) -> Vec<SearchResult> {
    let mut results = Vec::new();

    for segment in html.split("class=\"result__a\"").skip(1) {
        if results.len() >= max_results {
            break;
        }

        let href = attribute(segment, "href").map(resolve_redirect).unwrap_or_default();
        if href.is_empty() || href.contains("duckduckgo.com/y.js") {
            continue;
        }

        let title = element_text(segment).unwrap_or_default();
        let body = segment
            .find("result__snippet")
            .and_then(|pos| element_text(&segment[pos..]))
            .unwrap_or_default();

        let title = if title.is_empty() {
            extract_domain(&href).unwrap_or_else(|| "Result".to_string())
        } else {
            title
        };

        results.push(SearchResult { title, body, href });
    }

    results
}

/// Value of the first `name="..."` attribute in `segment`.
fn attribute<'a>(segment: &'a str, name: &str) -> Option<&'a str> {
    let marker = format!("{name}=\"");
    let start = segment.find(&marker)? + marker.len();
    let end = segment[start..].find('"')?;
    Some(&segment[start..start + end])
}

/// Text between the end of the current tag and the next `</a>`, tags stripped.
fn element_text(segment: &str) -> Option<String> {
    let start = segment.find('>')? + 1;
    let end = segment[start..].find("</a>")?;
    Some(decode_entities(&strip_tags(&segment[start..start + end])).trim().to_string())
}

/// Turn `//duckduckgo.com/l/?uddg=<encoded>&rut=...` into the target URL.
fn resolve_redirect(href: &str) -> String {
    let href = href.replace("&amp;", "&");
    if let Some(pos) = href.find("uddg=") {
        let encoded = &href[pos + 5..];
        let encoded = encoded.split('&').next().unwrap_or(encoded);
        if let Ok(url) = urlencoding::decode(encoded) {
            return url.into_owned();
        }
    }
    if let Some(rest) = href.strip_prefix("//") {
        return format!("https://{rest}");
    }
    href
}

fn strip_tags(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut in_tag = false;
    for c in fragment.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Extract the domain name from a URL.
fn extract_domain(url: &str) -> Option<String> {
    url.split("//")
        .nth(1)?
        .split('/')
        .next()
        .map(|s| s.to_string())
}

// =============================================================================
// UNIT TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FIXTURE: &str = r##"
<div class="result results_links results_links_deep result--ad">
  <h2 class="result__title"><a rel="nofollow" class="result__a" href="https://duckduckgo.com/y.js?ad_domain=shop.example">Buy now</a></h2>
  <a class="result__snippet" href="#">Sponsored</a>
</div>
<div class="result results_links results_links_deep web-result">
  <h2 class="result__title">
    <a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fen.wikipedia.org%2Fwiki%2FAtomic_orbital&amp;rut=abc">Atomic <b>orbital</b> - Wikipedia</a>
  </h2>
  <a class="result__snippet" href="x">An <b>atomic orbital</b> is a function &amp; more.</a>
</div>
<div class="result results_links results_links_deep web-result">
  <h2 class="result__title">
    <a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fphysics.example.org%2Fnodes&amp;rut=def">Nodes &quot;explained&quot;</a>
  </h2>
  <a class="result__snippet" href="y">Electrons don&#x27;t travel through nodes.</a>
</div>
"##;

    /// Plays back a fixed script of provider outcomes and logs call times.
    struct ScriptedProvider {
        script: Mutex<VecDeque<Result<Vec<SearchResult>, SearchError>>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<Vec<SearchResult>, SearchError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SearchProvider for ScriptedProvider {
        async fn text(
            &self,
            _query: &str,
            _max_results: usize,
        ) -> Result<Vec<SearchResult>, SearchError> {
            self.calls.lock().unwrap().push(Instant::now());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(SearchError::SearchFailed("script exhausted".into())))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    /// The paused clock advances in whole timer ticks.
    fn assert_gap(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual < expected + Duration::from_millis(5),
            "expected ~{expected:?}, got {actual:?}"
        );
    }

    fn failure(label: &str) -> Result<Vec<SearchResult>, SearchError> {
        Err(SearchError::SearchFailed(label.to_string()))
    }

    #[test]
    fn test_retry_policy_delays_are_linear() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_millis(1500));
        assert_eq!(policy.delay_before(3), Duration::from_millis(3000));
    }

    #[test]
    fn test_retry_policy_always_makes_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    }

    #[test]
    fn test_search_tool_keeps_configured_policy() {
        let policy = RetryPolicy::new(5, Duration::from_millis(200));
        let tool = SearchTool::new(ScriptedProvider::new(vec![]), policy);
        assert_eq!(tool.policy(), policy);
        assert_eq!(tool.policy().delay_before(3), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt_after_two_backoffs() {
        let provider = ScriptedProvider::new(vec![
            failure("attempt 1"),
            failure("attempt 2"),
            Ok(vec![SearchResult::new("A", "B")]),
        ]);
        let tool = SearchTool::new(provider.clone(), RetryPolicy::default());

        let results = tool.search("orbitals", 15).await.unwrap();

        assert_eq!(results, vec![SearchResult::new("A", "B")]);
        let calls = provider.call_times();
        assert_eq!(calls.len(), 3);
        assert_gap(calls[1] - calls[0], Duration::from_millis(1500));
        assert_gap(calls[2] - calls[1], Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_surface_last_error() {
        let provider = ScriptedProvider::new(vec![
            failure("attempt 1"),
            failure("attempt 2"),
            failure("attempt 3"),
        ]);
        let tool = SearchTool::new(provider.clone(), RetryPolicy::default());

        let err = tool.search("orbitals", 15).await.unwrap_err();

        assert_eq!(err.attempts, 3);
        assert_eq!(err.last.to_string(), "Failed to perform web search: attempt 3");
        assert_eq!(provider.call_times().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_first_page_is_returned_without_retry() {
        let provider = ScriptedProvider::new(vec![Ok(vec![]), Ok(vec![SearchResult::new("A", "B")])]);
        let tool = SearchTool::new(provider.clone(), RetryPolicy::default());
        let started = Instant::now();

        let results = tool.search("nothing", 15).await.unwrap();

        assert!(results.is_empty());
        assert_eq!(provider.call_times().len(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_parse_html_skips_ads_and_decodes() {
        let results = parse_html(FIXTURE, 10);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Atomic orbital - Wikipedia");
        assert_eq!(results[0].body, "An atomic orbital is a function & more.");
        assert_eq!(results[0].href, "https://en.wikipedia.org/wiki/Atomic_orbital");
        assert_eq!(results[1].title, "Nodes \"explained\"");
        assert_eq!(results[1].body, "Electrons don't travel through nodes.");
    }

    #[test]
    fn test_parse_html_respects_max_results() {
        assert_eq!(parse_html(FIXTURE, 1).len(), 1);
    }

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            extract_domain("https://www.example.com/page"),
            Some("www.example.com".to_string())
        );
        assert_eq!(
            extract_domain("https://rust-lang.org/learn"),
            Some("rust-lang.org".to_string())
        );
    }

    #[tokio::test]
    async fn test_duckduckgo_fetches_and_parses() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/html/"))
            .and(query_param("q", "electron orbitals"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FIXTURE))
            .expect(1)
            .mount(&server)
            .await;

        let provider = DuckDuckGoSearch::new().unwrap().with_base_url(server.uri());
        let results = provider.text("electron orbitals", 15).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[1].href, "https://physics.example.org/nodes");
    }

    #[tokio::test]
    async fn test_duckduckgo_rate_limited() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/html/"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let provider = DuckDuckGoSearch::new().unwrap().with_base_url(server.uri());
        let result = provider.text("anything", 15).await;

        assert!(matches!(result, Err(SearchError::RateLimited)));
    }

    #[tokio::test]
    async fn test_duckduckgo_server_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/html/"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let provider = DuckDuckGoSearch::new().unwrap().with_base_url(server.uri());
        let result = provider.text("anything", 15).await;

        assert!(matches!(result, Err(SearchError::SearchFailed(msg)) if msg.contains("503")));
    }
}
