//! Web access tools: search and crawl.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{parse_args, Tool, ToolError};

const USER_AGENT: &str = "Mozilla/5.0 (compatible; coding-agent/0.3)";

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Search the web through the DuckDuckGo HTML endpoint (no API key needed).
pub struct WebSearch {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default = "default_max_results")]
    max_results: usize,
}

fn default_max_results() -> usize {
    5
}

impl WebSearch {
    pub fn new(endpoint: &str) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self::with_client(client, endpoint)
    }

    pub fn with_client(client: reqwest::Client, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
        }
    }

    /// Run a query. An empty list means the backend answered with no hits.
    pub async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, ToolError> {
        let url = format!("{}?q={}", self.endpoint, urlencoding::encode(query));
        tracing::info!("Searching the web: {}", query);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ToolError::Search(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Search(format!("HTTP error: {}", status)));
        }

        let html = response
            .text()
            .await
            .map_err(|e| ToolError::Search(e.to_string()))?;

        let results = extract_ddg_results(&html, max_results);
        tracing::debug!("Search for '{}' returned {} results", query, results.len());
        Ok(results)
    }
}

#[async_trait]
impl Tool for WebSearch {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for information. Returns titles, URLs and snippets. Use for finding code examples, documentation and best practices."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results to return",
                    "default": 5
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: SearchArgs = parse_args(args)?;
        let results = self.search(&args.query, args.max_results).await?;
        Ok(json!(results))
    }
}

/// Extract search results from DuckDuckGo HTML.
fn extract_ddg_results(html: &str, max_results: usize) -> Vec<SearchResult> {
    let mut results = Vec::new();

    for chunk in html.split("result__body").skip(1) {
        if results.len() >= max_results {
            break;
        }

        let Some((attrs, title)) = anchor(chunk, "result__a") else {
            continue;
        };
        let title = html_decode(&strip_tags(title));
        if title.is_empty() {
            continue;
        }

        let url = attr_value(attrs, "href")
            .map(resolve_ddg_href)
            .filter(|u| !u.is_empty())
            .or_else(|| anchor(chunk, "result__url").map(|(_, inner)| strip_tags(inner)))
            .unwrap_or_default();

        let snippet = anchor(chunk, "result__snippet")
            .map(|(_, inner)| html_decode(&strip_tags(inner)))
            .unwrap_or_default();

        results.push(SearchResult {
            title,
            url,
            snippet,
        });
    }

    results
}

/// Find the element carrying `class` and return its attribute text and inner HTML.
fn anchor<'a>(chunk: &'a str, class: &str) -> Option<(&'a str, &'a str)> {
    let marker = format!("class=\"{}\"", class);
    let start = chunk.find(&marker)?;
    let rest = &chunk[start..];
    let open_end = rest.find('>')?;
    let attrs = &rest[..open_end];
    let inner = &rest[open_end + 1..];
    // Inline markup such as <b> is common in titles and snippets.
    let close = inner.find("</a>").unwrap_or(inner.len());
    Some((attrs, &inner[..close]))
}

fn attr_value<'a>(attrs: &'a str, name: &str) -> Option<&'a str> {
    let marker = format!("{}=\"", name);
    let start = attrs.find(&marker)? + marker.len();
    let end = attrs[start..].find('"')?;
    Some(&attrs[start..start + end])
}

/// DuckDuckGo wraps result links in a redirect carrying the target in `uddg`.
fn resolve_ddg_href(href: &str) -> String {
    let href = html_decode(href);
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.clone()
    };

    match url::Url::parse(&absolute) {
        Ok(parsed) => parsed
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.into_owned())
            .unwrap_or(absolute),
        Err(_) => href,
    }
}

/// A crawled page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebPage {
    pub url: String,
    pub title: Option<String>,
    pub text: String,
    pub status_code: u16,
    pub content_type: Option<String>,
}

/// Fetch a URL and reduce it to plain text.
pub struct WebCrawl {
    client: reqwest::Client,
    text_limit: usize,
}

#[derive(Deserialize)]
struct CrawlArgs {
    url: String,
    #[serde(default = "default_extract_text")]
    extract_text: bool,
}

fn default_extract_text() -> bool {
    true
}

impl WebCrawl {
    pub fn new(timeout: Duration, text_limit: usize) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self::with_client(client, text_limit)
    }

    pub fn with_client(client: reqwest::Client, text_limit: usize) -> Self {
        Self { client, text_limit }
    }

    /// Fetch `url`. Text is capped at the configured number of characters.
    pub async fn crawl(&self, url: &str, extract_text: bool) -> Result<WebPage, ToolError> {
        let parsed = url::Url::parse(url)
            .map_err(|e| ToolError::InvalidArguments(format!("invalid url '{}': {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ToolError::InvalidArguments(format!(
                "unsupported url scheme: {}",
                parsed.scheme()
            )));
        }

        tracing::info!("Crawling {}", url);

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| ToolError::Fetch(e.to_string()))?;
        let status = response.status();

        if !status.is_success() {
            return Err(ToolError::Fetch(format!("HTTP error: {}", status)));
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_lowercase());

        let body = response
            .text()
            .await
            .map_err(|e| ToolError::Fetch(e.to_string()))?;

        let is_html = content_type
            .as_deref()
            .map_or(false, |ct| ct.contains("text/html"));

        let title = if is_html { extract_title(&body) } else { None };

        let text = if !extract_text {
            String::new()
        } else if is_html {
            truncate_chars(&extract_text_from_html(&body), self.text_limit)
        } else {
            truncate_chars(&body, self.text_limit)
        };

        tracing::debug!("Crawled {} ({} chars of text)", final_url, text.chars().count());

        Ok(WebPage {
            url: final_url,
            title,
            text,
            status_code: status.as_u16(),
            content_type,
        })
    }
}

#[async_trait]
impl Tool for WebCrawl {
    fn name(&self) -> &str {
        "web_crawl"
    }

    fn description(&self) -> &str {
        "Fetch a web page and extract its text. Use to read documentation or an example found through web_search."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to fetch"
                },
                "extract_text": {
                    "type": "boolean",
                    "description": "Whether to extract plain text content",
                    "default": true
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: CrawlArgs = parse_args(args)?;
        let page = self.crawl(&args.url, args.extract_text).await?;
        serde_json::to_value(page).map_err(|e| ToolError::Fetch(e.to_string()))
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

fn extract_title(html: &str) -> Option<String> {
    let re = Regex::new(r"(?is)<title[^>]*>(.*?)</title>").ok()?;
    re.captures(html)
        .and_then(|c| c.get(1))
        .map(|m| html_decode(m.as_str().trim()))
        .filter(|t| !t.is_empty())
}

/// Extract readable text from HTML.
fn extract_text_from_html(html: &str) -> String {
    let mut text = html.to_string();

    for tag in ["script", "style", "nav", "header", "footer"] {
        text = remove_element(&text, tag);
    }

    let text = strip_tags(&text);
    let text: String = text.split_whitespace().collect::<Vec<_>>().join(" ");

    html_decode(&text)
}

/// Remove every `<tag ...>...</tag>` block. Matching is ASCII case-insensitive.
fn remove_element(html: &str, tag: &str) -> String {
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);
    let mut text = html.to_string();

    loop {
        let lower = text.to_ascii_lowercase();
        let Some(start) = find_open_tag(&lower, &open) else {
            break;
        };
        let Some(end) = lower[start..].find(&close) else {
            break;
        };
        text.replace_range(start..start + end + close.len(), " ");
    }

    text
}

/// Position of `<tag` followed by a delimiter, so `<nav` does not match `<navbar`.
fn find_open_tag(lower: &str, open: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(pos) = lower[from..].find(open) {
        let at = from + pos;
        match lower[at + open.len()..].chars().next() {
            Some(c) if c == '>' || c == '/' || c.is_whitespace() => return Some(at),
            None => return None,
            _ => from = at + open.len(),
        }
    }
    None
}

/// Replace every tag with a space.
fn strip_tags(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut in_tag = false;

    for c in html.chars() {
        if c == '<' {
            in_tag = true;
        } else if c == '>' {
            in_tag = false;
            result.push(' ');
        } else if !in_tag {
            result.push(c);
        }
    }

    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Basic HTML entity decoding.
fn html_decode(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{local_client, serve_once};
    use tokio::net::TcpListener;

    const DDG_FIXTURE: &str = r##"
<div class="result results_links web-result">
  <div class="links_main links_deep result__body">
    <h2 class="result__title">
      <a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fdoc.rust-lang.org%2Fbook%2F&amp;rut=abc">The <b>Rust</b> Programming Language</a>
    </h2>
    <a class="result__url" href="//duckduckgo.com/l/?uddg=x">doc.rust-lang.org/book</a>
    <a class="result__snippet" href="#">Learn <b>Rust</b> &amp; have fun</a>
  </div>
</div>
<div class="result results_links web-result">
  <div class="links_main links_deep result__body">
    <h2 class="result__title">
      <a rel="nofollow" class="result__a" href="https://tokio.rs/">Tokio</a>
    </h2>
    <a class="result__snippet" href="#">An asynchronous runtime</a>
  </div>
</div>
"##;

    #[test]
    fn extracts_ddg_results() {
        let results = extract_ddg_results(DDG_FIXTURE, 5);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "The Rust Programming Language");
        assert_eq!(results[0].url, "https://doc.rust-lang.org/book/");
        assert_eq!(results[0].snippet, "Learn Rust & have fun");
        assert_eq!(results[1].url, "https://tokio.rs/");
    }

    #[test]
    fn extract_respects_max_results() {
        assert_eq!(extract_ddg_results(DDG_FIXTURE, 1).len(), 1);
        assert!(extract_ddg_results("<html>nothing here</html>", 5).is_empty());
    }

    #[test]
    fn html_text_extraction_drops_boilerplate() {
        let html = r#"<html><head><title>Docs &amp; more</title><style>p{}</style></head>
<body><nav>menu</nav><header>banner</header><h1>Hello</h1><SCRIPT>var x = 1;</SCRIPT>
<p>world &lt;3</p><footer>legal</footer></body></html>"#;
        assert_eq!(extract_text_from_html(html), "Docs & more Hello world <3");
        assert_eq!(extract_title(html).as_deref(), Some("Docs & more"));
    }

    #[test]
    fn remove_element_ignores_longer_tag_names() {
        let html = "<navbar>keep</navbar><nav>drop</nav>";
        assert_eq!(strip_tags(&remove_element(html, "nav")), "keep");
    }

    #[test]
    fn truncate_counts_characters() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[tokio::test]
    async fn crawl_caps_text_at_limit() {
        let url = serve_once("200 OK", "text/plain", "a".repeat(6000)).await;
        let crawler = WebCrawl::with_client(local_client(), 5000);

        let page = crawler.crawl(&url, true).await.unwrap();
        assert_eq!(page.text.chars().count(), 5000);
        assert_eq!(page.status_code, 200);
    }

    #[tokio::test]
    async fn crawl_extracts_html_text() {
        let body = format!(
            "<html><head><title>Long</title></head><body><p>{}</p></body></html>",
            "word ".repeat(2000)
        );
        let url = serve_once("200 OK", "text/html; charset=utf-8", body).await;
        let crawler = WebCrawl::with_client(local_client(), 5000);

        let page = crawler.crawl(&url, true).await.unwrap();
        assert_eq!(page.title.as_deref(), Some("Long"));
        assert_eq!(page.text.chars().count(), 5000);
        assert!(page.text.starts_with("Long word word"));
    }

    #[tokio::test]
    async fn crawl_without_extraction_returns_no_text() {
        let url = serve_once("200 OK", "text/plain", "body".to_string()).await;
        let crawler = WebCrawl::with_client(local_client(), 5000);

        let page = crawler.crawl(&url, false).await.unwrap();
        assert!(page.text.is_empty());
    }

    #[tokio::test]
    async fn crawl_fails_on_http_error() {
        let url = serve_once("404 Not Found", "text/plain", "missing".to_string()).await;
        let crawler = WebCrawl::with_client(local_client(), 5000);

        let err = crawler.crawl(&url, true).await.unwrap_err();
        assert!(matches!(err, ToolError::Fetch(ref m) if m.contains("404")));
    }

    #[tokio::test]
    async fn crawl_rejects_bad_urls() {
        let crawler = WebCrawl::with_client(local_client(), 5000);
        assert!(matches!(
            crawler.crawl("not a url", true).await,
            Err(ToolError::InvalidArguments(_))
        ));
        assert!(matches!(
            crawler.crawl("ftp://example.com/file", true).await,
            Err(ToolError::InvalidArguments(_))
        ));
    }

    #[tokio::test]
    async fn search_with_no_hits_is_empty_not_error() {
        let url = serve_once("200 OK", "text/html", "<html><body>No results.</body></html>".to_string()).await;
        let search = WebSearch::with_client(local_client(), &url);

        let results = search.search("zzzz", 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn search_parses_backend_html() {
        let url = serve_once("200 OK", "text/html", DDG_FIXTURE.to_string()).await;
        let search = WebSearch::with_client(local_client(), &url);

        let value = search
            .execute(json!({"query": "rust book", "max_results": 1}))
            .await
            .unwrap();
        assert_eq!(value.as_array().unwrap().len(), 1);
        assert_eq!(value[0]["url"], "https://doc.rust-lang.org/book/");
    }

    #[tokio::test]
    async fn search_unreachable_backend_is_search_error() {
        // Bind then drop to get a port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let search = WebSearch::with_client(local_client(), &format!("http://{}/", addr));
        assert!(matches!(
            search.search("rust", 5).await,
            Err(ToolError::Search(_))
        ));
    }
}
