//! Fetch a web page and return its text content.

use crate::error::{AssistantError, Result};
use crate::tools::{Tool, require_str};
use async_trait::async_trait;
use std::time::Duration;

/// Timeout for page fetches.
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Cap on returned page text.
const MAX_PAGE_BYTES: usize = 3000;

/// Fetches a URL and returns the visible text, scripts and markup
/// stripped.
pub struct FetchUrlTool {
    http: reqwest::Client,
}

impl FetchUrlTool {
    /// Create the tool with a shared HTTP client.
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Tool for FetchUrlTool {
    fn name(&self) -> &str {
        "fetch_url"
    }

    fn description(&self) -> &str {
        "Fetch a web page and return its readable text content. Use this to \
         read web pages, check device web UIs, or gather information."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to fetch (http or https)"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String> {
        let url = require_str(&args, "url")?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(AssistantError::Tool(
                "url must start with http:// or https://".into(),
            ));
        }

        let response = self
            .http
            .get(url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| AssistantError::Tool(format!("failed to fetch {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssistantError::Tool(format!("{url} returned {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AssistantError::Tool(format!("failed to read {url}: {e}")))?;

        let text = strip_html(&body);
        let (text, truncated) = truncate(&text, MAX_PAGE_BYTES);
        Ok(if truncated {
            format!("URL: {url}\n\n{text}\n\n[truncated]")
        } else {
            format!("URL: {url}\n\n{text}")
        })
    }
}

/// Reduce an HTML document to its visible text: drops script/style bodies
/// and tags, collapses whitespace runs.
fn strip_html(html: &str) -> String {
    let cleaned = remove_element(html, "script");
    let cleaned = remove_element(&cleaned, "style");

    // Strip remaining tags.
    let mut text = String::with_capacity(cleaned.len() / 4);
    let mut in_tag = false;
    for ch in cleaned.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                text.push(' ');
            }
            c if !in_tag => text.push(c),
            _ => {}
        }
    }

    // Collapse whitespace.
    let mut out = String::with_capacity(text.len());
    let mut last_space = true;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !last_space {
                out.push(' ');
                last_space = true;
            }
        } else {
            out.push(ch);
            last_space = false;
        }
    }
    out.trim().to_owned()
}

/// Remove `<tag ...>...</tag>` elements wholesale (case-insensitive).
/// An unclosed element swallows the rest of the document.
fn remove_element(html: &str, tag: &str) -> String {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let mut out = String::with_capacity(html.len());
    let mut i = 0;
    while i < html.len() {
        match find_ci(html, i, &open) {
            Some(start) => {
                out.push_str(&html[i..start]);
                match find_ci(html, start, &close) {
                    Some(end) => i = end + close.len(),
                    None => break,
                }
            }
            None => {
                out.push_str(&html[i..]);
                break;
            }
        }
    }
    out
}

/// Byte-wise ASCII case-insensitive substring search starting at `from`.
///
/// Both needles here start and end with ASCII, so returned indices always
/// fall on UTF-8 character boundaries.
fn find_ci(haystack: &str, from: usize, needle: &str) -> Option<usize> {
    let h = haystack.as_bytes();
    let n = needle.as_bytes();
    if n.is_empty() || h.len() < from + n.len() {
        return None;
    }
    (from..=h.len() - n.len()).find(|&i| h[i..i + n.len()].eq_ignore_ascii_case(n))
}

/// Truncate at a UTF-8 boundary. Returns `(text, was_truncated)`.
fn truncate(s: &str, max_bytes: usize) -> (String, bool) {
    if s.len() <= max_bytes {
        return (s.to_owned(), false);
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    (s[..end].to_owned(), true)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn strip_html_drops_scripts_and_tags() {
        let html = "<html><head><script>var x = 1;</script><style>p{}</style></head>\
                    <body><p>Hello <b>world</b></p></body></html>";
        let text = strip_html(html);
        assert_eq!(text, "Hello world");
    }

    #[test]
    fn strip_html_handles_unclosed_script() {
        let text = strip_html("<p>before</p><script>never closed");
        assert_eq!(text, "before");
    }

    #[test]
    fn truncate_respects_utf8() {
        let (out, truncated) = truncate("ééééé", 5);
        assert!(truncated);
        assert_eq!(out, "éé");
    }

    #[tokio::test]
    async fn rejects_non_http_urls() {
        let tool = FetchUrlTool::new(reqwest::Client::new());
        assert!(
            tool.execute(serde_json::json!({"url": "file:///etc/passwd"}))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn fetches_and_strips_a_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html><body><h1>Router</h1><p>All links up</p></body></html>"),
            )
            .mount(&server)
            .await;

        let tool = FetchUrlTool::new(reqwest::Client::new());
        let url = format!("{}/status", server.uri());
        let result = tool.execute(serde_json::json!({"url": url})).await.unwrap();
        assert!(result.contains("Router"));
        assert!(result.contains("All links up"));
        assert!(!result.contains("<p>"));
    }
}
