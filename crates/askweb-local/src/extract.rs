use askweb_core::{Error, ExtractedText, PageExtractor, Result};
use std::time::Duration;

/// Per-page fetch timeout.
pub const PAGE_TIMEOUT: Duration = Duration::from_secs(5);

fn norm_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text of every `<p>` in document order, joined by single spaces.
///
/// Whitespace inside a paragraph is collapsed; empty paragraphs are dropped so
/// they don't leave double spaces behind.
pub fn paragraph_text(html: &str) -> String {
    let doc = html_scraper::Html::parse_document(html);
    let Ok(sel) = html_scraper::Selector::parse("p") else {
        return String::new();
    };
    doc.select(&sel)
        .map(|p| norm_ws(&p.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fetches a page over HTTP and keeps a bounded plain-text excerpt of its
/// paragraphs (at most `MAX_EXCERPT_CHARS`).
#[derive(Debug, Clone)]
pub struct HtmlPageExtractor {
    client: reqwest::Client,
    timeout: Duration,
}

impl HtmlPageExtractor {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: PAGE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn fetch_html(&self, url: &str) -> Result<String> {
        let parsed = url::Url::parse(url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::InvalidUrl(format!("unsupported scheme: {}", parsed.scheme())));
        }

        let resp = self
            .client
            .get(parsed)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::Fetch(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!("HTTP {status}")));
        }
        // Decodes by the declared charset; undecodable bytes become U+FFFD.
        resp.text().await.map_err(|e| Error::Fetch(e.to_string()))
    }
}

#[async_trait::async_trait]
impl PageExtractor for HtmlPageExtractor {
    async fn extract(&self, url: &str) -> ExtractedText {
        let t0 = std::time::Instant::now();
        match self.fetch_html(url).await {
            Ok(html) => {
                let text = paragraph_text(&html);
                tracing::debug!(
                    url,
                    chars = text.chars().count(),
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    "extracted page text"
                );
                ExtractedText::retrieved(url, &text)
            }
            Err(e) => {
                tracing::debug!(url, error = %e, "page extraction failed");
                ExtractedText::failed(url, &e)
            }
        }
    }
}
