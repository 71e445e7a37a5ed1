use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub mod context;
pub mod stream;
pub mod turn;

pub use context::{ContextEntry, ConversationContext, Role};
pub use stream::{collect_fragments, CompletionBackend, CompletionClient, FragmentStream};
pub use turn::{Orchestrator, TurnObserver, TurnOutcome, TurnPhase};

/// Upper bound on search results folded into a single turn.
pub const MAX_SEARCH_RESULTS: usize = 5;

/// Upper bound (in chars) on the excerpt taken from one page.
pub const MAX_EXCERPT_CHARS: usize = 1000;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("extract failed: {0}")]
    Extract(String),
    #[error("search failed: {0}")]
    Search(String),
    #[error("llm failed: {0}")]
    Llm(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    /// Timeout for the provider request.
    pub timeout_ms: Option<u64>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchResult {
    /// May be empty when the provider omitted a link; such results are never fetched.
    pub url: String,
    pub title: Option<String>,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub provider: String,
    pub timings_ms: BTreeMap<String, u128>,
}

#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse>;
}

/// Degrade-gracefully wrapper around a [`SearchProvider`].
///
/// A failing provider yields an empty result list rather than an error, so a
/// turn can still fall back to an un-augmented answer.
#[derive(Clone)]
pub struct SearchClient {
    provider: Arc<dyn SearchProvider>,
}

impl SearchClient {
    pub fn new(provider: Arc<dyn SearchProvider>) -> Self {
        Self { provider }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub async fn search(&self, query: &str) -> Vec<SearchResult> {
        // The cap is applied here; providers are asked for their default page.
        let q = SearchQuery::new(query);
        match self.provider.search(&q).await {
            Ok(resp) => {
                let mut results = resp.results;
                results.truncate(MAX_SEARCH_RESULTS);
                tracing::debug!(
                    provider = %resp.provider,
                    results = results.len(),
                    timings_ms = ?resp.timings_ms,
                    "search completed"
                );
                results
            }
            Err(e) => {
                tracing::warn!(provider = self.provider.name(), error = %e, "search failed; continuing without results");
                Vec::new()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExtractStatus {
    Retrieved,
    Failed,
}

/// Bounded page excerpt. A failed extraction still carries text (the sentinel
/// message), and that text is folded into context like any other excerpt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractedText {
    pub url: String,
    pub text: String,
    pub status: ExtractStatus,
}

impl ExtractedText {
    pub fn retrieved(url: impl Into<String>, text: &str) -> Self {
        Self {
            url: url.into(),
            text: truncate_chars(text, MAX_EXCERPT_CHARS),
            status: ExtractStatus::Retrieved,
        }
    }

    pub fn failed(url: impl Into<String>, cause: &Error) -> Self {
        let url = url.into();
        let msg = format!("failed to retrieve content from {url}: {cause}");
        Self {
            text: truncate_chars(&msg, MAX_EXCERPT_CHARS),
            url,
            status: ExtractStatus::Failed,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == ExtractStatus::Failed
    }
}

#[async_trait::async_trait]
pub trait PageExtractor: Send + Sync {
    /// Never fails: errors are reported through [`ExtractStatus::Failed`].
    async fn extract(&self, url: &str) -> ExtractedText;
}

/// First `max_chars` chars of `s` (never splits a code point).
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((byte, _)) => s[..byte].to_string(),
        None => s.to_string(),
    }
}
