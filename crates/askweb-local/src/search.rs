use crate::env;
use askweb_core::{Error, Result, SearchProvider, SearchQuery, SearchResponse, SearchResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Instant;

pub const SERPER_DEFAULT_ENDPOINT: &str = "https://google.serper.dev/search";

fn timeout_ms_from_query(q: &SearchQuery) -> u64 {
    // Provider requests can hang indefinitely without an explicit timeout.
    q.timeout_ms.unwrap_or(20_000).clamp(1_000, 60_000)
}

pub fn serper_api_key_from_env() -> Option<String> {
    env("ASKWEB_SERPER_API_KEY").or_else(|| env("SERPER_API_KEY"))
}

pub fn serper_endpoint_from_env() -> Option<String> {
    env("ASKWEB_SERPER_ENDPOINT")
}

/// Google results via serper.dev.
///
/// A missing key is not rejected here: the request goes out without
/// `X-API-KEY` and the provider's auth error degrades the turn like any other
/// search failure.
#[derive(Debug, Clone)]
pub struct SerperSearchProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
}

impl SerperSearchProvider {
    pub fn new(client: reqwest::Client, api_key: Option<String>, endpoint: Option<String>) -> Self {
        Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            endpoint: endpoint.unwrap_or_else(|| SERPER_DEFAULT_ENDPOINT.to_string()),
        }
    }

    pub fn from_env(client: reqwest::Client) -> Self {
        Self::new(client, serper_api_key_from_env(), serper_endpoint_from_env())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct SerperSearchResponse {
    #[serde(default)]
    organic: Vec<SerperOrganic>,
}

#[derive(Debug, Deserialize)]
struct SerperOrganic {
    link: Option<String>,
    title: Option<String>,
}

fn request_body(q: &SearchQuery) -> serde_json::Value {
    serde_json::json!({ "q": q.query })
}

#[async_trait::async_trait]
impl SearchProvider for SerperSearchProvider {
    fn name(&self) -> &'static str {
        "serper"
    }

    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse> {
        let t0 = Instant::now();
        let timeout_ms = timeout_ms_from_query(q);

        let mut req = self.client.post(&self.endpoint).json(&request_body(q));
        if let Some(k) = &self.api_key {
            req = req.header("X-API-KEY", k);
        }

        let resp = req
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .send()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Search(format!("serper search HTTP {status}")));
        }

        let parsed: SerperSearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;

        let results = parsed
            .organic
            .into_iter()
            .map(|r| SearchResult {
                url: r.link.unwrap_or_default(),
                title: r.title,
                source: "serper".to_string(),
            })
            .collect();

        let mut timings_ms = BTreeMap::new();
        timings_ms.insert("search".to_string(), t0.elapsed().as_millis());

        Ok(SearchResponse {
            results,
            provider: "serper".to_string(),
            timings_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve;
    use askweb_core::SearchClient;
    use axum::{http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn parses_minimal_serper_shape() {
        let js = r#"
        {
          "searchParameters": {"q": "x"},
          "organic": [
            {"title":"Example","link":"https://example.com","snippet":"Hello","position":1},
            {"title":"No link"}
          ]
        }
        "#;
        let parsed: SerperSearchResponse = serde_json::from_str(js).unwrap();
        assert_eq!(parsed.organic.len(), 2);
        assert_eq!(parsed.organic[0].link.as_deref(), Some("https://example.com"));
        assert!(parsed.organic[1].link.is_none());
    }

    #[test]
    fn missing_organic_is_an_empty_list() {
        let parsed: SerperSearchResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.organic.is_empty());
    }

    #[test]
    fn request_body_is_only_the_query() {
        let mut q = SearchQuery::new("rust");
        q.timeout_ms = Some(5_000);
        assert_eq!(request_body(&q), serde_json::json!({"q": "rust"}));
    }

    #[test]
    fn blank_api_key_is_treated_as_missing() {
        let p = SerperSearchProvider::new(reqwest::Client::new(), Some("  ".to_string()), None);
        assert!(!p.has_api_key());
        assert_eq!(p.endpoint(), SERPER_DEFAULT_ENDPOINT);
    }

    fn organic(n: usize) -> serde_json::Value {
        let rows: Vec<_> = (0..n)
            .map(|i| serde_json::json!({"link": format!("https://example.com/{i}"), "title": format!("T{i}")}))
            .collect();
        serde_json::json!({ "organic": rows })
    }

    #[tokio::test]
    async fn sends_key_and_query_and_keeps_provider_order() {
        let app = Router::new().route(
            "/search",
            post(|headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
                if headers.get("x-api-key").and_then(|v| v.to_str().ok()) != Some("k123") {
                    return (StatusCode::FORBIDDEN, Json(serde_json::json!({})));
                }
                // The result cap is client-side; no `num` goes to the provider.
                if body != serde_json::json!({"q": "capital of France"}) {
                    return (StatusCode::BAD_REQUEST, Json(serde_json::json!({})));
                }
                (StatusCode::OK, Json(organic(7)))
            }),
        );
        let addr = serve(app).await;
        let p = SerperSearchProvider::new(
            reqwest::Client::new(),
            Some("k123".to_string()),
            Some(format!("http://{addr}/search")),
        );
        let out = SearchClient::new(Arc::new(p)).search("capital of France").await;
        assert_eq!(out.len(), 5);
        assert_eq!(out[0].url, "https://example.com/0");
        assert_eq!(out[4].url, "https://example.com/4");
        assert_eq!(out[0].title.as_deref(), Some("T0"));
    }

    #[tokio::test]
    async fn non_success_status_is_a_search_error() {
        let app = Router::new().route(
            "/search",
            post(|| async { (StatusCode::UNAUTHORIZED, "nope") }),
        );
        let addr = serve(app).await;
        let p = SerperSearchProvider::new(
            reqwest::Client::new(),
            None,
            Some(format!("http://{addr}/search")),
        );
        let err = p.search(&SearchQuery::new("q")).await.unwrap_err();
        assert!(matches!(err, Error::Search(_)));
        assert!(err.to_string().contains("401"));
        assert!(SearchClient::new(Arc::new(p)).search("q").await.is_empty());
    }

    #[tokio::test]
    async fn slow_provider_hits_the_request_timeout() {
        let app = Router::new().route(
            "/search",
            post(|| async {
                tokio::time::sleep(Duration::from_millis(2_500)).await;
                Json(organic(2))
            }),
        );
        let addr = serve(app).await;
        let p = SerperSearchProvider::new(
            reqwest::Client::new(),
            None,
            Some(format!("http://{addr}/search")),
        );
        let mut q = SearchQuery::new("slow");
        q.timeout_ms = Some(1_000);
        assert!(p.search(&q).await.is_err());
    }

    #[tokio::test]
    async fn unreachable_provider_degrades_to_empty_results() {
        // Bind then drop so the port is (very likely) closed.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let p = SerperSearchProvider::new(
            reqwest::Client::new(),
            None,
            Some(format!("http://{addr}/search")),
        );
        assert!(SearchClient::new(Arc::new(p)).search("q").await.is_empty());
    }
}
